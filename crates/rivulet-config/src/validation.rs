//! Node description validation.
//!
//! Checks flag, list, scope and kind names, the `SYNC`/`ASYNC` conflict,
//! buffer geometry, and recall names and parameters against a
//! [`RecallRegistry`]. All problems are collected, so one run reports every
//! mistake in a file.
//!
//! # Example
//!
//! ```rust
//! use rivulet_config::{NodeConfig, RecallRegistry, TemplateConfig, validate_node_config};
//!
//! let registry = RecallRegistry::new();
//! let config = NodeConfig::new("drum")
//!     .with_flags(["async", "input_has_own_recycling"])
//!     .with_template(TemplateConfig::new("render"));
//! validate_node_config(&config, &registry).expect("valid description");
//! ```

use rivulet_core::{NodeFlags, RecallKind, RecallKinds, RecallList, RecallScope};
use thiserror::Error;

use crate::node_config::NodeConfig;
use crate::registry::RecallRegistry;
use crate::template_config::TemplateConfig;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Unknown node flag name.
    #[error("unknown node flag: {0}")]
    UnknownFlag(String),

    /// Both link modes requested.
    #[error("flags 'sync' and 'async' are mutually exclusive")]
    ConflictingFlags,

    /// Unknown playback context name.
    #[error("unknown recall kind: {0}")]
    UnknownKind(String),

    /// Unknown recall list name.
    #[error("unknown recall list: {0}")]
    UnknownList(String),

    /// Unknown scope name.
    #[error("unknown recall scope: {0}")]
    UnknownScope(String),

    /// Recall name not in the registry.
    #[error("unknown recall: {0}")]
    UnknownRecall(String),

    /// Unknown parameter name.
    #[error("unknown parameter '{param}' for recall '{recall}'")]
    UnknownParameter {
        /// Name of the recall.
        recall: String,
        /// Name of the unrecognized parameter.
        param: String,
    },

    /// Parameter value out of range.
    #[error("parameter '{param}' value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Name of the parameter.
        param: String,
        /// The value that was out of range.
        value: f32,
        /// Minimum allowed value.
        min: f32,
        /// Maximum allowed value.
        max: f32,
    },

    /// Invalid parameter format.
    #[error("invalid format for parameter '{param}': {reason}")]
    InvalidFormat {
        /// Name of the parameter.
        param: String,
        /// Description of the format error.
        reason: String,
    },

    /// Zero sample rate or buffer size.
    #[error("'{field}' must be positive")]
    NotPositive {
        /// Name of the field.
        field: &'static str,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Folds collected errors into one result.
fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

/// Parse flag names into a flag set, rejecting `sync` together with `async`.
pub fn parse_flags<S: AsRef<str>>(names: &[S]) -> ValidationResult<NodeFlags> {
    let mut flags = NodeFlags::NONE;
    for name in names {
        let name = name.as_ref();
        flags |= NodeFlags::from_name(name)
            .ok_or_else(|| ValidationError::UnknownFlag(name.to_string()))?;
    }
    if flags.is_valid() {
        Ok(flags)
    } else {
        Err(ValidationError::ConflictingFlags)
    }
}

/// Parse kind names into a kind set; an empty list means all kinds.
pub fn parse_kinds<S: AsRef<str>>(names: &[S]) -> ValidationResult<RecallKinds> {
    if names.is_empty() {
        return Ok(RecallKinds::ALL);
    }
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            RecallKind::from_name(name).ok_or_else(|| ValidationError::UnknownKind(name.to_string()))
        })
        .collect()
}

/// Parse a recall list name.
pub fn parse_list(name: &str) -> ValidationResult<RecallList> {
    RecallList::from_name(name).ok_or_else(|| ValidationError::UnknownList(name.to_string()))
}

/// Parse a scope name.
pub fn parse_scope(name: &str) -> ValidationResult<RecallScope> {
    RecallScope::from_name(name).ok_or_else(|| ValidationError::UnknownScope(name.to_string()))
}

/// Validate one template: names, then the recall and its parameters.
pub fn validate_template(
    template: &TemplateConfig,
    registry: &RecallRegistry,
) -> ValidationResult<()> {
    let mut errors = Vec::new();
    if let Err(e) = parse_list(&template.list) {
        errors.push(e);
    }
    if let Err(e) = parse_scope(&template.scope) {
        errors.push(e);
    }
    if let Err(e) = parse_kinds(&template.kinds) {
        errors.push(e);
    }
    if let Err(e) = registry.resolve_params(template) {
        errors.push(e);
    }
    collect(errors)
}

/// Validate a whole node description.
pub fn validate_node_config(config: &NodeConfig, registry: &RecallRegistry) -> ValidationResult<()> {
    let mut errors = Vec::new();
    if let Err(e) = parse_flags(&config.flags) {
        errors.push(e);
    }
    if config.sample_rate == 0 {
        errors.push(ValidationError::NotPositive {
            field: "sample_rate",
        });
    }
    if config.buffer_size == 0 {
        errors.push(ValidationError::NotPositive {
            field: "buffer_size",
        });
    }
    for template in &config.templates {
        match validate_template(template, registry) {
            Ok(()) => {}
            Err(ValidationError::Multiple(nested)) => errors.extend(nested),
            Err(e) => errors.push(e),
        }
    }
    collect(errors)
}
