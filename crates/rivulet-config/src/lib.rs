//! Node descriptions for rivulet audio nodes.
//!
//! This crate loads and saves TOML descriptions of an
//! [`AudioNode`](rivulet_core::AudioNode) and builds live nodes from them.
//!
//! # Features
//!
//! - **Node descriptions**: flags, shape, buffer geometry, recall templates and
//!   score notes and control automation in one TOML file
//! - **Recall registry**: recall behaviors by name, with typed parameters
//! - **Validation**: every mistake in a file reported in one pass
//!
//! # Example
//!
//! ```rust
//! use rivulet_config::{NodeConfig, RecallRegistry, TemplateConfig};
//! use rivulet_core::RecallKinds;
//!
//! let config = NodeConfig::new("drum")
//!     .with_flags(["async", "input_has_own_recycling"])
//!     .with_shape(2, 8, 1)
//!     .with_template(TemplateConfig::new("render"))
//!     .with_template(TemplateConfig::new("gain").with_param("gain", "-6dB"));
//!
//! let node = config.build(&RecallRegistry::new())?;
//! let ids = node.recursive_play_init(RecallKinds::PLAYBACK)?;
//! assert_eq!(ids.len(), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod node_config;
mod template_config;

/// Recall registry and built-in recall descriptors.
pub mod registry;

/// Node description validation.
pub mod validation;

pub use error::ConfigError;
pub use node_config::{AutomationConfig, NodeConfig, NoteConfig, PointConfig};
pub use registry::{ParamSpec, RecallDescriptor, RecallFactory, RecallRegistry};
pub use template_config::{TemplateConfig, parse_param_value};
pub use validation::{
    ValidationError, ValidationResult, parse_flags, parse_kinds, parse_list, parse_scope,
    validate_node_config, validate_template,
};
