//! Registry of recall behaviors that node descriptions can name.
//!
//! The built-in recalls are registered by [`RecallRegistry::new`]:
//!
//! | Id            | Parameters                 |
//! |---------------|----------------------------|
//! | `render`      | none                       |
//! | `gain`        | `gain` 0..16, default 1    |
//! | `count-ticks` | `limit` 0..1e6, default 0  |
//!
//! Applications add their own with [`RecallRegistry::register`].

use rivulet_core::builtin::{CountTicks, Gain, RenderRecycling};
use rivulet_core::{RecallBehavior, RecallTemplate};

use crate::template_config::{TemplateConfig, parse_param_value};
use crate::validation::{ValidationError, ValidationResult, parse_kinds, parse_list, parse_scope};

/// A numeric recall parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    /// Parameter name as written in node descriptions.
    pub name: &'static str,
    /// Minimum value.
    pub min: f32,
    /// Maximum value.
    pub max: f32,
    /// Value used when the description omits the parameter.
    pub default: f32,
}

/// Describes a recall in the registry.
#[derive(Debug, Clone)]
pub struct RecallDescriptor {
    /// Unique identifier, matched against `TemplateConfig::recall`.
    pub id: &'static str,
    /// Brief description.
    pub description: &'static str,
    /// Parameters in the order the factory receives them.
    pub params: &'static [ParamSpec],
}

/// Factory function type for creating behaviors from resolved parameters.
pub type RecallFactory = fn(&[f32]) -> Box<dyn RecallBehavior>;

struct RegistryEntry {
    descriptor: RecallDescriptor,
    factory: RecallFactory,
}

/// Recall behaviors by name.
pub struct RecallRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for RecallRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RecallRegistry {
    /// Create a registry with the built-in recalls.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_builtin_recalls();
        registry
    }

    /// Create a registry without any recall.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn register_builtin_recalls(&mut self) {
        self.register(
            RecallDescriptor {
                id: "render",
                description: "Clears the range at Pre and renders it at Inter",
                params: &[],
            },
            |_| Box::new(RenderRecycling),
        );

        self.register(
            RecallDescriptor {
                id: "gain",
                description: "Scales the rendered range",
                params: &[ParamSpec {
                    name: "gain",
                    min: 0.0,
                    max: 16.0,
                    default: 1.0,
                }],
            },
            |p| Box::new(Gain::new(p[0])),
        );

        self.register(
            RecallDescriptor {
                id: "count-ticks",
                description: "Finishes after a number of ticks; 0 never finishes",
                params: &[ParamSpec {
                    name: "limit",
                    min: 0.0,
                    max: 1_000_000.0,
                    default: 0.0,
                }],
            },
            |p| Box::new(CountTicks::new(p[0].round() as u64)),
        );
    }

    /// Register a recall, replacing any entry with the same id.
    pub fn register(&mut self, descriptor: RecallDescriptor, factory: RecallFactory) {
        let entry = RegistryEntry {
            descriptor,
            factory,
        };
        match self
            .entries
            .iter_mut()
            .find(|e| e.descriptor.id == entry.descriptor.id)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    fn entry(&self, id: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.descriptor.id == id)
    }

    /// Descriptor of a recall.
    pub fn get(&self, id: &str) -> Option<&RecallDescriptor> {
        self.entry(id).map(|e| &e.descriptor)
    }

    /// All descriptors in registration order.
    pub fn all_recalls(&self) -> impl Iterator<Item = &RecallDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    /// Number of registered recalls.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parameter values for `config` in descriptor order, defaults filled in.
    pub fn resolve_params(&self, config: &TemplateConfig) -> ValidationResult<Vec<f32>> {
        let entry = self
            .entry(&config.recall)
            .ok_or_else(|| ValidationError::UnknownRecall(config.recall.clone()))?;
        let specs = entry.descriptor.params;

        if let Some(unknown) = config
            .params
            .keys()
            .find(|k| !specs.iter().any(|s| s.name == k.as_str()))
        {
            return Err(ValidationError::UnknownParameter {
                recall: config.recall.clone(),
                param: unknown.clone(),
            });
        }

        specs
            .iter()
            .map(|spec| {
                let Some(raw) = config.get_param(spec.name) else {
                    return Ok(spec.default);
                };
                let value = parse_param_value(raw).ok_or_else(|| ValidationError::InvalidFormat {
                    param: spec.name.to_string(),
                    reason: format!("cannot parse '{raw}' as a number"),
                })?;
                if (spec.min..=spec.max).contains(&value) {
                    Ok(value)
                } else {
                    Err(ValidationError::OutOfRange {
                        param: spec.name.to_string(),
                        value,
                        min: spec.min,
                        max: spec.max,
                    })
                }
            })
            .collect()
    }

    /// Create the behavior `config` names.
    pub fn create(&self, config: &TemplateConfig) -> ValidationResult<Box<dyn RecallBehavior>> {
        let values = self.resolve_params(config)?;
        let entry = self
            .entry(&config.recall)
            .ok_or_else(|| ValidationError::UnknownRecall(config.recall.clone()))?;
        Ok((entry.factory)(&values))
    }

    /// Create a ready-to-add template with the list, scope and kinds of `config`.
    pub fn template(&self, config: &TemplateConfig) -> ValidationResult<RecallTemplate> {
        let list = parse_list(&config.list)?;
        let scope = parse_scope(&config.scope)?;
        let kinds = parse_kinds(&config.kinds)?;
        Ok(RecallTemplate::from_boxed(self.create(config)?)
            .with_list(list)
            .with_scope(scope)
            .with_kinds(kinds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_core::{RecallKinds, RecallList, RecallScope};

    #[test]
    fn test_builtin_recalls() {
        let registry = RecallRegistry::new();
        assert_eq!(registry.len(), 3);
        let ids: Vec<_> = registry.all_recalls().map(|d| d.id).collect();
        assert_eq!(ids, vec!["render", "gain", "count-ticks"]);
        assert!(registry.get("gain").is_some());
        assert!(registry.get("echo").is_none());
        assert!(RecallRegistry::empty().is_empty());
    }

    #[test]
    fn test_resolve_params_fills_defaults() {
        let registry = RecallRegistry::new();
        assert_eq!(
            registry.resolve_params(&TemplateConfig::new("gain")),
            Ok(vec![1.0])
        );
        assert_eq!(
            registry.resolve_params(&TemplateConfig::new("gain").with_param("gain", "50%")),
            Ok(vec![0.5])
        );
    }

    #[test]
    fn test_resolve_params_rejects_bad_values() {
        let registry = RecallRegistry::new();
        assert!(matches!(
            registry.resolve_params(&TemplateConfig::new("gain").with_param("gain", "99")),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert_eq!(
            registry.resolve_params(&TemplateConfig::new("render").with_param("speed", "1")),
            Err(ValidationError::UnknownParameter {
                recall: "render".to_string(),
                param: "speed".to_string(),
            })
        );
        assert_eq!(
            registry.resolve_params(&TemplateConfig::new("echo")),
            Err(ValidationError::UnknownRecall("echo".to_string()))
        );
    }

    #[test]
    fn test_template_applies_names() {
        let registry = RecallRegistry::new();
        let config = TemplateConfig::new("count-ticks")
            .with_list("recall")
            .with_scope("audio")
            .with_kinds(["notation"])
            .with_param("limit", "4");
        let template = registry.template(&config).unwrap();
        assert_eq!(template.name(), "count-ticks");
        assert_eq!(template.list(), RecallList::Recall);
        assert_eq!(template.scope(), RecallScope::Audio);
        assert_eq!(template.kinds(), RecallKinds::NOTATION);
    }

    #[test]
    fn test_register_replaces_same_id() {
        let mut registry = RecallRegistry::new();
        registry.register(
            RecallDescriptor {
                id: "gain",
                description: "Unity",
                params: &[],
            },
            |_| Box::new(Gain::new(1.0)),
        );
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get("gain").unwrap().description, "Unity");
        assert!(registry.get("gain").unwrap().params.is_empty());
    }
}
