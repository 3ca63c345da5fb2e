//! Recall template configuration types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Configuration for one recall template of a node.
///
/// `list`, `scope` and `kinds` are names as accepted by
/// [`RecallList::from_name`](rivulet_core::RecallList::from_name),
/// [`RecallScope::from_name`](rivulet_core::RecallScope::from_name) and
/// [`RecallKind::from_name`](rivulet_core::RecallKind::from_name). An empty
/// `kinds` list serves every playback context.
///
/// # Example
///
/// ```rust
/// use rivulet_config::TemplateConfig;
///
/// let config = TemplateConfig::new("gain")
///     .with_param("gain", "-6dB")
///     .with_kinds(["playback"]);
///
/// assert_eq!(config.recall, "gain");
/// assert_eq!(config.list, "play");
/// assert!((config.parse_param("gain").unwrap() - 0.501).abs() < 1e-3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateConfig {
    /// Registered recall name (e.g. "render", "gain").
    pub recall: String,

    /// Recall list the template goes into.
    #[serde(default = "default_list")]
    pub list: String,

    /// Template scope.
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Playback contexts served; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<String>,

    /// Recall parameters as key-value pairs.
    /// Values are strings so "50%" and "-6dB" work as well as plain numbers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

fn default_list() -> String {
    "play".to_string()
}

fn default_scope() -> String {
    "channel".to_string()
}

impl TemplateConfig {
    /// Channel-scope template in the play list serving every context.
    pub fn new(recall: impl Into<String>) -> Self {
        Self {
            recall: recall.into(),
            list: default_list(),
            scope: default_scope(),
            kinds: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    /// Set the recall list.
    pub fn with_list(mut self, list: impl Into<String>) -> Self {
        self.list = list.into();
        self
    }

    /// Set the scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Set the served contexts.
    pub fn with_kinds<S: Into<String>>(mut self, kinds: impl IntoIterator<Item = S>) -> Self {
        self.kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Add a parameter to the configuration.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Get a parameter value.
    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parse a parameter value as f32. See [`parse_param_value`].
    pub fn parse_param(&self, key: &str) -> Option<f32> {
        parse_param_value(self.params.get(key)?)
    }
}

/// Parse a parameter value string into an f32.
///
/// Supports:
/// - Plain numbers: "0.5", "3", "-0.3"
/// - Percentages: "50%" (divided by 100)
/// - Decibels: "-6dB", "+3dB" (converted to linear gain)
pub fn parse_param_value(value: &str) -> Option<f32> {
    let value = value.trim();

    if let Some(pct) = value.strip_suffix('%') {
        return pct.trim().parse::<f32>().ok().map(|v| v / 100.0);
    }

    if let Some(db) = value
        .strip_suffix("dB")
        .or_else(|| value.strip_suffix("db"))
    {
        return db
            .trim()
            .parse::<f32>()
            .ok()
            .map(|v| 10.0f32.powf(v / 20.0));
    }

    value.parse::<f32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_config_defaults() {
        let config = TemplateConfig::new("render");
        assert_eq!(config.list, "play");
        assert_eq!(config.scope, "channel");
        assert!(config.kinds.is_empty());
        assert!(config.params.is_empty());
    }

    #[test]
    fn test_template_config_builder() {
        let config = TemplateConfig::new("gain")
            .with_list("recall")
            .with_scope("audio")
            .with_kinds(["sequencer", "notation"])
            .with_param("gain", "0.5");
        assert_eq!(config.list, "recall");
        assert_eq!(config.scope, "audio");
        assert_eq!(config.kinds, vec!["sequencer", "notation"]);
        assert_eq!(config.get_param("gain"), Some("0.5"));
        assert_eq!(config.get_param("missing"), None);
    }

    #[test]
    fn test_parse_formats() {
        assert_eq!(parse_param_value("0.5"), Some(0.5));
        assert_eq!(parse_param_value(" 12 "), Some(12.0));
        assert_eq!(parse_param_value("50%"), Some(0.5));
        assert!((parse_param_value("-6dB").unwrap() - 0.501_187).abs() < 1e-4);
        assert!((parse_param_value("0db").unwrap() - 1.0).abs() < 1e-6);
        assert_eq!(parse_param_value("loud"), None);
        assert_eq!(parse_param_value("%"), None);
    }

    #[test]
    fn test_defaults_fill_in_on_deserialize() {
        let config: TemplateConfig = toml::from_str(r#"recall = "render""#).unwrap();
        assert_eq!(config, TemplateConfig::new("render"));
    }
}
