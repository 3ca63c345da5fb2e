//! Node description file format and operations.

use std::path::Path;

use rivulet_core::{
    AudioNode, Automation, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, Direction, Note, NodeFlags,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::registry::RecallRegistry;
use crate::template_config::TemplateConfig;
use crate::validation::{ValidationResult, parse_flags, validate_node_config};

/// Description of an audio node: flags, shape, recall templates and score.
///
/// # TOML Format
///
/// ```toml
/// name = "drum"
/// sample_rate = 48000
/// buffer_size = 256
/// flags = ["async", "input_has_own_recycling"]
/// audio_channels = 2
/// input_pads = 8
/// output_pads = 1
///
/// [[templates]]
/// recall = "render"
/// kinds = ["playback", "sequencer"]
///
/// [[templates]]
/// recall = "gain"
/// params = { gain = "-6dB" }
///
/// [[automation]]
/// audio_channel = 0
/// control = "gain"
/// points = [{ x = 0, value = 0.0 }, { x = 16, value = 1.0 }]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    /// Node name.
    pub name: String,

    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Sample rate of every recycling.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Frames per recycling buffer.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Node flag names (e.g. "sync", "input_has_own_recycling").
    #[serde(default)]
    pub flags: Vec<String>,

    /// Audio channels per pad.
    #[serde(default)]
    pub audio_channels: usize,

    /// Input pads.
    #[serde(default)]
    pub input_pads: usize,

    /// Output pads.
    #[serde(default)]
    pub output_pads: usize,

    /// Recall templates in insertion order.
    #[serde(default)]
    pub templates: Vec<TemplateConfig>,

    /// Score notes; requires the "has_score_track" flag.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<NoteConfig>,

    /// Control automation lanes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub automation: Vec<AutomationConfig>,
}

/// One note of a node description.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteConfig {
    /// Audio channel whose notation receives the note.
    pub audio_channel: usize,
    /// Start position in ticks.
    pub x0: u32,
    /// End position in ticks (exclusive).
    pub x1: u32,
    /// Pad the note plays on.
    pub y: u32,
}

/// One automation lane of a node description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutomationConfig {
    /// Audio channel the lane belongs to.
    pub audio_channel: usize,
    /// Automated control name.
    pub control: String,
    /// Breakpoints in any order.
    #[serde(default)]
    pub points: Vec<PointConfig>,
}

/// Breakpoint of an automation lane.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PointConfig {
    /// Position in ticks.
    pub x: u32,
    /// Control value.
    pub value: f32,
}

impl AutomationConfig {
    fn to_automation(&self) -> Automation {
        self.points.iter().fold(
            Automation::new(self.audio_channel, self.control.clone()),
            |lane, p| lane.with_point(p.x, p.value),
        )
    }
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

impl NodeConfig {
    /// Create an empty description.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            flags: Vec::new(),
            audio_channels: 0,
            input_pads: 0,
            output_pads: 0,
            templates: Vec::new(),
            notes: Vec::new(),
            automation: Vec::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the flag names.
    pub fn with_flags<S: Into<String>>(mut self, flags: impl IntoIterator<Item = S>) -> Self {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Set audio channels and pads.
    pub fn with_shape(mut self, audio_channels: usize, input_pads: usize, output_pads: usize) -> Self {
        self.audio_channels = audio_channels;
        self.input_pads = input_pads;
        self.output_pads = output_pads;
        self
    }

    /// Set the sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the buffer size.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Append a template.
    pub fn with_template(mut self, template: TemplateConfig) -> Self {
        self.templates.push(template);
        self
    }

    /// Append a note.
    pub fn with_note(mut self, audio_channel: usize, note: Note) -> Self {
        self.notes.push(NoteConfig {
            audio_channel,
            x0: note.x0,
            x1: note.x1,
            y: note.y,
        });
        self
    }

    /// Append an automation lane.
    pub fn with_automation(mut self, automation: &Automation) -> Self {
        self.automation.push(AutomationConfig {
            audio_channel: automation.audio_channel,
            control: automation.control.clone(),
            points: automation
                .points()
                .iter()
                .map(|p| PointConfig { x: p.x, value: p.value })
                .collect(),
        });
        self
    }

    /// Load a description from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Load a description from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the description to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the description to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Parsed flag set.
    pub fn node_flags(&self) -> ValidationResult<NodeFlags> {
        parse_flags(&self.flags)
    }

    /// Validate against `registry`, then create the node.
    ///
    /// Steps run in a fixed order: sample rate, buffer size, flags, audio
    /// channels, input pads, output pads, templates, notes, automation.
    pub fn build(&self, registry: &RecallRegistry) -> Result<AudioNode, ConfigError> {
        validate_node_config(self, registry)?;

        let node = AudioNode::new(self.name.clone());
        node.set_sample_rate(self.sample_rate)?;
        node.set_buffer_size(self.buffer_size)?;
        node.set_flags(self.node_flags()?)?;
        node.set_audio_channel_count(self.audio_channels)?;
        node.set_pad_count(Direction::Input, self.input_pads)?;
        node.set_pad_count(Direction::Output, self.output_pads)?;

        for template in &self.templates {
            node.add_recall_template(registry.template(template)?)?;
        }
        for note in &self.notes {
            node.add_note(note.audio_channel, Note::new(note.x0, note.x1, note.y))?;
        }
        for lane in &self.automation {
            node.add_automation(lane.to_automation())?;
        }

        tracing::debug!(
            "build: '{}' {} templates, {} notes, {} automation lanes",
            self.name,
            self.templates.len(),
            self.notes.len(),
            self.automation.len()
        );

        Ok(node)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new("Untitled")
    }
}
