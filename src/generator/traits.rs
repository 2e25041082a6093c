use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{GeneratorError, Result};
use crate::video::types::Frame;

/// Parameters the depth-only first pass keeps from the full configuration
pub const FIRST_PASS_KEYS: [&str; 6] = [
    "compute_device",
    "model_type",
    "boost",
    "net_size_match",
    "net_width",
    "net_height",
];

/// Label of an output stream, e.g. `depth` or `heatmap`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(String);

impl Kind {
    pub const DEPTH: &'static str = "depth";

    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }

    pub fn depth() -> Self {
        Self::new(Self::DEPTH)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_depth(&self) -> bool {
        self.0 == Self::DEPTH
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Kind {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Kind {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One frame of generator output
#[derive(Debug, Clone)]
pub struct GeneratedFrame {
    /// Position of the source frame within the batch
    pub index: usize,
    pub kind: Kind,
    pub frame: Frame,
}

/// Per-frame output generator.
///
/// Generators are pure and order preserving per call: frame `i` of the input
/// produces the outputs tagged with `index == i`.
pub trait Generator: Send + Sync {
    /// Returns the unique name of this generator
    fn name(&self) -> &str;

    /// Returns a human-readable description of this generator
    fn description(&self) -> &str;

    /// Kinds this generator is able to produce
    fn supported_kinds(&self) -> Vec<Kind>;

    /// Produce outputs for a batch of frames.
    ///
    /// # Arguments
    ///
    /// * `frames` - Decoded input frames of one batch
    /// * `depths` - Depth per input frame, when depth is already known
    /// * `config` - Requested outputs and model parameters
    ///
    /// With `config.depth_prediction` set the result is one raw
    /// [`Frame::Field`] of kind `depth` per input frame.
    fn generate(
        &self,
        frames: &[Frame],
        depths: Option<&[Frame]>,
        config: &GenerationConfig,
    ) -> Result<Vec<GeneratedFrame>>;

    /// Extra parameters the depth-only first pass needs besides the model keys
    fn first_pass_keys(&self) -> &[&str] {
        &[]
    }

    /// Check that every requested output is supported
    fn validate_config(&self, config: &GenerationConfig) -> Result<()> {
        let supported = self.supported_kinds();
        if let Some(kind) = config.outputs.iter().find(|k| !supported.contains(k)) {
            return Err(GeneratorError::InvalidConfig {
                details: format!("'{}' cannot produce output '{}'", self.name(), kind),
            }
            .into());
        }
        Ok(())
    }
}

/// What a generator call should produce
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Requested output kinds, in output order
    pub outputs: Vec<Kind>,

    pub gen_simple_mesh: bool,

    pub gen_inpainted_mesh: bool,

    /// Return raw, unnormalized depth instead of the requested outputs
    #[serde(default)]
    pub depth_prediction: bool,

    /// Model and device options, opaque to the pipeline
    #[serde(default)]
    pub parameters: HashMap<String, ConfigValue>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            outputs: vec![Kind::depth()],
            gen_simple_mesh: false,
            gen_inpainted_mesh: false,
            depth_prediction: false,
            parameters: HashMap::new(),
        }
    }
}

impl GenerationConfig {
    pub fn with_outputs<I, K>(outputs: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Kind>,
    {
        Self {
            outputs: outputs.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set a parameter value
    pub fn set<K: Into<String>, V: Into<ConfigValue>>(mut self, key: K, value: V) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Configuration for the depth-only pass: model keys only, raw prediction
    pub fn first_pass(&self) -> Self {
        self.first_pass_with(&[])
    }

    /// Like [`first_pass`](Self::first_pass), also keeping `extra_keys`
    pub fn first_pass_with(&self, extra_keys: &[&str]) -> Self {
        let parameters = self
            .parameters
            .iter()
            .filter(|(key, _)| FIRST_PASS_KEYS.contains(&key.as_str()) || extra_keys.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            outputs: Vec::new(),
            gen_simple_mesh: false,
            gen_inpainted_mesh: false,
            depth_prediction: true,
            parameters,
        }
    }

    pub fn requests_mesh(&self) -> bool {
        self.gen_simple_mesh || self.gen_inpainted_mesh
    }

    pub fn get_f32(&self, key: &str) -> Option<f32> {
        self.parameters.get(key).and_then(|v| v.as_f32())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.parameters.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_string())
    }

    pub fn get_f32_or(&self, key: &str, default: f32) -> f32 {
        self.get_f32(key).unwrap_or(default)
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }
}

/// Flexible parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    // integers first so whole numbers are not read as floats
    Integer(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

impl ConfigValue {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            ConfigValue::Float(f) => Some(*f as f32),
            ConfigValue::Integer(i) => Some(*i as f32),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f32> for ConfigValue {
    fn from(value: f32) -> Self {
        ConfigValue::Float(value as f64)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Integer(value)
    }
}

impl From<i32> for ConfigValue {
    fn from(value: i32) -> Self {
        ConfigValue::Integer(value as i64)
    }
}
