use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::{
    depth::SmoothingMode,
    error::{ConfigError, Result},
    generator::{ConfigValue, GenerationConfig, Kind},
    video::{
        sink::{DEFAULT_COLOR_CODEC, DEFAULT_DEPTH_CODEC},
        FfmpegTools, SourceOptions,
    },
};

/// Main configuration for depth video generation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Decoding and batching
    pub video: VideoConfig,

    /// External tools and codecs
    pub encoding: EncodingConfig,

    /// Temporal post-processing of computed depth
    pub smoothing: SmoothingConfig,

    /// Generator selection and requested outputs
    pub generation: GenerationSection,

    /// Where results are written
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            value: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.video.validate()?;
        self.encoding.validate()?;
        self.generation.validate()?;
        self.output.validate()?;
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Decoding and batching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Frames per batch; bounds memory use
    pub batch_size: usize,

    /// Stop after this many input frames
    pub max_frames: Option<usize>,

    /// Threads for per-frame work inside a batch
    pub processing_threads: usize,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_frames: None,
            processing_threads: num_cpus::get(),
        }
    }
}

impl VideoConfig {
    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(invalid("video.batch_size", self.batch_size).into());
        }

        if self.max_frames == Some(0) {
            return Err(invalid("video.max_frames", 0).into());
        }

        if self.processing_threads == 0 {
            return Err(invalid("video.processing_threads", self.processing_threads).into());
        }

        Ok(())
    }

    /// Decode options for the input video, or the custom depth video
    pub fn source_options(&self, maybe_depth_video: bool) -> SourceOptions {
        SourceOptions {
            maybe_depth_video,
            batch_size: self.batch_size,
            max_frames: self.max_frames,
        }
    }
}

/// External tools and codec configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    pub ffmpeg: PathBuf,

    pub ffprobe: PathBuf,

    /// Codec for 8-bit color outputs
    pub color_codec: String,

    /// Lossless codec for 16-bit depth outputs
    pub depth_codec: String,

    /// Target bitrate of color outputs in kbit/s; codec default when unset
    pub colorvids_bitrate: Option<u32>,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        let tools = FfmpegTools::default();
        Self {
            ffmpeg: tools.ffmpeg,
            ffprobe: tools.ffprobe,
            color_codec: DEFAULT_COLOR_CODEC.to_string(),
            depth_codec: DEFAULT_DEPTH_CODEC.to_string(),
            colorvids_bitrate: None,
        }
    }
}

impl EncodingConfig {
    fn validate(&self) -> Result<()> {
        if self.color_codec.trim().is_empty() {
            return Err(invalid("encoding.color_codec", &self.color_codec).into());
        }

        if self.depth_codec.trim().is_empty() {
            return Err(invalid("encoding.depth_codec", &self.depth_codec).into());
        }

        if self.colorvids_bitrate == Some(0) {
            return Err(invalid("encoding.colorvids_bitrate", 0).into());
        }

        Ok(())
    }

    pub fn tools(&self) -> FfmpegTools {
        FfmpegTools::new(self.ffmpeg.clone(), self.ffprobe.clone())
    }
}

/// Temporal smoothing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub mode: SmoothingMode,
}

/// Generator selection and output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    /// Registered generator name
    pub generator: String,

    /// Output kinds to produce
    pub outputs: Vec<Kind>,

    pub gen_simple_mesh: bool,

    pub gen_inpainted_mesh: bool,

    /// Model and device options passed through to the generator
    pub parameters: HashMap<String, ConfigValue>,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            generator: "luminance".to_string(),
            outputs: vec![Kind::depth()],
            gen_simple_mesh: false,
            gen_inpainted_mesh: false,
            parameters: HashMap::new(),
        }
    }
}

impl GenerationSection {
    fn validate(&self) -> Result<()> {
        if self.generator.trim().is_empty() {
            return Err(ConfigError::MissingKey {
                key: "generation.generator".to_string(),
            }
            .into());
        }

        if self.outputs.is_empty() {
            return Err(ConfigError::MissingKey {
                key: "generation.outputs".to_string(),
            }
            .into());
        }

        let mut seen = HashSet::new();
        if let Some(kind) = self.outputs.iter().find(|k| !seen.insert(*k)) {
            return Err(invalid("generation.outputs", format!("duplicate '{}'", kind)).into());
        }

        Ok(())
    }

    /// Full configuration handed to the generator
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            outputs: self.outputs.clone(),
            gen_simple_mesh: self.gen_simple_mesh,
            gen_inpainted_mesh: self.gen_inpainted_mesh,
            depth_prediction: false,
            parameters: self.parameters.clone(),
        }
    }
}

/// Output location configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,

    /// Leave per-batch videos in place after stitching
    pub keep_intermediates: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("outputs/depthmap-videos"),
            keep_intermediates: false,
        }
    }
}

impl OutputConfig {
    fn validate(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(ConfigError::MissingKey {
                key: "output.directory".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
