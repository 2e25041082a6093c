use thiserror::Error;

/// Main error type for the depth-video library
#[derive(Error, Debug)]
pub enum DepthVideoError {
    #[error("Video processing error: {0}")]
    Video(#[from] VideoError),

    #[error("Stitching error: {0}")]
    Stitch(#[from] StitchError),

    #[error("Depth processing error: {0}")]
    Depth(#[from] DepthError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Decoding and encoding errors
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Failed to load video file: {path}")]
    LoadFailed { path: String },

    #[error("Probably an unsupported file format: {format}")]
    UnsupportedFormat {
        format: String,
        #[source]
        source: Option<image::ImageError>,
    },

    #[error("Video decoding failed: {reason}")]
    DecodingFailed { reason: String },

    #[error("Video encoding failed: {reason}")]
    EncodingFailed { reason: String },

    #[error("Invalid video parameters: {details}")]
    InvalidParameters { details: String },

    #[error("External tool '{tool}' could not be started")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

/// Lossless concatenation errors
#[derive(Error, Debug)]
pub enum StitchError {
    #[error("No segments to stitch")]
    NoSegments,

    #[error("Segment not found: {path}")]
    MissingSegment { path: String },

    #[error("Concatenation failed: {reason}")]
    Failed { reason: String },
}

/// Depth field errors
#[derive(Error, Debug)]
pub enum DepthError {
    #[error("Depth field shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Depth field buffer has {len} values, expected {expected}")]
    BufferSize { len: usize, expected: usize },
}

/// Orchestration errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Custom depthmap video length does not match input video length ({depth} != {input})")]
    DepthVideoMismatch { input: usize, depth: usize },

    #[error("Unsupported request: {reason}")]
    UnsupportedRequest { reason: String },

    #[error("Batch {batch} produced kinds {actual:?}, expected {expected:?}")]
    InconsistentKinds {
        batch: usize,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Generator output invalid: {reason}")]
    GeneratorOutput { reason: String },
}

/// Generator-specific errors
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Generator not found: {name}")]
    NotFound { name: String },

    #[error("Generation failed: {reason}")]
    GenerationFailed { reason: String },

    #[error("Generator configuration invalid: {details}")]
    InvalidConfig { details: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {key}")]
    MissingKey { key: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using DepthVideoError
pub type Result<T> = std::result::Result<T, DepthVideoError>;

impl DepthVideoError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Video(VideoError::LoadFailed { .. }) => true,
            Self::Video(VideoError::ToolUnavailable { .. }) => true,
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Video(VideoError::LoadFailed { path }) => {
                format!("Could not load video file '{}'. Please check the file exists and is a supported format.", path)
            }
            Self::Video(VideoError::UnsupportedFormat { format, .. }) => {
                format!("Probably an unsupported file format: {}", format)
            }
            Self::Video(VideoError::EncodingFailed { .. }) => "Saving the video failed!".to_string(),
            Self::Video(VideoError::ToolUnavailable { tool, .. }) => {
                format!("'{}' was not found. Please install FFmpeg and make sure it is on PATH.", tool)
            }
            Self::Stitch(_) => {
                "Joining the video segments failed. The per-batch videos were kept in the output directory.".to_string()
            }
            Self::Pipeline(PipelineError::DepthVideoMismatch { .. }) => {
                "Custom depthmap video length does not match input video length".to_string()
            }
            Self::Pipeline(PipelineError::UnsupportedRequest { reason }) => reason.clone(),
            Self::Generator(GeneratorError::NotFound { name }) => {
                format!("Generator '{}' not found. Available generators: luminance", name)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}
