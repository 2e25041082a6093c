//! # Depth-Video
//!
//! Turn a video into depth-map and derived videos with a bounded-memory
//! batch pipeline.
//!
//! Frames are decoded in fixed-size batches, run through a per-frame
//! [`Generator`](generator::Generator), temporally smoothed when depth is
//! computed from scratch, encoded per output kind and finally stitched back
//! into one video per kind.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use depth_video::{config::Config, generator::GeneratorRegistry, pipeline::VideoPipeline};
//!
//! # fn main() -> depth_video::Result<()> {
//! let config = Config::default();
//! let generator = GeneratorRegistry::new().create(&config.generation.generator)?;
//!
//! let mut pipeline = VideoPipeline::new(config, generator)?;
//! let report = pipeline.run("input.mp4", None)?;
//! println!("{}", report.message());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`video`] - Decoding, encoding and stitching through ffmpeg
//! - [`depth`] - Depth fields and temporal smoothing
//! - [`generator`] - The per-frame output generator seam
//! - [`pipeline`] - Orchestration of a whole run
//! - [`config`] - Configuration management
//!
//! ## Custom Generators
//!
//! A depth model plugs in by implementing [`Generator`](generator::Generator)
//! and registering it with the [`GeneratorRegistry`](generator::GeneratorRegistry).

pub mod config;
pub mod depth;
pub mod error;
pub mod generator;
pub mod pipeline;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    error::{DepthVideoError, Result},
    generator::{Generator, GeneratorRegistry},
    pipeline::{RunReport, VideoPipeline},
};
