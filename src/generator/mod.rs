//! # Generator Module
//!
//! The seam to the per-frame output model. A [`Generator`] turns a batch of
//! frames (and optionally known depth) into frames tagged by output
//! [`Kind`]. Generators are looked up by name in the [`GeneratorRegistry`].
//!
//! ```rust,no_run
//! use depth_video::generator::{GenerationConfig, GeneratorRegistry};
//!
//! let registry = GeneratorRegistry::new();
//! let generator = registry.create("luminance").unwrap();
//! let config = GenerationConfig::with_outputs(["depth", "heatmap"]);
//! # let _ = (generator, config);
//! ```

pub mod luminance;
pub mod registry;
pub mod traits;

pub use luminance::LuminanceGenerator;
pub use registry::GeneratorRegistry;
pub use traits::{ConfigValue, GeneratedFrame, GenerationConfig, Generator, Kind};
