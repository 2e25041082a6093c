//! # Depth Processing Module
//!
//! Raw per-frame depth fields and the temporal post-processing applied to a
//! batch of them before they are turned into output frames.

pub mod field;
pub mod smoother;

pub use field::DepthField;
pub use smoother::{percentile_pair, SmoothingMode, TemporalSmoother};
