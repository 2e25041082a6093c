//! # Pipeline Module
//!
//! End-to-end orchestration of one video: batching, depth acquisition,
//! generation, per-kind encoding, stitching and cleanup.

pub mod engine;
pub mod sequence;

pub use engine::{remove_intermediates, RunReport, StitchedOutput, VideoPipeline};
pub use sequence::SequenceAllocator;
