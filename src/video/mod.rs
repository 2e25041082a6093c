//! # Video Module
//!
//! Decoding inputs into frame batches, encoding frame sequences back into
//! video files, and losslessly stitching per-batch segments together.
//!
//! All encode and decode work goes through the `ffmpeg`/`ffprobe` binaries
//! (see [`FfmpegTools`]); animated GIFs and still images are decoded with the
//! `image` crate.

pub mod ffmpeg;
pub mod probe;
pub mod sink;
pub mod source;
pub mod stitcher;
pub mod types;

pub use ffmpeg::FfmpegTools;
pub use probe::{probe_video, StreamInfo};
pub use sink::FrameSink;
pub use source::{ContainerKind, DecodeStrategy, FrameBatches, FrameSource, SourceOptions};
pub use stitcher::SegmentStitcher;
pub use types::{Batch, Frame, Gray16Image, PixelFormat, VideoArtifact};
