use std::path::Path;
use std::process::Command;

use tracing::{debug, error, info, warn};

use crate::error::{DepthVideoError, Result, VideoError};
use crate::video::ffmpeg::{FfmpegTools, FfmpegWriter};
use crate::video::types::{Frame, PixelFormat, VideoArtifact};

pub const DEFAULT_COLOR_CODEC: &str = "libx264";
pub const DEFAULT_DEPTH_CODEC: &str = "ffv1";

/// Encodes frame sequences into video files.
///
/// The first frame decides the path: 16-bit grayscale and raw depth fields
/// go to a lossless `.avi`, RGB frames to an H.264 `.mp4`.
pub struct FrameSink {
    tools: FfmpegTools,
    color_codec: String,
    depth_codec: String,
}

impl FrameSink {
    pub fn new(tools: FfmpegTools) -> Self {
        Self {
            tools,
            color_codec: DEFAULT_COLOR_CODEC.to_string(),
            depth_codec: DEFAULT_DEPTH_CODEC.to_string(),
        }
    }

    pub fn with_codecs<S: Into<String>>(mut self, color_codec: S, depth_codec: S) -> Self {
        self.color_codec = color_codec.into();
        self.depth_codec = depth_codec.into();
        self
    }

    /// File extension used for frames of `format`
    pub fn extension_for(format: PixelFormat) -> &'static str {
        if format.is_high_bit_depth() {
            "avi"
        } else {
            "mp4"
        }
    }

    /// Encode `frames` into `<output_dir>/<base_name>.<ext>`
    pub fn write(
        &self,
        fps: f64,
        frames: &[Frame],
        output_dir: &Path,
        base_name: &str,
        bitrate_kbps: Option<u32>,
    ) -> Result<VideoArtifact> {
        let first = frames.first().ok_or_else(|| VideoError::InvalidParameters {
            details: format!("{}: no frames to encode", base_name),
        })?;
        if !(fps.is_finite() && fps > 0.0) {
            return Err(VideoError::InvalidParameters {
                details: format!("{}: invalid frame rate {}", base_name, fps),
            }
            .into());
        }

        let format = first.pixel_format();
        let (width, height) = first.dimensions();
        validate_frames(frames, format, (width, height))?;

        let file_name = format!("{}.{}", base_name, Self::extension_for(format));
        let path = output_dir.join(&file_name);

        let cmd = if format.is_high_bit_depth() {
            self.depth_command(fps, width, height, &path)
        } else {
            self.color_command(fps, width, height, bitrate_kbps, &path)
        };
        if let Err(e) = self.encode(cmd, frames, &path) {
            error!("Saving {} failed: {}", path.display(), e);
            return Err(match e {
                DepthVideoError::Video(VideoError::EncodingFailed { reason }) => VideoError::EncodingFailed {
                    reason: format!("Saving the video failed! {}", reason),
                }
                .into(),
                other => other,
            });
        }

        info!("Saved {} frames to {}", frames.len(), path.display());
        Ok(VideoArtifact {
            file_name,
            path,
            fps,
            format,
            frame_count: frames.len(),
        })
    }

    fn depth_command(&self, fps: f64, width: u32, height: u32, path: &Path) -> Command {
        let mut cmd = self.tools.ffmpeg_command();
        cmd.args(raw_input_args(PixelFormat::Gray16, fps, width, height))
            .args(["-c:v", self.depth_codec.as_str(), "-pix_fmt", "gray16le", "-y"])
            .arg(path);
        cmd
    }

    fn color_command(
        &self,
        fps: f64,
        width: u32,
        height: u32,
        bitrate_kbps: Option<u32>,
        path: &Path,
    ) -> Command {
        let mut cmd = self.tools.ffmpeg_command();
        cmd.args(raw_input_args(PixelFormat::Rgb24, fps, width, height))
            // yuv420p needs even dimensions
            .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
            .args(["-c:v", self.color_codec.as_str(), "-pix_fmt", "yuv420p"]);
        if let Some(kbps) = bitrate_kbps {
            cmd.arg("-b:v").arg(format!("{}k", kbps));
        }
        cmd.arg("-y").arg(path);
        cmd
    }

    fn encode(&self, cmd: Command, frames: &[Frame], path: &Path) -> Result<()> {
        let mut writer = FfmpegWriter::spawn(&self.tools, cmd, path)?;
        let result = frames
            .iter()
            .try_for_each(|frame| writer.write_frame(&frame.to_raw_bytes()))
            .and_then(|_| writer.finish());

        if result.is_err() && path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Could not remove partial output {}: {}", path.display(), e);
            }
        }
        result
    }
}

fn raw_input_args(format: PixelFormat, fps: f64, width: u32, height: u32) -> Vec<String> {
    vec![
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        format.ffmpeg_name().to_string(),
        "-s".to_string(),
        format!("{}x{}", width, height),
        "-r".to_string(),
        fps.to_string(),
        "-i".to_string(),
        "pipe:0".to_string(),
    ]
}

/// Every frame must share the first frame's size and representation
fn validate_frames(frames: &[Frame], format: PixelFormat, size: (u32, u32)) -> Result<()> {
    for (i, frame) in frames.iter().enumerate() {
        if frame.pixel_format() != format || frame.dimensions() != size {
            debug!("Frame {} is {:?} {:?}", i, frame.pixel_format(), frame.dimensions());
            return Err(VideoError::EncodingFailed {
                reason: format!(
                    "frame {} is {:?} at {}x{}, expected {:?} at {}x{}",
                    i,
                    frame.pixel_format(),
                    frame.width(),
                    frame.height(),
                    format,
                    size.0,
                    size.1
                ),
            }
            .into());
        }
    }
    Ok(())
}
