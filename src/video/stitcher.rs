use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::{Result, StitchError};
use crate::video::ffmpeg::FfmpegTools;

/// Joins same-codec segments into one file with ffmpeg's concat demuxer.
///
/// Streams are copied, never re-encoded.
pub struct SegmentStitcher {
    tools: FfmpegTools,
}

impl SegmentStitcher {
    pub fn new(tools: FfmpegTools) -> Self {
        Self { tools }
    }

    /// Contents of a concat manifest, one `file '<name>'` line per segment
    pub fn create_concat_manifest(file_names: &[String]) -> String {
        file_names
            .iter()
            .map(|name| format!("file '{}'", name.replace('\'', r"'\''")))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Concatenate `file_names` (all inside `dir`, in order) into `dir/output_name`.
    ///
    /// The manifest is removed whether or not ffmpeg succeeds. A failed run
    /// leaves no output file behind.
    pub fn concat(&self, dir: &Path, file_names: &[String], output_name: &str) -> Result<PathBuf> {
        if file_names.is_empty() {
            return Err(StitchError::NoSegments.into());
        }
        for name in file_names {
            let segment = dir.join(name);
            if !segment.is_file() {
                return Err(StitchError::MissingSegment {
                    path: segment.display().to_string(),
                }
                .into());
            }
        }

        let mut manifest = tempfile::Builder::new()
            .prefix("concat-")
            .suffix(".txt")
            .tempfile_in(dir)?;
        manifest.write_all(Self::create_concat_manifest(file_names).as_bytes())?;
        manifest.flush()?;
        debug!(
            "Manifest written ({} segments): {:?}",
            file_names.len(),
            manifest.path()
        );

        let output_path = dir.join(output_name);
        let result = self.run_concat(manifest.path(), &output_path);

        if let Err(e) = manifest.close() {
            warn!("Could not remove concat manifest: {}", e);
        }

        match result {
            Ok(()) => {
                info!("Merge complete: {}", output_path.display());
                Ok(output_path)
            }
            Err(e) => {
                error!("Concatenation into {} failed: {}", output_path.display(), e);
                if output_path.exists() {
                    let _ = std::fs::remove_file(&output_path);
                }
                Err(e)
            }
        }
    }

    fn run_concat(&self, manifest: &Path, output_path: &Path) -> Result<()> {
        let mut cmd = self.tools.ffmpeg_command();
        cmd.args(["-f", "concat", "-safe", "0", "-i"])
            .arg(manifest)
            .args(["-c", "copy", "-y"])
            .arg(output_path);

        debug!("Running concat: {:?}", cmd);
        let output = cmd.output().map_err(|e| StitchError::Failed {
            reason: format!("could not run {}: {}", self.tools.ffmpeg.display(), e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StitchError::Failed {
                reason: format!("ffmpeg exited with {}: {}", output.status, stderr.trim()),
            }
            .into());
        }
        Ok(())
    }
}
