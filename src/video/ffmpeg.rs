use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, VideoError};
use crate::video::types::{Frame, PixelFormat};

/// Locations of the external ffmpeg executables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl FfmpegTools {
    pub fn new<P: Into<PathBuf>>(ffmpeg: P, ffprobe: P) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn check_available(&self) -> bool {
        Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// ffmpeg with the flags every invocation shares
    pub fn ffmpeg_command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-nostdin", "-loglevel", "error"]);
        cmd
    }

    pub fn ffprobe_command(&self) -> Command {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "error"]);
        cmd
    }

    pub(crate) fn ffmpeg_name(&self) -> String {
        self.ffmpeg.display().to_string()
    }

    pub(crate) fn ffprobe_name(&self) -> String {
        self.ffprobe.display().to_string()
    }
}

pub(crate) fn spawn_error(tool: String, source: std::io::Error) -> VideoError {
    VideoError::ToolUnavailable { tool, source }
}

/// Reads a child's stderr on a helper thread so a full pipe never stalls it
struct StderrCollector {
    handle: Option<JoinHandle<String>>,
}

impl StderrCollector {
    fn attach(child: &mut Child) -> Self {
        let handle = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text);
                text
            })
        });
        Self { handle }
    }

    fn collect(&mut self) -> String {
        self.handle
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

fn terminate(child: &mut Child) {
    if let Ok(None) = child.try_wait() {
        let _ = child.kill();
    }
    let _ = child.wait();
}

/// Streams decoded frames out of an ffmpeg rawvideo pipe.
///
/// The child process is killed and reaped on drop, so breaking out of the
/// frame loop early never leaks a decoder.
pub struct FfmpegReader {
    child: Child,
    stdout: ChildStdout,
    stderr: StderrCollector,
    format: PixelFormat,
    width: u32,
    height: u32,
    frame_bytes: usize,
    finished: bool,
    source: String,
}

impl FfmpegReader {
    pub fn spawn(
        tools: &FfmpegTools,
        path: &Path,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(VideoError::InvalidParameters {
                details: format!("{}: stream reports {}x{}", path.display(), width, height),
            }
            .into());
        }

        let mut cmd = tools.ffmpeg_command();
        cmd.arg("-noautorotate")
            .arg("-i")
            .arg(path)
            // every decoded frame exactly once, even for variable frame rate input
            .args(["-map", "0:v:0", "-fps_mode", "passthrough"])
            .args(["-f", "rawvideo", "-pix_fmt", format.ffmpeg_name(), "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Spawning decoder: {:?}", cmd);
        let mut child = cmd
            .spawn()
            .map_err(|e| spawn_error(tools.ffmpeg_name(), e))?;

        let stderr = StderrCollector::attach(&mut child);
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                terminate(&mut child);
                return Err(VideoError::DecodingFailed {
                    reason: "decoder stdout unavailable".to_string(),
                }
                .into());
            }
        };

        Ok(Self {
            child,
            stdout,
            stderr,
            format,
            width,
            height,
            frame_bytes: width as usize * height as usize * format.bytes_per_pixel(),
            finished: false,
            source: path.display().to_string(),
        })
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let mut buffer = vec![0u8; self.frame_bytes];
        let mut filled = 0;

        while filled < self.frame_bytes {
            match self.stdout.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled < self.frame_bytes {
            return Err(VideoError::DecodingFailed {
                reason: format!(
                    "{}: truncated frame ({} of {} bytes)",
                    self.source, filled, self.frame_bytes
                ),
            }
            .into());
        }

        Frame::from_raw_bytes(self.format, self.width, self.height, buffer)
            .map(Some)
            .ok_or_else(|| {
                VideoError::DecodingFailed {
                    reason: format!("{}: frame buffer does not match {}x{}", self.source, self.width, self.height),
                }
                .into()
            })
    }

    /// Reap the decoder once its output is exhausted
    fn close(&mut self) -> Result<()> {
        self.finished = true;
        let status = self.child.wait()?;
        let stderr = self.stderr.collect();
        if !status.success() {
            return Err(VideoError::DecodingFailed {
                reason: format!("{}: ffmpeg exited with {}: {}", self.source, status, stderr.trim()),
            }
            .into());
        }
        Ok(())
    }
}

impl Iterator for FfmpegReader {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => self.close().err().map(Err),
            Err(e) => {
                self.finished = true;
                terminate(&mut self.child);
                Some(Err(e))
            }
        }
    }
}

impl Drop for FfmpegReader {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Stopping decoder for {} before end of stream", self.source);
            terminate(&mut self.child);
        }
    }
}

/// Feeds raw frames into an ffmpeg encoder through stdin.
///
/// The process is opened once, fed in order and closed exactly once; if the
/// writer is dropped without `finish`, the encoder is killed.
pub struct FfmpegWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: StderrCollector,
    finished: bool,
    target: String,
}

impl FfmpegWriter {
    /// Spawn `cmd`, which must read rawvideo from `pipe:0`
    pub fn spawn(tools: &FfmpegTools, mut cmd: Command, target: &Path) -> Result<Self> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        debug!("Spawning encoder: {:?}", cmd);
        let mut child = cmd
            .spawn()
            .map_err(|e| spawn_error(tools.ffmpeg_name(), e))?;

        let stderr = StderrCollector::attach(&mut child);
        let stdin = child.stdin.take();

        Ok(Self {
            child,
            stdin,
            stderr,
            finished: false,
            target: target.display().to_string(),
        })
    }

    pub fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        let result = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(bytes),
            None => Err(std::io::Error::new(ErrorKind::BrokenPipe, "encoder stdin closed")),
        };

        if let Err(e) = result {
            self.stdin = None;
            self.finished = true;
            terminate(&mut self.child);
            let stderr = self.stderr.collect();
            return Err(VideoError::EncodingFailed {
                reason: format!("{}: writing frame failed ({}): {}", self.target, e, stderr.trim()),
            }
            .into());
        }
        Ok(())
    }

    /// Close stdin, wait for the encoder and check its exit status
    pub fn finish(mut self) -> Result<()> {
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        self.finished = true;
        drop(self.stdin.take());
        let status = self.child.wait()?;
        let stderr = self.stderr.collect();
        if !status.success() {
            return Err(VideoError::EncodingFailed {
                reason: format!("{}: ffmpeg exited with {}: {}", self.target, status, stderr.trim()),
            }
            .into());
        }
        if !stderr.trim().is_empty() {
            debug!("Encoder messages for {}: {}", self.target, stderr.trim());
        }
        Ok(())
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Encoder for {} dropped before finishing, killing it", self.target);
            self.stdin = None;
            terminate(&mut self.child);
        }
    }
}
