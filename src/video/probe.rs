use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, VideoError};
use crate::video::ffmpeg::{spawn_error, FfmpegTools};

/// Properties of the first video stream of a file
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub pix_fmt: String,
    pub avg_frame_rate: Option<f64>,
    pub r_frame_rate: Option<f64>,
    /// Exact count when packets were counted, otherwise the container's claim
    pub frame_count: Option<usize>,
}

impl StreamInfo {
    /// Whether the stream stores single-channel 16-bit samples
    pub fn is_gray16(&self) -> bool {
        matches!(self.pix_fmt.as_str(), "gray16le" | "gray16be")
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    nb_read_packets: Option<String>,
}

/// Run ffprobe on the first video stream of `path`.
///
/// With `count_packets` the whole file is demuxed to get an exact count.
pub fn probe_video(tools: &FfmpegTools, path: &Path, count_packets: bool) -> Result<StreamInfo> {
    let mut cmd = tools.ffprobe_command();
    cmd.args(["-select_streams", "v:0"]);
    if count_packets {
        cmd.arg("-count_packets");
    }
    cmd.args([
        "-show_entries",
        "stream=width,height,pix_fmt,avg_frame_rate,r_frame_rate,nb_frames,nb_read_packets",
        "-of",
        "json",
    ])
    .arg(path);

    debug!("Probing {:?}", path);
    let output = cmd
        .output()
        .map_err(|e| spawn_error(tools.ffprobe_name(), e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VideoError::LoadFailed {
            path: format!("{}: ffprobe failed: {}", path.display(), stderr.trim()),
        }
        .into());
    }

    let json = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&json).map_err(|reason| {
        VideoError::LoadFailed {
            path: format!("{}: {}", path.display(), reason),
        }
        .into()
    })
}

fn parse_probe_output(json: &str) -> std::result::Result<StreamInfo, String> {
    let parsed: ProbeOutput =
        serde_json::from_str(json).map_err(|e| format!("invalid ffprobe output: {}", e))?;

    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "no video stream".to_string())?;

    let frame_count = stream
        .nb_read_packets
        .as_deref()
        .or(stream.nb_frames.as_deref())
        .and_then(|n| n.parse().ok());

    Ok(StreamInfo {
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        pix_fmt: stream.pix_fmt.unwrap_or_default(),
        avg_frame_rate: stream.avg_frame_rate.as_deref().and_then(parse_rate),
        r_frame_rate: stream.r_frame_rate.as_deref().and_then(parse_rate),
        frame_count,
    })
}

/// Parse an ffmpeg rational such as `30000/1001`; `0/0` yields `None`
pub fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("25/1"), Some(25.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("24"), Some(24.0));
        assert_eq!(parse_rate("abc"), None);
    }

    #[test]
    fn test_parse_probe_output() {
        let json = r#"{
            "programs": [],
            "streams": [{
                "width": 640, "height": 360, "pix_fmt": "gray16le",
                "avg_frame_rate": "25/1", "r_frame_rate": "25/1",
                "nb_read_packets": "250"
            }]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!((info.width, info.height), (640, 360));
        assert!(info.is_gray16());
        assert_eq!(info.avg_frame_rate, Some(25.0));
        assert_eq!(info.frame_count, Some(250));
    }

    #[test]
    fn test_parse_probe_without_stream() {
        assert!(parse_probe_output(r#"{"streams": []}"#).is_err());
        assert!(parse_probe_output("not json").is_err());
    }
}
