use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage};
use tracing::{debug, info};

use crate::error::{Result, VideoError};
use crate::video::ffmpeg::{FfmpegReader, FfmpegTools};
use crate::video::probe::probe_video;
use crate::video::types::{Batch, Frame, PixelFormat};

/// Frame rate assumed for GIF frames that declare no delay
const GIF_FALLBACK_DELAY_MS: f64 = 100.0;

type FrameIter = Box<dyn Iterator<Item = Result<Frame>>>;

/// Container families, each with its own decode strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Animated GIF, frame rate from the per-frame delay
    AnimatedGif,
    /// AVCHD / MPEG transport stream, frame rate from the average stream rate
    TransportStream,
    /// Regular video containers
    Video,
    /// Anything else is tried as a single still image
    StillImage,
}

impl ContainerKind {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match extension(path.as_ref()).as_str() {
            "gif" => ContainerKind::AnimatedGif,
            "mts" | "m2ts" => ContainerKind::TransportStream,
            "webm" | "mp4" | "avi" | "mov" | "mkv" | "m4v" => ContainerKind::Video,
            _ => ContainerKind::StillImage,
        }
    }
}

/// One way of turning a file into frames. Strategies are tried in order;
/// a strategy that does not apply yields `None` and the next one runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    Gif,
    /// Single-channel 16-bit depth video, abandoned if the stream is not gray16
    Raw16,
    Stream { rate: RateField },
    StillImage,
}

/// Which ffprobe rate a stream strategy reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateField {
    Average,
    Real,
}

/// How a source should be opened
#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// Try the raw 16-bit depth interpretation first
    pub maybe_depth_video: bool,

    /// Maximum number of frames per batch
    pub batch_size: usize,

    /// Stop after this many frames in total
    pub max_frames: Option<usize>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            maybe_depth_video: false,
            batch_size: 100,
            max_frames: None,
        }
    }
}

struct DecodedStream {
    fps: f64,
    frames: FrameIter,
}

/// Decodes video, GIF and image files into frames
pub struct FrameSource {
    tools: FfmpegTools,
}

impl FrameSource {
    pub fn new(tools: FfmpegTools) -> Self {
        Self { tools }
    }

    /// Ordered decode strategies for a file
    pub fn strategies(path: &Path, maybe_depth_video: bool) -> Vec<DecodeStrategy> {
        match ContainerKind::from_path(path) {
            ContainerKind::AnimatedGif => vec![DecodeStrategy::Gif],
            ContainerKind::TransportStream => vec![DecodeStrategy::Stream {
                rate: RateField::Average,
            }],
            ContainerKind::Video if maybe_depth_video && extension(path) == "avi" => vec![
                DecodeStrategy::Raw16,
                DecodeStrategy::Stream { rate: RateField::Real },
            ],
            ContainerKind::Video => vec![DecodeStrategy::Stream { rate: RateField::Real }],
            ContainerKind::StillImage => vec![DecodeStrategy::StillImage],
        }
    }

    /// Open `path` as a lazy sequence of frame batches
    pub fn open_batches<P: AsRef<Path>>(&self, path: P, options: &SourceOptions) -> Result<FrameBatches> {
        let path = path.as_ref();
        if options.batch_size == 0 {
            return Err(VideoError::InvalidParameters {
                details: "batch size must be at least 1".to_string(),
            }
            .into());
        }

        let stream = self.decode(path, options.maybe_depth_video)?;
        Ok(FrameBatches::new(
            stream.fps,
            stream.frames,
            options.batch_size,
            options.max_frames,
        ))
    }

    /// Decode the whole file at once
    pub fn open<P: AsRef<Path>>(&self, path: P, maybe_depth_video: bool) -> Result<(f64, Vec<Frame>)> {
        let stream = self.decode(path.as_ref(), maybe_depth_video)?;
        let frames = stream.frames.collect::<Result<Vec<_>>>()?;
        Ok((stream.fps, frames))
    }

    /// Number of frames the source yields under `options.max_frames`
    pub fn count_frames<P: AsRef<Path>>(&self, path: P, options: &SourceOptions) -> Result<usize> {
        let path = path.as_ref();
        let total = match ContainerKind::from_path(path) {
            ContainerKind::Video | ContainerKind::TransportStream => {
                match probe_video(&self.tools, path, true)?.frame_count {
                    Some(count) => count,
                    None => self.count_by_decoding(path, options)?,
                }
            }
            _ => self.count_by_decoding(path, options)?,
        };

        Ok(options.max_frames.map_or(total, |max| total.min(max)))
    }

    fn count_by_decoding(&self, path: &Path, options: &SourceOptions) -> Result<usize> {
        let stream = self.decode(path, options.maybe_depth_video)?;
        let limit = options.max_frames.unwrap_or(usize::MAX);
        let mut count = 0;
        for frame in stream.frames.take(limit) {
            frame?;
            count += 1;
        }
        Ok(count)
    }

    fn decode(&self, path: &Path, maybe_depth_video: bool) -> Result<DecodedStream> {
        if !path.exists() {
            return Err(VideoError::LoadFailed {
                path: path.display().to_string(),
            }
            .into());
        }

        for strategy in Self::strategies(path, maybe_depth_video) {
            if let Some(stream) = self.attempt(strategy, path)? {
                info!("Opened {:?} with {:?} at {:.3} fps", path, strategy, stream.fps);
                return Ok(stream);
            }
            debug!("{:?} does not apply to {:?}, trying next strategy", strategy, path);
        }

        Err(VideoError::UnsupportedFormat {
            format: format!(".{}", extension(path)),
            source: None,
        }
        .into())
    }

    fn attempt(&self, strategy: DecodeStrategy, path: &Path) -> Result<Option<DecodedStream>> {
        match strategy {
            DecodeStrategy::Gif => self.decode_gif(path).map(Some),
            DecodeStrategy::Raw16 => {
                let info = probe_video(&self.tools, path, false)?;
                if !info.is_gray16() {
                    debug!("{:?} is {}, not a 16-bit depth video", path, info.pix_fmt);
                    return Ok(None);
                }
                let fps = info
                    .r_frame_rate
                    .or(info.avg_frame_rate)
                    .ok_or_else(|| unknown_rate(path))?;
                let reader = FfmpegReader::spawn(&self.tools, path, PixelFormat::Gray16, info.width, info.height)?;
                Ok(Some(DecodedStream {
                    fps,
                    frames: Box::new(reader),
                }))
            }
            DecodeStrategy::Stream { rate } => {
                let info = probe_video(&self.tools, path, false)?;
                let fps = match rate {
                    RateField::Average => info.avg_frame_rate.or(info.r_frame_rate),
                    RateField::Real => info.r_frame_rate.or(info.avg_frame_rate),
                }
                .ok_or_else(|| unknown_rate(path))?;
                let reader = FfmpegReader::spawn(&self.tools, path, PixelFormat::Rgb24, info.width, info.height)?;
                Ok(Some(DecodedStream {
                    fps,
                    frames: Box::new(reader),
                }))
            }
            DecodeStrategy::StillImage => match image::open(path) {
                Ok(image) => Ok(Some(DecodedStream {
                    fps: 1.0,
                    frames: Box::new(std::iter::once(Ok(Frame::from_image(image)))),
                })),
                Err(e) => Err(VideoError::UnsupportedFormat {
                    format: format!(".{}", extension(path)),
                    source: Some(e),
                }
                .into()),
            },
        }
    }

    fn decode_gif(&self, path: &Path) -> Result<DecodedStream> {
        let file = File::open(path)?;
        let decoder = GifDecoder::new(BufReader::new(file)).map_err(|e| VideoError::DecodingFailed {
            reason: format!("{}: {}", path.display(), e),
        })?;

        let mut raw = decoder.into_frames();
        let first = match raw.next() {
            Some(Ok(first)) => first,
            Some(Err(e)) => {
                return Err(VideoError::DecodingFailed {
                    reason: format!("{}: {}", path.display(), e),
                }
                .into())
            }
            None => {
                return Ok(DecodedStream {
                    fps: 1000.0 / GIF_FALLBACK_DELAY_MS,
                    frames: Box::new(std::iter::empty()),
                })
            }
        };

        // the first frame's delay sets the rate for the whole clip
        let (numer, denom) = first.delay().numer_denom_ms();
        let delay_ms = if denom == 0 { 0.0 } else { numer as f64 / denom as f64 };
        let fps = 1000.0 / if delay_ms > 0.0 { delay_ms } else { GIF_FALLBACK_DELAY_MS };

        let source = path.display().to_string();
        let frames = std::iter::once(Ok(first))
            .chain(raw)
            .map(move |frame| -> Result<Frame> {
                frame
                    .map(|frame| Frame::Rgb(DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8()))
                    .map_err(|e| {
                        VideoError::DecodingFailed {
                            reason: format!("{}: {}", source, e),
                        }
                        .into()
                    })
            });

        Ok(DecodedStream {
            fps,
            frames: Box::new(frames),
        })
    }
}

fn unknown_rate(path: &Path) -> crate::error::DepthVideoError {
    VideoError::DecodingFailed {
        reason: format!("{}: stream has no usable frame rate", path.display()),
    }
    .into()
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Lazy, finite, non-restartable sequence of frame batches.
///
/// Batches are contiguous and never overlap; concatenating them yields the
/// source frames in order, truncated at `max_frames`. The underlying decoder
/// is released as soon as the sequence ends, hits the cap, or fails.
pub struct FrameBatches {
    fps: f64,
    frames: FrameIter,
    batch_size: usize,
    max_frames: Option<usize>,
    consumed: usize,
    emitted: usize,
    done: bool,
}

impl FrameBatches {
    fn new(fps: f64, frames: FrameIter, batch_size: usize, max_frames: Option<usize>) -> Self {
        Self {
            fps,
            frames,
            batch_size: batch_size.max(1),
            max_frames,
            consumed: 0,
            emitted: 0,
            done: max_frames == Some(0),
        }
    }

    /// Batch an arbitrary frame sequence
    pub fn from_frames<I>(fps: f64, frames: I, batch_size: usize, max_frames: Option<usize>) -> Self
    where
        I: IntoIterator<Item = Result<Frame>>,
        I::IntoIter: 'static,
    {
        Self::new(fps, Box::new(frames.into_iter()), batch_size, max_frames)
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Frames pulled from the source so far
    pub fn frames_consumed(&self) -> usize {
        self.consumed
    }

    /// Drain every remaining batch into one frame list
    pub fn collect_frames(self) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        for batch in self {
            frames.extend(batch?.frames);
        }
        Ok(frames)
    }

    fn cap_reached(&self) -> bool {
        self.max_frames.map_or(false, |max| self.consumed >= max)
    }

    fn release(&mut self) {
        self.done = true;
        self.frames = Box::new(std::iter::empty());
    }
}

impl Iterator for FrameBatches {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut frames = Vec::with_capacity(self.batch_size.min(1024));
        while frames.len() < self.batch_size {
            match self.frames.next() {
                Some(Ok(frame)) => {
                    frames.push(frame);
                    self.consumed += 1;
                    if self.cap_reached() {
                        debug!("Frame cap of {:?} reached", self.max_frames);
                        self.release();
                        break;
                    }
                }
                Some(Err(e)) => {
                    self.release();
                    return Some(Err(e));
                }
                None => {
                    self.release();
                    break;
                }
            }
        }

        if frames.is_empty() {
            return None;
        }

        let batch = Batch {
            index: self.emitted,
            first_frame: self.consumed - frames.len(),
            fps: self.fps,
            frames,
        };
        self.emitted += 1;
        debug!("Emitting batch {} ({} frames)", batch.index, batch.len());
        Some(Ok(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DepthVideoError;
    use std::error::Error as _;
    use tempfile::tempdir;

    /// Frames whose red/green channels encode their index
    fn indexed_frames(count: usize) -> Vec<Result<Frame>> {
        (0..count)
            .map(|i| Ok(Frame::new_filled(2, 2, [(i % 256) as u8, (i / 256) as u8, 0])))
            .collect()
    }

    fn frame_index(frame: &Frame) -> usize {
        let [r, g, _] = frame.as_rgb().unwrap().get_pixel(0, 0).0;
        r as usize + g as usize * 256
    }

    #[test]
    fn test_capped_batches_scenario() {
        let batches: Vec<Batch> = FrameBatches::from_frames(25.0, indexed_frames(250), 100, Some(150))
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 100);
        assert_eq!(batches[1].len(), 50);
        assert_eq!(batches[1].first_frame, 100);
        assert!(batches.iter().all(|b| b.fps == 25.0));
    }

    #[test]
    fn test_batches_preserve_order_and_count() {
        for (total, batch_size) in [(250, 100), (7, 3), (9, 3), (1, 10), (0, 4)] {
            let batches = FrameBatches::from_frames(30.0, indexed_frames(total), batch_size, None);
            let frames = batches.collect_frames().unwrap();
            assert_eq!(frames.len(), total);
            for (i, frame) in frames.iter().enumerate() {
                assert_eq!(frame_index(frame), i);
            }
        }
    }

    #[test]
    fn test_no_empty_batches() {
        let batches: Vec<Batch> = FrameBatches::from_frames(30.0, indexed_frames(9), 3, None)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| !b.is_empty()));
        assert_eq!(batches.iter().map(|b| b.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_cap_stops_pulling_frames() {
        let mut batches = FrameBatches::from_frames(30.0, indexed_frames(50), 10, Some(10));
        assert_eq!(batches.next().unwrap().unwrap().len(), 10);
        assert!(batches.next().is_none());
        assert_eq!(batches.frames_consumed(), 10);

        let mut none = FrameBatches::from_frames(30.0, indexed_frames(5), 10, Some(0));
        assert!(none.next().is_none());
    }

    #[test]
    fn test_decode_error_ends_sequence() {
        let mut frames = indexed_frames(4);
        frames[2] = Err(VideoError::DecodingFailed {
            reason: "corrupt packet".to_string(),
        }
        .into());

        let mut batches = FrameBatches::from_frames(30.0, frames, 2, None);
        assert!(batches.next().unwrap().is_ok());
        assert!(batches.next().unwrap().is_err());
        assert!(batches.next().is_none());
    }

    #[test]
    fn test_container_dispatch() {
        assert_eq!(ContainerKind::from_path("a.GIF"), ContainerKind::AnimatedGif);
        assert_eq!(ContainerKind::from_path("a.mts"), ContainerKind::TransportStream);
        assert_eq!(ContainerKind::from_path("a.webm"), ContainerKind::Video);
        assert_eq!(ContainerKind::from_path("a.png"), ContainerKind::StillImage);

        let avi = Path::new("depth.avi");
        assert_eq!(
            FrameSource::strategies(avi, true),
            vec![DecodeStrategy::Raw16, DecodeStrategy::Stream { rate: RateField::Real }]
        );
        assert_eq!(
            FrameSource::strategies(avi, false),
            vec![DecodeStrategy::Stream { rate: RateField::Real }]
        );
        assert_eq!(
            FrameSource::strategies(Path::new("depth.mp4"), true),
            vec![DecodeStrategy::Stream { rate: RateField::Real }]
        );
    }

    #[test]
    fn test_still_image_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("still.png");
        Frame::new_filled(4, 3, [10, 20, 30]).save_png(&path).unwrap();

        let source = FrameSource::new(FfmpegTools::default());
        let (fps, frames) = source.open(&path, false).unwrap();
        assert_eq!(fps, 1.0);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].dimensions(), (4, 3));
        assert_eq!(source.count_frames(&path, &SourceOptions::default()).unwrap(), 1);
    }

    #[test]
    fn test_unsupported_format_preserves_cause() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.xyz");
        std::fs::write(&path, b"definitely not an image").unwrap();

        let source = FrameSource::new(FfmpegTools::default());
        let err = source.open(&path, false).unwrap_err();
        match &err {
            DepthVideoError::Video(VideoError::UnsupportedFormat { format, source }) => {
                assert_eq!(format, ".xyz");
                assert!(source.is_some());
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(err.source().is_some());
    }

    #[test]
    fn test_missing_file() {
        let source = FrameSource::new(FfmpegTools::default());
        let err = source
            .open_batches("/definitely/missing.mp4", &SourceOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, DepthVideoError::Video(VideoError::LoadFailed { .. })));
    }

    #[test]
    fn test_animated_gif_rate_and_frames() {
        use image::codecs::gif::GifEncoder;
        use image::{Delay, RgbaImage};

        let dir = tempdir().unwrap();
        let path = dir.path().join("anim.gif");
        {
            let file = File::create(&path).unwrap();
            let mut encoder = GifEncoder::new(file);
            let frames: Vec<image::Frame> = [[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255]]
                .iter()
                .map(|&color| {
                    image::Frame::from_parts(
                        RgbaImage::from_pixel(8, 8, image::Rgba(color)),
                        0,
                        0,
                        Delay::from_numer_denom_ms(40, 1),
                    )
                })
                .collect();
            encoder.encode_frames(frames).unwrap();
        }

        let source = FrameSource::new(FfmpegTools::default());
        let options = SourceOptions {
            batch_size: 2,
            ..SourceOptions::default()
        };
        let batches: Vec<Batch> = source
            .open_batches(&path, &options)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(batches.len(), 2);
        assert!((batches[0].fps - 25.0).abs() < 1e-9);
        assert_eq!(batches[0].len() + batches[1].len(), 3);
        assert_eq!(source.count_frames(&path, &options).unwrap(), 3);
    }
}
