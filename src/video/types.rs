use std::path::PathBuf;

use image::{DynamicImage, ImageBuffer, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::depth::DepthField;

/// 16-bit single channel raster, the representation of depth video frames
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

/// A single video frame.
///
/// Frames are either decoded rasters (8-bit RGB or 16-bit grayscale) or raw
/// numeric depth fields. A frame is never mutated after it is produced.
#[derive(Clone, Debug)]
pub enum Frame {
    Rgb(RgbImage),
    Gray16(Gray16Image),
    Field(DepthField),
}

/// Pixel representation of a frame, used to pick an encode path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Gray16,
    Field,
}

impl PixelFormat {
    /// Name of the matching ffmpeg rawvideo pixel format
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "rgb24",
            // fields are quantized to 16-bit before they leave the process
            PixelFormat::Gray16 | PixelFormat::Field => "gray16le",
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Gray16 | PixelFormat::Field => 2,
        }
    }

    /// Whether frames of this format go through the lossless 16-bit path
    pub fn is_high_bit_depth(&self) -> bool {
        !matches!(self, PixelFormat::Rgb24)
    }
}

impl Frame {
    /// Create a new RGB frame filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        Frame::Rgb(ImageBuffer::from_pixel(width, height, Rgb(color)))
    }

    /// Convert a decoded image, keeping 16-bit grayscale data intact
    pub fn from_image(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageRgb8(img) => Frame::Rgb(img),
            DynamicImage::ImageLuma16(img) => Frame::Gray16(img),
            DynamicImage::ImageLumaA16(_) => Frame::Gray16(image.to_luma16()),
            other => Frame::Rgb(other.to_rgb8()),
        }
    }

    /// Rebuild a frame from tightly packed rawvideo bytes
    pub fn from_raw_bytes(format: PixelFormat, width: u32, height: u32, bytes: Vec<u8>) -> Option<Self> {
        match format {
            PixelFormat::Rgb24 => ImageBuffer::from_raw(width, height, bytes).map(Frame::Rgb),
            PixelFormat::Gray16 | PixelFormat::Field => {
                let samples: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                ImageBuffer::from_raw(width, height, samples).map(Frame::Gray16)
            }
        }
    }

    pub fn width(&self) -> u32 {
        self.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.dimensions().1
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Frame::Rgb(img) => img.dimensions(),
            Frame::Gray16(img) => img.dimensions(),
            Frame::Field(field) => field.dimensions(),
        }
    }

    pub fn pixel_format(&self) -> PixelFormat {
        match self {
            Frame::Rgb(_) => PixelFormat::Rgb24,
            Frame::Gray16(_) => PixelFormat::Gray16,
            Frame::Field(_) => PixelFormat::Field,
        }
    }

    pub fn as_rgb(&self) -> Option<&RgbImage> {
        match self {
            Frame::Rgb(img) => Some(img),
            _ => None,
        }
    }

    pub fn as_field(&self) -> Option<&DepthField> {
        match self {
            Frame::Field(field) => Some(field),
            _ => None,
        }
    }

    /// Interpret the frame as a depth field.
    ///
    /// 16-bit samples are scaled to [0, 1]; RGB frames use Rec. 601 luma.
    pub fn to_field(&self) -> DepthField {
        match self {
            Frame::Field(field) => field.clone(),
            Frame::Gray16(img) => DepthField::from_fn(img.width(), img.height(), |x, y| {
                img.get_pixel(x, y)[0] as f32 / u16::MAX as f32
            }),
            Frame::Rgb(img) => DepthField::from_fn(img.width(), img.height(), |x, y| {
                let [r, g, b] = img.get_pixel(x, y).0;
                (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32) / 255.0
            }),
        }
    }

    /// Tightly packed bytes in the frame's ffmpeg pixel format
    pub fn to_raw_bytes(&self) -> Vec<u8> {
        match self {
            Frame::Rgb(img) => img.as_raw().clone(),
            Frame::Gray16(img) => img.as_raw().iter().flat_map(|v| v.to_le_bytes()).collect(),
            Frame::Field(field) => field
                .to_gray16()
                .as_raw()
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect(),
        }
    }

    /// Save the frame as a PNG file (fields are quantized to 16-bit)
    pub fn save_png<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), image::ImageError> {
        match self {
            Frame::Rgb(img) => img.save(path),
            Frame::Gray16(img) => img.save(path),
            Frame::Field(field) => field.to_gray16().save(path),
        }
    }
}

/// An ordered run of consecutive frames sharing one frame rate
#[derive(Debug, Clone)]
pub struct Batch {
    /// Zero-based position of this batch in its source
    pub index: usize,

    /// Index of the first frame of the batch within the source
    pub first_frame: usize,

    pub fps: f64,

    pub frames: Vec<Frame>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// A video file written by the frame sink
#[derive(Debug, Clone)]
pub struct VideoArtifact {
    /// File name inside the output directory, extension included
    pub file_name: String,

    pub path: PathBuf,

    pub fps: f64,

    pub format: PixelFormat,

    pub frame_count: usize,
}

impl VideoArtifact {
    pub fn extension(&self) -> Option<&str> {
        self.path.extension()?.to_str()
    }
}
