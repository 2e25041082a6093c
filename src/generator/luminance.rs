use image::{Rgb, RgbImage};
use rayon::prelude::*;

use crate::{
    depth::DepthField,
    error::{GeneratorError, Result},
    generator::traits::{GeneratedFrame, GenerationConfig, Generator, Kind},
    video::types::Frame,
};

/// Heatmap color stops, far (0.0) to near (1.0)
const HEATMAP_STOPS: [[f32; 3]; 5] = [
    [48.0, 18.0, 59.0],
    [40.0, 126.0, 229.0],
    [46.0, 216.0, 120.0],
    [236.0, 208.0, 35.0],
    [190.0, 24.0, 24.0],
];

/// Depth estimate from pixel brightness.
///
/// Brighter pixels are treated as nearer. Produces `depth` (16-bit grayscale)
/// and `heatmap` (RGB colormap of the depth). Parameters:
/// `gamma` (default 1.0) and `invert` (default false), both kept for the
/// depth-only first pass.
pub struct LuminanceGenerator;

impl LuminanceGenerator {
    pub const HEATMAP: &'static str = "heatmap";

    pub fn new() -> Self {
        Self
    }

    fn estimate(frame: &Frame, gamma: f32, invert: bool) -> DepthField {
        let field = frame.to_field();
        field.map(|v| {
            let v = v.clamp(0.0, 1.0).powf(gamma);
            if invert {
                1.0 - v
            } else {
                v
            }
        })
    }

    fn render(&self, kind: &Kind, depth: &DepthField) -> Result<Frame> {
        if kind.is_depth() {
            return Ok(Frame::Gray16(depth.to_gray16()));
        }
        if kind.as_str() == Self::HEATMAP {
            return Ok(Frame::Rgb(heatmap(depth)));
        }
        Err(GeneratorError::InvalidConfig {
            details: format!("'{}' cannot produce output '{}'", self.name(), kind),
        }
        .into())
    }
}

impl Default for LuminanceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for LuminanceGenerator {
    fn name(&self) -> &str {
        "luminance"
    }

    fn description(&self) -> &str {
        "Brightness-based depth estimate with grayscale and heatmap outputs"
    }

    fn supported_kinds(&self) -> Vec<Kind> {
        vec![Kind::depth(), Kind::from(Self::HEATMAP)]
    }

    fn first_pass_keys(&self) -> &[&str] {
        &["gamma", "invert"]
    }

    fn generate(
        &self,
        frames: &[Frame],
        depths: Option<&[Frame]>,
        config: &GenerationConfig,
    ) -> Result<Vec<GeneratedFrame>> {
        if let Some(depths) = depths {
            if depths.len() != frames.len() {
                return Err(GeneratorError::GenerationFailed {
                    reason: format!("{} depth frames for {} input frames", depths.len(), frames.len()),
                }
                .into());
            }
        }
        if !config.depth_prediction {
            self.validate_config(config)?;
        }

        let gamma = config.get_f32_or("gamma", 1.0);
        let invert = config.get_bool_or("invert", false);
        if gamma <= 0.0 {
            return Err(GeneratorError::InvalidConfig {
                details: format!("gamma must be positive, got {}", gamma),
            }
            .into());
        }

        let per_frame: Vec<Vec<GeneratedFrame>> = frames
            .par_iter()
            .enumerate()
            .map(|(index, frame)| -> Result<Vec<GeneratedFrame>> {
                let depth = match depths {
                    Some(depths) => depths[index].to_field(),
                    None => Self::estimate(frame, gamma, invert),
                };

                if config.depth_prediction {
                    return Ok(vec![GeneratedFrame {
                        index,
                        kind: Kind::depth(),
                        frame: Frame::Field(depth),
                    }]);
                }

                config
                    .outputs
                    .iter()
                    .map(|kind| -> Result<GeneratedFrame> {
                        Ok(GeneratedFrame {
                            index,
                            kind: kind.clone(),
                            frame: self.render(kind, &depth)?,
                        })
                    })
                    .collect()
            })
            .collect::<Result<_>>()?;

        Ok(per_frame.into_iter().flatten().collect())
    }
}

/// Map depth values (clamped to [0, 1]) onto the heatmap gradient
pub fn heatmap(depth: &DepthField) -> RgbImage {
    let (width, height) = depth.dimensions();
    let data = depth.as_slice();
    RgbImage::from_fn(width, height, |x, y| {
        let v = data[(y * width + x) as usize];
        Rgb(heatmap_color(v))
    })
}

fn heatmap_color(value: f32) -> [u8; 3] {
    let v = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
    let scaled = v * (HEATMAP_STOPS.len() - 1) as f32;
    let lower = (scaled.floor() as usize).min(HEATMAP_STOPS.len() - 2);
    let t = scaled - lower as f32;
    let (a, b) = (HEATMAP_STOPS[lower], HEATMAP_STOPS[lower + 1]);
    [
        (a[0] + (b[0] - a[0]) * t).round() as u8,
        (a[1] + (b[1] - a[1]) * t).round() as u8,
        (a[2] + (b[2] - a[2]) * t).round() as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DepthVideoError;

    fn gray_frames() -> Vec<Frame> {
        vec![
            Frame::new_filled(4, 2, [0, 0, 0]),
            Frame::new_filled(4, 2, [255, 255, 255]),
        ]
    }

    #[test]
    fn test_depth_prediction_returns_raw_fields() {
        let generator = LuminanceGenerator::new();
        let config = GenerationConfig::with_outputs(["depth", "heatmap"]).first_pass();

        let out = generator.generate(&gray_frames(), None, &config).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|g| g.kind.is_depth()));
        assert_eq!(out[0].index, 0);
        assert_eq!(out[1].index, 1);

        let bright = out[1].frame.as_field().unwrap();
        assert!((bright.min() - 1.0).abs() < 1e-6);
        assert_eq!(out[0].frame.as_field().unwrap().max(), 0.0);
    }

    #[test]
    fn test_every_frame_gets_every_requested_kind() {
        let generator = LuminanceGenerator::new();
        let config = GenerationConfig::with_outputs(["depth", "heatmap"]);

        let out = generator.generate(&gray_frames(), None, &config).unwrap();
        assert_eq!(out.len(), 4);
        for index in 0..2 {
            let kinds: Vec<&str> = out
                .iter()
                .filter(|g| g.index == index)
                .map(|g| g.kind.as_str())
                .collect();
            assert_eq!(kinds, vec!["depth", "heatmap"]);
        }
        assert!(matches!(out[0].frame, Frame::Gray16(_)));
        assert!(matches!(out[1].frame, Frame::Rgb(_)));
        assert_eq!(out[1].frame.dimensions(), (4, 2));
    }

    #[test]
    fn test_supplied_depth_is_used() {
        let generator = LuminanceGenerator::new();
        let config = GenerationConfig::with_outputs(["depth"]);
        let depths = vec![
            Frame::Field(DepthField::filled(4, 2, 1.5)),
            Frame::Field(DepthField::filled(4, 2, 0.25)),
        ];

        let out = generator.generate(&gray_frames(), Some(depths.as_slice()), &config).unwrap();
        let Frame::Gray16(first) = &out[0].frame else {
            panic!("expected 16-bit depth");
        };
        // out-of-range values are clamped when quantizing
        assert_eq!(first.get_pixel(0, 0)[0], u16::MAX);
        let Frame::Gray16(second) = &out[1].frame else {
            panic!("expected 16-bit depth");
        };
        assert_eq!(second.get_pixel(3, 1)[0], (0.25f32 * 65535.0).round() as u16);
    }

    #[test]
    fn test_depth_count_must_match() {
        let generator = LuminanceGenerator::new();
        let depths = vec![Frame::Field(DepthField::zeros(4, 2))];
        let result = generator.generate(&gray_frames(), Some(depths.as_slice()), &GenerationConfig::default());
        assert!(matches!(
            result,
            Err(DepthVideoError::Generator(GeneratorError::GenerationFailed { .. }))
        ));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let generator = LuminanceGenerator::new();
        let config = GenerationConfig::with_outputs(["normals"]);
        let result = generator.generate(&gray_frames(), None, &config);
        assert!(matches!(
            result,
            Err(DepthVideoError::Generator(GeneratorError::InvalidConfig { .. }))
        ));
    }

    #[test]
    fn test_invert_parameter() {
        let generator = LuminanceGenerator::new();
        let full = GenerationConfig::with_outputs(["depth"]).set("invert", true);

        // the generic first pass keeps model keys only
        let out = generator.generate(&gray_frames(), None, &full.first_pass()).unwrap();
        assert_eq!(out[0].frame.as_field().unwrap().max(), 0.0);

        let first_pass = full.first_pass_with(generator.first_pass_keys());
        assert_eq!(first_pass.get_bool("invert"), Some(true));
        let out = generator.generate(&gray_frames(), None, &first_pass).unwrap();
        assert_eq!(out[0].frame.as_field().unwrap().min(), 1.0);

        let out = generator.generate(&gray_frames(), None, &full).unwrap();
        let Frame::Gray16(dark) = &out[0].frame else {
            panic!("expected 16-bit depth");
        };
        assert_eq!(dark.get_pixel(0, 0)[0], u16::MAX);
    }

    #[test]
    fn test_heatmap_endpoints() {
        assert_eq!(heatmap_color(0.0), [48, 18, 59]);
        assert_eq!(heatmap_color(1.0), [190, 24, 24]);
        assert_eq!(heatmap_color(f32::NAN), heatmap_color(0.0));
        assert_eq!(heatmap_color(7.0), heatmap_color(1.0));
    }
}
