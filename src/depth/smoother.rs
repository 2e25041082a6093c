use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::depth::DepthField;
use crate::error::{DepthError, Result};

/// Temporal weights applied to frames `i-2 ..= i+2`
pub const KERNEL: [f32; 5] = [0.10, 0.20, 0.40, 0.20, 0.10];

/// Percentiles of the pooled smoothed values used as normalization bounds
pub const LOWER_PERCENTILE: f64 = 0.5;
pub const UPPER_PERCENTILE: f64 = 99.5;

/// How a sequence of raw depth predictions is post-processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SmoothingMode {
    /// Joint min-max normalization over the whole sequence
    None,
    /// 5-tap temporal filter informs percentile bounds, originals are normalized
    Experimental,
    /// Unknown mode name; the sequence is returned untouched
    Passthrough(String),
}

impl Default for SmoothingMode {
    fn default() -> Self {
        SmoothingMode::None
    }
}

impl From<String> for SmoothingMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "none" => SmoothingMode::None,
            "experimental" => SmoothingMode::Experimental,
            _ => SmoothingMode::Passthrough(value),
        }
    }
}

impl From<&str> for SmoothingMode {
    fn from(value: &str) -> Self {
        SmoothingMode::from(value.to_string())
    }
}

impl From<SmoothingMode> for String {
    fn from(mode: SmoothingMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for SmoothingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmoothingMode::None => f.write_str("none"),
            SmoothingMode::Experimental => f.write_str("experimental"),
            SmoothingMode::Passthrough(name) => f.write_str(name),
        }
    }
}

/// Normalizes (and optionally temporally smooths) per-frame depth predictions.
///
/// The output always has the same length as the input and every field keeps
/// its shape. A degenerate range (all values equal) yields all-zero fields.
#[derive(Debug, Clone, Default)]
pub struct TemporalSmoother {
    mode: SmoothingMode,
}

impl TemporalSmoother {
    pub fn new(mode: SmoothingMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> &SmoothingMode {
        &self.mode
    }

    pub fn smooth(&self, fields: &[DepthField]) -> Result<Vec<DepthField>> {
        info!("Processing {} generated depthmaps (smoothing: {})", fields.len(), self.mode);

        match &self.mode {
            SmoothingMode::None => Ok(global_scaling(fields, None)),
            SmoothingMode::Experimental => {
                if fields.is_empty() {
                    return Ok(Vec::new());
                }
                let smoothed = temporal_filter(fields)?;
                let mut pooled: Vec<f32> = smoothed
                    .iter()
                    .flat_map(|field| field.as_slice().iter().copied())
                    .collect();
                drop(smoothed);

                let bounds = percentile_pair(&mut pooled, LOWER_PERCENTILE, UPPER_PERCENTILE);
                debug!("Percentile bounds of smoothed depth: {:?}", bounds);
                Ok(global_scaling(fields, bounds))
            }
            SmoothingMode::Passthrough(name) => {
                debug!("Unknown smoothing mode '{}', returning predictions unchanged", name);
                Ok(fields.to_vec())
            }
        }
    }
}

/// Weighted sum over `[i-2, i+2]` with out-of-range indices clamped to the ends
fn temporal_filter(fields: &[DepthField]) -> Result<Vec<DepthField>> {
    let last = fields.len() as isize - 1;

    let smoothed = (0..fields.len())
        .into_par_iter()
        .map(|i| {
            let (width, height) = fields[i].dimensions();
            let mut acc = DepthField::zeros(width, height);
            for (offset, &weight) in KERNEL.iter().enumerate() {
                let j = (i as isize + offset as isize - 2).clamp(0, last) as usize;
                acc.add_scaled(&fields[j], weight)?;
            }
            Ok(acc)
        })
        .collect::<std::result::Result<Vec<_>, DepthError>>()?;

    Ok(smoothed)
}

/// Rescale every field jointly so that `lo` maps to 0 and `hi` maps to 1.
///
/// Without explicit bounds the global minimum and maximum are used.
fn global_scaling(fields: &[DepthField], bounds: Option<(f32, f32)>) -> Vec<DepthField> {
    let (lo, hi) = bounds.unwrap_or_else(|| {
        fields.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), field| {
            (lo.min(field.min()), hi.max(field.max()))
        })
    });

    let range = hi - lo;
    if range == 0.0 || !range.is_finite() {
        if !fields.is_empty() {
            warn!("Degenerate depth range [{}, {}], emitting zero depth", lo, hi);
        }
        return fields
            .iter()
            .map(|field| DepthField::zeros(field.width(), field.height()))
            .collect();
    }

    fields
        .par_iter()
        .map(|field| field.map(|v| (v - lo) / range))
        .collect()
}

/// Two percentiles of `values` with linear interpolation between ranks.
///
/// Reorders `values` in place. `None` when empty.
pub fn percentile_pair(values: &mut [f32], lower: f64, upper: f64) -> Option<(f32, f32)> {
    if values.is_empty() {
        return None;
    }
    Some((percentile(values, lower), percentile(values, upper)))
}

fn percentile(values: &mut [f32], q: f64) -> f32 {
    let n = values.len();
    let rank = (q / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (rank.ceil() as usize).min(n - 1);

    let (_, lo_value, above) = values.select_nth_unstable_by(lo, f32::total_cmp);
    let lo_value = *lo_value;
    if hi == lo {
        return lo_value;
    }
    // the next rank is the smallest element of the upper partition
    let hi_value = above.iter().copied().fold(f32::INFINITY, f32::min);

    lo_value + ((hi_value - lo_value) as f64 * (rank - lo as f64)) as f32
}
