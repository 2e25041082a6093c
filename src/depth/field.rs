use image::{ImageBuffer, Luma};

use crate::error::DepthError;

/// A single-channel 2-D array of floating point depth values.
///
/// Values are stored row-major. Fields are never mutated once handed to the
/// pipeline; every transformation returns a new field.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthField {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DepthField {
    /// Wrap an existing row-major buffer
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self, DepthError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(DepthError::BufferSize {
                len: data.len(),
                expected,
            });
        }
        Ok(Self { width, height, data })
    }

    pub fn zeros(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0.0)
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Build a field by evaluating `f(x, y)` for every element
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> f32,
    {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Smallest value, ignoring NaN. `+inf` for an empty field.
    pub fn min(&self) -> f32 {
        self.data.iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// Largest value, ignoring NaN. `-inf` for an empty field.
    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    /// Apply `f` element-wise into a new field
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f32) -> f32,
    {
        Self {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// `self += weight * other`
    pub fn add_scaled(&mut self, other: &DepthField, weight: f32) -> Result<(), DepthError> {
        if self.dimensions() != other.dimensions() {
            return Err(DepthError::ShapeMismatch {
                expected: self.dimensions(),
                actual: other.dimensions(),
            });
        }
        for (dst, &src) in self.data.iter_mut().zip(other.data.iter()) {
            *dst += weight * src;
        }
        Ok(())
    }

    /// Quantize to 16-bit, clamping to [0, 1] first
    pub fn to_gray16(&self) -> ImageBuffer<Luma<u16>, Vec<u16>> {
        let raw: Vec<u16> = self
            .data
            .iter()
            .map(|&v| {
                let v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
                (v * u16::MAX as f32).round() as u16
            })
            .collect();
        ImageBuffer::from_raw(self.width, self.height, raw)
            .unwrap_or_else(|| ImageBuffer::new(self.width, self.height))
    }
}
