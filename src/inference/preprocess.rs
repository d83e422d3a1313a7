//! Image preprocessing for the CIFAR-10 classifier
//!
//! Turns arbitrary uploaded image bytes into the fixed 3x32x32 normalized
//! tensor the pretrained network was trained on. Every step is deterministic:
//! the same bytes always produce a bit-identical tensor.

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::utils::error::{ClassifyError, Result};

/// Input side length expected by the classifier
pub const INPUT_SIZE: u32 = 32;

/// Number of color channels in the input tensor
pub const INPUT_CHANNELS: usize = 3;

/// CIFAR-10 per-channel mean (RGB)
pub const CIFAR10_MEAN: [f32; 3] = [0.4914, 0.4822, 0.4465];

/// Standard deviation used by the published ResNet20 training recipe (RGB)
pub const CIFAR10_STD_REFERENCE: [f32; 3] = [0.2023, 0.1994, 0.2010];

/// Standard deviation measured over the full CIFAR-10 training set (RGB)
pub const CIFAR10_STD_POPULATION: [f32; 3] = [0.2470, 0.2435, 0.2616];

/// Which standard deviation constants to normalize with.
///
/// The two sets disagree slightly, which shifts the logits and therefore the
/// reported confidence values. `Reference` is what the served model expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationPreset {
    #[default]
    Reference,
    Population,
}

impl NormalizationPreset {
    pub fn mean(&self) -> [f32; 3] {
        CIFAR10_MEAN
    }

    pub fn std(&self) -> [f32; 3] {
        match self {
            NormalizationPreset::Reference => CIFAR10_STD_REFERENCE,
            NormalizationPreset::Population => CIFAR10_STD_POPULATION,
        }
    }
}

impl std::str::FromStr for NormalizationPreset {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "reference" => Ok(NormalizationPreset::Reference),
            "population" => Ok(NormalizationPreset::Population),
            other => Err(ClassifyError::Config(format!(
                "unknown normalization preset '{}'",
                other
            ))),
        }
    }
}

/// A 3x32x32 float tensor in CHW layout, ready for inference
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Vec<f32>,
}

impl NormalizedTensor {
    /// Number of values in a tensor
    pub const LEN: usize = INPUT_CHANNELS * (INPUT_SIZE as usize) * (INPUT_SIZE as usize);

    /// Tensor shape as (channels, height, width)
    pub fn shape(&self) -> (usize, usize, usize) {
        (INPUT_CHANNELS, INPUT_SIZE as usize, INPUT_SIZE as usize)
    }

    /// Flat CHW values
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// All values of one channel (32*32 entries)
    pub fn channel(&self, c: usize) -> &[f32] {
        let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
        &self.data[c * plane..(c + 1) * plane]
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// Decode bytes and convert them to 8-bit RGB.
///
/// RGBA loses its alpha channel, grayscale is replicated across the three
/// channels and 16-bit or float images are scaled down to 8 bits.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(ClassifyError::Decode("image has zero width or height".to_string()));
    }
    Ok(image.to_rgb8())
}

/// Fixed-point precision of resampling coefficients
const COEFF_PRECISION_BITS: u32 = 22;

/// Contributing source range and fixed-point weights for one output pixel
struct AxisTap {
    start: usize,
    weights: Vec<i64>,
}

/// Triangle filter taps along one axis.
///
/// The filter widens with the downscale factor, which is what antialiases;
/// when upscaling it stays one source pixel wide.
fn axis_taps(src_len: usize, dst_len: usize) -> Vec<AxisTap> {
    let scale = src_len as f64 / dst_len as f64;
    let filter_scale = scale.max(1.0);
    let support = filter_scale;

    (0..dst_len)
        .map(|i| {
            let center = (i as f64 + 0.5) * scale;
            let start = ((center - support + 0.5) as i64).max(0) as usize;
            let end = ((center + support + 0.5) as i64).min(src_len as i64) as usize;

            let raw: Vec<f64> = (start..end)
                .map(|x| {
                    let d = ((x as f64 - center + 0.5) / filter_scale).abs();
                    if d < 1.0 {
                        1.0 - d
                    } else {
                        0.0
                    }
                })
                .collect();
            let total: f64 = raw.iter().sum();
            let one = (1i64 << COEFF_PRECISION_BITS) as f64;

            let weights = raw
                .iter()
                .map(|w| {
                    let w = if total != 0.0 { w / total } else { 0.0 };
                    (w * one + 0.5) as i64
                })
                .collect();
            AxisTap { start, weights }
        })
        .collect()
}

fn apply_tap(tap: &AxisTap, sample: impl Fn(usize) -> u8) -> u8 {
    let mut acc = 1i64 << (COEFF_PRECISION_BITS - 1);
    for (offset, weight) in tap.weights.iter().enumerate() {
        acc += sample(tap.start + offset) as i64 * weight;
    }
    (acc >> COEFF_PRECISION_BITS).clamp(0, 255) as u8
}

/// PIL-compatible bilinear resize.
///
/// Separable like `Image.resize(size, BILINEAR)`: a horizontal pass into an
/// 8-bit intermediate, then a vertical pass. An axis whose length does not
/// change is copied as is, so a 32x32 input passes through untouched.
pub fn bilinear_resize(src: &RgbImage, target_width: u32, target_height: u32) -> RgbImage {
    let horizontal = if src.width() == target_width {
        src.clone()
    } else {
        let taps = axis_taps(src.width() as usize, target_width as usize);
        RgbImage::from_fn(target_width, src.height(), |x, y| {
            let tap = &taps[x as usize];
            Rgb(std::array::from_fn(|c| {
                apply_tap(tap, |sx| src.get_pixel(sx as u32, y)[c])
            }))
        })
    };

    if horizontal.height() == target_height {
        return horizontal;
    }

    let taps = axis_taps(horizontal.height() as usize, target_height as usize);
    RgbImage::from_fn(target_width, target_height, |x, y| {
        let tap = &taps[y as usize];
        Rgb(std::array::from_fn(|c| {
            apply_tap(tap, |sy| horizontal.get_pixel(x, sy as u32)[c])
        }))
    })
}

/// Preprocessing pipeline with a fixed normalization preset
#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor {
    pub preset: NormalizationPreset,
}

impl Preprocessor {
    pub fn new(preset: NormalizationPreset) -> Self {
        Self { preset }
    }

    /// Decode, convert, resize and normalize raw image bytes
    pub fn normalize(&self, bytes: &[u8]) -> Result<NormalizedTensor> {
        let rgb = decode_rgb(bytes)?;
        Ok(self.tensor_from_rgb(&rgb))
    }

    /// Resize an already decoded RGB image and normalize it into CHW layout
    pub fn tensor_from_rgb(&self, image: &RgbImage) -> NormalizedTensor {
        let resized = if image.dimensions() == (INPUT_SIZE, INPUT_SIZE) {
            image.clone()
        } else {
            bilinear_resize(image, INPUT_SIZE, INPUT_SIZE)
        };

        let mean = self.preset.mean();
        let std = self.preset.std();
        let num_pixels = (INPUT_SIZE * INPUT_SIZE) as usize;
        let mut data = vec![0.0f32; NormalizedTensor::LEN];

        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..INPUT_CHANNELS {
                let scaled = pixel[c] as f32 / 255.0;
                data[c * num_pixels + i] = (scaled - mean[c]) / std[c];
            }
        }

        NormalizedTensor { data }
    }
}
