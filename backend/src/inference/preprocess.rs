use image::{DynamicImage, RgbImage};
use ndarray::Array4;

use super::InferenceError;
use super::resize::resize;
use crate::config::{NormalizationPolicy, PreprocessingConfig};

pub const INPUT_WIDTH: u32 = 256;
pub const INPUT_HEIGHT: u32 = 256;
pub const INPUT_CHANNELS: usize = 3;

#[derive(Debug, Clone)]
pub enum TensorData {
    U8(Array4<u8>),
    F32(Array4<f32>),
}

/// A single NHWC image batch of shape `(1, 256, 256, 3)`, channels in R, G, B order.
#[derive(Debug, Clone)]
pub struct PreparedTensor {
    data: TensorData,
    policy: NormalizationPolicy,
}

impl PreparedTensor {
    fn input_shape() -> (usize, usize, usize, usize) {
        (1, INPUT_HEIGHT as usize, INPUT_WIDTH as usize, INPUT_CHANNELS)
    }

    pub fn zeros(policy: NormalizationPolicy) -> Self {
        let data = match policy {
            NormalizationPolicy::RawU8 => TensorData::U8(Array4::zeros(Self::input_shape())),
            NormalizationPolicy::UnitF32 | NormalizationPolicy::SymmetricF32 => {
                TensorData::F32(Array4::zeros(Self::input_shape()))
            }
        };
        Self { data, policy }
    }

    pub fn shape(&self) -> &[usize] {
        match &self.data {
            TensorData::U8(a) => a.shape(),
            TensorData::F32(a) => a.shape(),
        }
    }

    pub fn policy(&self) -> NormalizationPolicy {
        self.policy
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }
}

/// Turns uploaded bytes into the tensor the classifier was trained on:
/// decode, convert to RGB, resize to 256x256 with the pinned filter, scale.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PreprocessingConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessingConfig) -> Self {
        Self { config }
    }

    pub fn policy(&self) -> NormalizationPolicy {
        self.config.normalization
    }

    pub fn decode(bytes: &[u8]) -> Result<DynamicImage, InferenceError> {
        let image = image::load_from_memory(bytes)?;
        if image.width() == 0 || image.height() == 0 {
            return Err(InferenceError::Decode(image::ImageError::Parameter(
                image::error::ParameterError::from_kind(
                    image::error::ParameterErrorKind::DimensionMismatch,
                ),
            )));
        }
        Ok(image)
    }

    /// The single color conversion point. Whatever the source mode (gray,
    /// gray+alpha, RGBA, 16-bit, float, expanded palette) the result is 8-bit
    /// interleaved R, G, B with alpha dropped.
    pub fn to_rgb(image: &DynamicImage) -> RgbImage {
        match image {
            DynamicImage::ImageRgb8(rgb) => rgb.clone(),
            other => other.to_rgb8(),
        }
    }

    pub fn normalize(rgb: &RgbImage, policy: NormalizationPolicy) -> PreparedTensor {
        let (width, height) = rgb.dimensions();
        let shape = (1, height as usize, width as usize, INPUT_CHANNELS);
        let raw = rgb.as_raw();
        let at = |y: usize, x: usize, c: usize| raw[(y * width as usize + x) * INPUT_CHANNELS + c];

        let data = match policy {
            NormalizationPolicy::RawU8 => {
                TensorData::U8(Array4::from_shape_fn(shape, |(_, y, x, c)| at(y, x, c)))
            }
            NormalizationPolicy::UnitF32 => TensorData::F32(Array4::from_shape_fn(
                shape,
                |(_, y, x, c)| at(y, x, c) as f32 / 255.0,
            )),
            NormalizationPolicy::SymmetricF32 => TensorData::F32(Array4::from_shape_fn(
                shape,
                |(_, y, x, c)| at(y, x, c) as f32 / 127.5 - 1.0,
            )),
        };

        PreparedTensor { data, policy }
    }

    pub fn prepare_image(&self, image: &DynamicImage) -> PreparedTensor {
        log::debug!(
            "Source image: {}x{}, color={:?}",
            image.width(),
            image.height(),
            image.color()
        );

        let rgb = Self::to_rgb(image);
        let resized = resize(&rgb, INPUT_WIDTH, INPUT_HEIGHT, self.config.resize_filter);

        if log::log_enabled!(log::Level::Debug) {
            let (min, max) = resized
                .as_raw()
                .iter()
                .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            log::debug!(
                "Resized with {:?} to {}x{}, value range [{}, {}]",
                self.config.resize_filter,
                resized.width(),
                resized.height(),
                min,
                max
            );
        }

        Self::normalize(&resized, self.config.normalization)
    }

    pub fn prepare(&self, bytes: &[u8]) -> Result<PreparedTensor, InferenceError> {
        let image = Self::decode(bytes)?;
        Ok(self.prepare_image(&image))
    }
}
