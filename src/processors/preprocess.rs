//! Image-to-tensor preprocessing.
//!
//! Converts a decoded image into the fixed-size normalized tensor the model
//! expects: nearest-neighbor resize to the declared spatial size, linear
//! scaling from the native 0-255 range to [0, 1], and a leading batch
//! dimension of 1. Nearest-neighbor is an explicit, reproducible choice that
//! matches the model's training-time resize policy.

use crate::core::errors::ClassificationError;
use crate::core::tensor::Tensor4D;
use image::{RgbImage, imageops::FilterType};

/// Converts decoded images into model input tensors.
#[derive(Debug, Default)]
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Creates a new preprocessor.
    pub fn new() -> Self {
        Self
    }

    /// Decodes raw image bytes into an RGB pixel buffer.
    ///
    /// # Errors
    ///
    /// Returns `ClassificationError::ImageDecode` if the bytes are corrupt or
    /// the container format is unsupported.
    pub fn decode(&self, bytes: &[u8]) -> Result<RgbImage, ClassificationError> {
        let image = image::load_from_memory(bytes).map_err(ClassificationError::ImageDecode)?;
        Ok(image.to_rgb8())
    }

    /// Converts an image into a `[1, target_size, target_size, 3]` tensor.
    ///
    /// Channel values are scaled from 0-255 to [0, 1]. The batch dimension is
    /// always 1; multi-image batching is out of scope.
    pub fn to_tensor(
        &self,
        image: &RgbImage,
        target_size: u32,
    ) -> Result<Tensor4D, ClassificationError> {
        if target_size == 0 {
            return Err(ClassificationError::config(
                "target size must be greater than 0",
            ));
        }

        let resized = if image.dimensions() == (target_size, target_size) {
            image.clone()
        } else {
            image::imageops::resize(image, target_size, target_size, FilterType::Nearest)
        };

        let size = target_size as usize;
        let mut tensor = Tensor4D::zeros((1, size, size, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            tensor[[0, y, x, 0]] = pixel[0] as f32 / 255.0;
            tensor[[0, y, x, 1]] = pixel[1] as f32 / 255.0;
            tensor[[0, y, x, 2]] = pixel[2] as f32 / 255.0;
        }

        Ok(tensor)
    }
}
