//! Tensor type aliases used throughout the pipeline.

/// A 2D tensor of f32 values, `[batch, channels]`.
pub type Tensor2D = ndarray::Array2<f32>;

/// A 4D tensor of f32 values, `[batch, height, width, channels]`.
pub type Tensor4D = ndarray::Array4<f32>;
