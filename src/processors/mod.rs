//! Processing stages of the classification pipeline.
//!
//! This module contains the reusable operations the pipeline composes:
//! - Image-to-tensor preprocessing
//! - Probability normalization and deterministic ranking
//! - Confidence score calibration

pub mod calibration;
pub mod preprocess;
pub mod ranking;

pub use calibration::ConfidenceCalibrator;
pub use preprocess::ImagePreprocessor;
pub use ranking::{normalize_scores, rank_top_k};
