//! # HistoClass
//!
//! A Rust library for classifying histopathology images with ONNX models.
//! Fetches a remote model once, preprocesses images into normalized tensors,
//! runs inference, and returns ranked, confidence-calibrated predictions.
//!
//! ## Features
//!
//! - Process-wide model cache: each model URL is fetched and parsed at most
//!   once, with concurrent requests sharing the in-flight load
//! - Image-to-tensor preprocessing (nearest-neighbor resize, 0-255 to [0, 1]
//!   scaling, NHWC layout)
//! - Deterministic top-K ranking over the model's output distribution
//! - Piecewise confidence calibration for display
//! - An explicit session state machine (`idle`, `loading-model`,
//!   `predicting`, `ready`, `error`) for driving UIs
//! - ONNX Runtime integration for fast inference
//!
//! ## Modules
//!
//! * [`core`] - Configuration, errors, model handles, and the model cache
//! * [`processors`] - Preprocessing, ranking, and calibration stages
//! * [`pipeline`] - The inference engine, result types, and session
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use histoclass::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClassifierConfig::new("https://models.example.com/histo.onnx")
//!     .with_metadata_url("https://models.example.com/histo.json")
//!     .with_topk(3);
//!
//! let cache = Arc::new(ModelCache::new());
//! let mut session = ClassificationSession::new(config, cache)?;
//!
//! session.stage_image_bytes(std::fs::read("slide.png")?);
//! session.set_consent(true);
//! session.classify()?;
//!
//! if let Some(result) = session.result() {
//!     for candidate in result.candidates() {
//!         println!(
//!             "{}: {:.1}%",
//!             candidate.label,
//!             candidate.calibrated_probability * 100.0
//!         );
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod pipeline;
pub mod processors;

pub use core::init_tracing;

/// Prelude module for convenient imports.
///
/// Re-exports the types needed to configure and drive a classification
/// session.
pub mod prelude {
    pub use crate::core::{
        ClassificationError, ClassifierConfig, LabelMetadata, LoadedModel, ModelCache,
        ModelFetcher, ModelInputSpec, ModelRuntime,
    };
    pub use crate::pipeline::{
        Candidate, ClassificationResult, ClassificationSession, ClassifyOutcome, InferenceEngine,
        SessionStatus,
    };
    pub use crate::processors::{ConfidenceCalibrator, ImagePreprocessor};
}
