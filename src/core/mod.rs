//! The core module of the classification pipeline.
//!
//! This module contains the fundamental components of the pipeline, including:
//! - Configuration management
//! - Error handling
//! - Model handle types and ONNX Runtime execution
//! - The process-wide model cache
//! - Tensor type aliases
//!
//! It also provides re-exports of commonly used types for convenience.

pub mod cache;
pub mod config;
pub mod errors;
pub mod model;
pub mod tensor;

pub use cache::{HttpFetcher, ModelCache, ModelFetcher};
pub use config::{ClassifierConfig, DEFAULT_INPUT_SIZE, DEFAULT_TOPK};
pub use errors::ClassificationError;
pub use model::{LabelMetadata, LoadedModel, ModelInputSpec, ModelRuntime, OrtRuntime};
pub use tensor::{Tensor2D, Tensor4D};

/// Initializes the tracing subscriber for logging.
///
/// This function sets up the tracing subscriber with environment filter and
/// formatting layer. It's typically called at the start of an application to
/// enable logging.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
