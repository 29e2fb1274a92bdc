//! Error types for the classification pipeline.
//!
//! This module defines the error taxonomy used across the pipeline: precondition
//! failures surfaced to the caller, model and metadata acquisition failures,
//! image decoding failures, and inference failures. Lower layers return these
//! errors; the session is the single place that maps them to the `error` status.

use thiserror::Error;

/// Errors that can occur in the classification pipeline.
///
/// The variants mirror the phases of a classification request: validating
/// preconditions, acquiring the model and its label metadata, decoding the
/// input image, and executing the model.
#[derive(Error, Debug)]
pub enum ClassificationError {
    /// A classify request was rejected before any work started.
    ///
    /// The caller must correct the input (stage an image, give consent) and
    /// re-issue the request. No state transition occurs.
    #[error("precondition failed: {reason}")]
    Precondition {
        /// Why the request was rejected.
        reason: String,
    },

    /// The model could not be fetched or parsed. Fatal for the current request.
    #[error("model load failed for '{url}': {context}")]
    ModelLoad {
        /// The model URL that failed.
        url: String,
        /// Additional context about the failure.
        context: String,
        /// The underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Label metadata could not be fetched or parsed.
    ///
    /// Non-fatal: the cache degrades to synthesized labels instead of
    /// aborting the load.
    #[error("metadata load failed for '{url}': {context}")]
    MetadataLoad {
        /// The metadata URL that failed.
        url: String,
        /// Additional context about the failure.
        context: String,
        /// The underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The input image could not be decoded.
    #[error("image decode: {0}")]
    ImageDecode(#[source] image::ImageError),

    /// The forward pass failed or returned an unusable output shape.
    #[error("inference: {context}")]
    Inference {
        /// Additional context about the failure.
        context: String,
        /// The underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid configuration.
    #[error("configuration: {message}")]
    Config {
        /// A message describing the configuration error.
        message: String,
    },

    /// Error from tensor operations.
    #[error("tensor operation: {0}")]
    Tensor(#[from] ndarray::ShapeError),
}

impl ClassificationError {
    /// Creates a precondition error.
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::Precondition {
            reason: reason.into(),
        }
    }

    /// Creates a model load error with an underlying cause.
    pub fn model_load(
        url: &str,
        context: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ModelLoad {
            url: url.to_string(),
            context: context.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a model load error without an underlying cause.
    pub fn model_load_msg(url: &str, context: impl Into<String>) -> Self {
        Self::ModelLoad {
            url: url.to_string(),
            context: context.into(),
            source: None,
        }
    }

    /// Creates a metadata load error with an underlying cause.
    pub fn metadata_load(
        url: &str,
        context: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::MetadataLoad {
            url: url.to_string(),
            context: context.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a metadata load error without an underlying cause.
    pub fn metadata_load_msg(url: &str, context: impl Into<String>) -> Self {
        Self::MetadataLoad {
            url: url.to_string(),
            context: context.into(),
            source: None,
        }
    }

    /// Creates an inference error with an underlying cause.
    pub fn inference(
        context: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Inference {
            context: context.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an inference error without an underlying cause.
    pub fn inference_msg(context: impl Into<String>) -> Self {
        Self::Inference {
            context: context.into(),
            source: None,
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Implementation of From<image::ImageError> for ClassificationError.
///
/// This allows image::ImageError to be automatically converted to ClassificationError.
impl From<image::ImageError> for ClassificationError {
    fn from(error: image::ImageError) -> Self {
        Self::ImageDecode(error)
    }
}
