//! Configuration for the classification pipeline.
//!
//! This module provides the configuration structure shared by the session and
//! the model cache, along with validation of its parameters.

use crate::core::errors::ClassificationError;
use serde::{Deserialize, Serialize};

/// Default number of top candidates returned by a classification.
pub const DEFAULT_TOPK: usize = 1;

/// Default spatial input size used when the model does not declare one.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Configuration for a classification session.
///
/// Holds the remote resource locations and the number of ranked candidates to
/// return. Created once and reused for every classify request on a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// URL of the serialized model.
    pub model_url: String,
    /// URL of the label metadata JSON (optional; absent metadata falls back
    /// to synthesized labels).
    pub metadata_url: Option<String>,
    /// Number of top candidates to return (must be >= 1).
    pub topk: usize,
}

impl ClassifierConfig {
    /// Creates a configuration with the given model URL and defaults for the
    /// remaining fields.
    pub fn new(model_url: impl Into<String>) -> Self {
        Self {
            model_url: model_url.into(),
            metadata_url: None,
            topk: DEFAULT_TOPK,
        }
    }

    /// Sets the metadata URL.
    pub fn with_metadata_url(mut self, metadata_url: impl Into<String>) -> Self {
        self.metadata_url = Some(metadata_url.into());
        self
    }

    /// Sets the number of top candidates to return.
    pub fn with_topk(mut self, topk: usize) -> Self {
        self.topk = topk;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ClassificationError::Config` if the model URL is empty, the
    /// metadata URL is present but empty, or `topk` is zero.
    pub fn validate(&self) -> Result<(), ClassificationError> {
        if self.model_url.trim().is_empty() {
            return Err(ClassificationError::config("model URL must not be empty"));
        }
        if let Some(url) = &self.metadata_url
            && url.trim().is_empty()
        {
            return Err(ClassificationError::config(
                "metadata URL must not be empty when set",
            ));
        }
        if self.topk == 0 {
            return Err(ClassificationError::config("topk must be greater than 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClassifierConfig::new("http://example/model.onnx");
        assert_eq!(config.topk, DEFAULT_TOPK);
        assert!(config.metadata_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_model_url_rejected() {
        let config = ClassifierConfig::new("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_topk_rejected() {
        let config = ClassifierConfig::new("http://example/model.onnx").with_topk(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_metadata_url_rejected() {
        let config = ClassifierConfig::new("http://example/model.onnx").with_metadata_url("");
        assert!(config.validate().is_err());
    }
}
