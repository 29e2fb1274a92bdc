//! Model execution and candidate production.
//!
//! Runs the model's forward pass exactly once per call, normalizes the raw
//! output into a probability distribution, and produces the ranked top-K
//! candidates annotated with their labels. All intermediate tensors are
//! owned by the call and dropped on every exit path.

use crate::core::errors::ClassificationError;
use crate::core::model::LoadedModel;
use crate::core::tensor::Tensor4D;
use crate::pipeline::result::Candidate;
use crate::processors::ranking::{normalize_scores, rank_top_k};

/// Executes a model over a preprocessed tensor and ranks its output.
#[derive(Debug, Default)]
pub struct InferenceEngine;

impl InferenceEngine {
    /// Creates a new engine.
    pub fn new() -> Self {
        Self
    }

    /// Runs one forward pass and returns the ranked top-`topk` candidates.
    ///
    /// Candidates carry the raw probability; the calibrated field is
    /// initialized to the raw value and rewritten by the calibrator.
    ///
    /// # Errors
    ///
    /// Returns `ClassificationError::Inference` if the forward pass fails or
    /// the model output has an unusable shape.
    pub fn predict(
        &self,
        model: &LoadedModel,
        input: &Tensor4D,
        topk: usize,
    ) -> Result<Vec<Candidate>, ClassificationError> {
        let output = model.runtime().run(input)?;
        let row = output.row(0);
        let scores = row.as_slice().map(|s| s.to_vec()).unwrap_or_else(|| row.to_vec());

        if scores.is_empty() {
            return Err(ClassificationError::inference_msg(
                "model produced no output channels",
            ));
        }

        let probabilities = normalize_scores(&scores);
        let candidates = rank_top_k(&probabilities, topk)
            .into_iter()
            .map(|(index, raw_probability)| Candidate {
                index,
                label: model.label_for(index),
                raw_probability,
                calibrated_probability: raw_probability,
            })
            .collect();

        Ok(candidates)
    }
}
