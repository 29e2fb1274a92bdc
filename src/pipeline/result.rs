//! Classification result types.

/// A single ranked classification candidate.
///
/// One candidate exists per model output channel that survives top-K
/// truncation. Candidates are unique by `index` and carry both the raw model
/// probability and the calibrated confidence shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Output channel id.
    pub index: usize,
    /// Label for the channel, from metadata or synthesized.
    pub label: String,
    /// Probability as produced by the model, in [0, 1].
    pub raw_probability: f32,
    /// Calibrated confidence for display, in [0, 1].
    pub calibrated_probability: f32,
}

/// The ranked, calibrated outcome of one classification.
///
/// Candidates are sorted by raw probability descending with ties broken by
/// ascending index, and there are at most top-K of them. Immutable once
/// produced; replaced when a new classification starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    candidates: Vec<Candidate>,
}

impl ClassificationResult {
    /// Wraps an already ranked candidate list.
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    /// All candidates in rank order.
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// The first-ranked candidate, if any.
    pub fn top(&self) -> Option<&Candidate> {
        self.candidates.first()
    }
}
