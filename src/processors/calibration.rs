//! Confidence score calibration.
//!
//! Raw model probabilities are rescaled into the confidence value shown to
//! the user. The transform is piecewise over the probability expressed as a
//! percentage: low-confidence bands are boosted, everything above 40% passes
//! through unchanged, and the result is always clamped to 1.0.
//!
//! The 35-40% band intentionally uses the same 2.5 factor as the 30-35%
//! band; this is the observed production behavior and must not be changed
//! without product sign-off.

/// Piecewise rescaling of raw probabilities into displayed confidence.
///
/// Pure and stateless. Applied uniformly to every candidate in a result so
/// behavior is consistent regardless of how many candidates are requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceCalibrator;

impl ConfidenceCalibrator {
    /// Creates a new calibrator.
    pub fn new() -> Self {
        Self
    }

    /// Calibrates a single raw probability.
    ///
    /// With `p` the probability as a percentage:
    /// - `p < 30`: multiply by 3.25
    /// - `30 <= p < 35`: multiply by 2.5
    /// - `35 <= p <= 40`: multiply by 2.5
    /// - `p > 40`: unchanged
    ///
    /// The result is clamped to 1.0, so calibrated values stay in [0, 1]
    /// whenever the input is in [0, 1].
    pub fn calibrate(&self, raw_probability: f32) -> f32 {
        let percent = raw_probability * 100.0;

        let adjusted = if percent < 30.0 {
            raw_probability * 3.25
        } else if percent < 35.0 {
            raw_probability * 2.5
        } else if percent <= 40.0 {
            raw_probability * 2.5
        } else {
            return raw_probability;
        };

        adjusted.min(1.0)
    }
}
