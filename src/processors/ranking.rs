//! Probability normalization and candidate ranking.
//!
//! Converts a raw model output row into a probability distribution and ranks
//! the channels deterministically: probability descending, ties broken by
//! ascending channel index, so identical inputs always yield identical order.

/// Relative tolerance for deciding that raw output already sums to 1.
const DISTRIBUTION_SUM_TOLERANCE: f32 = 1e-3;

/// Normalizes raw model output into a probability distribution.
///
/// Applies a numerically stable softmax. Two best-effort fallbacks use the
/// raw values directly instead:
/// - the output already forms a distribution (every value in [0, 1] and the
///   sum within tolerance of 1), so renormalizing would distort it;
/// - softmax produces non-finite values.
///
/// Both fallbacks are traced; neither is a silent failure.
pub fn normalize_scores(raw: &[f32]) -> Vec<f32> {
    if raw.is_empty() {
        return Vec::new();
    }

    if is_distribution(raw) {
        tracing::debug!("raw output already a distribution, skipping softmax");
        return raw.to_vec();
    }

    let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = raw.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();

    if !sum.is_finite() || sum <= 0.0 {
        tracing::debug!("softmax not applicable, falling back to raw output values");
        return raw.to_vec();
    }

    let probs: Vec<f32> = exps.iter().map(|&e| e / sum).collect();
    if probs.iter().any(|p| !p.is_finite()) {
        tracing::debug!("softmax produced non-finite values, falling back to raw output");
        return raw.to_vec();
    }
    probs
}

fn is_distribution(values: &[f32]) -> bool {
    let in_range = values.iter().all(|&v| (0.0..=1.0).contains(&v));
    let sum: f32 = values.iter().sum();
    in_range && (sum - 1.0).abs() <= DISTRIBUTION_SUM_TOLERANCE
}

/// Ranks channel probabilities into `(index, probability)` pairs.
///
/// Total order: probability descending, ties by ascending index. Returns at
/// most `k` pairs; `k` larger than the channel count is truncated.
pub fn rank_top_k(probabilities: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    indexed.truncate(k);
    indexed
}
