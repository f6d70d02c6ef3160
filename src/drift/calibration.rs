/// Probability calibration diagnostics for settled predictions.
///
/// Both metrics work on the probability the model assigned to an outcome:
/// log loss on the outcome that actually happened, expected calibration
/// error on the model's top pick against whether that pick was right.
const EPS: f64 = 1e-6;

/// Reliability bins used for expected calibration error
pub const DEFAULT_BINS: usize = 10;

fn clamp_prob(p: f64) -> f64 {
    p.clamp(EPS, 1.0 - EPS)
}

/// Mean of −ln(p) over the probabilities given to the realised outcomes.
/// 0 for an empty slice.
pub fn log_loss(actual_probs: &[f64]) -> f64 {
    if actual_probs.is_empty() {
        return 0.0;
    }
    let total: f64 = actual_probs.iter().map(|p| -clamp_prob(*p).ln()).sum();
    total / actual_probs.len() as f64
}

/// Expected calibration error over `(confidence, correct)` pairs.
///
/// Confidences are bucketed into `bins` equal-width bins on [0, 1]; each bin
/// contributes |mean confidence − hit rate| weighted by its share of samples.
pub fn expected_calibration_error(samples: &[(f64, bool)], bins: usize) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let bins = bins.max(1);
    let mut conf_sum = vec![0.0f64; bins];
    let mut hits = vec![0usize; bins];
    let mut counts = vec![0usize; bins];

    for (p, correct) in samples {
        let p = p.clamp(0.0, 1.0);
        let idx = ((p * bins as f64) as usize).min(bins - 1);
        conf_sum[idx] += p;
        counts[idx] += 1;
        if *correct {
            hits[idx] += 1;
        }
    }

    let n = samples.len() as f64;
    (0..bins)
        .filter(|&b| counts[b] > 0)
        .map(|b| {
            let c = counts[b] as f64;
            let gap = (conf_sum[b] / c - hits[b] as f64 / c).abs();
            gap * c / n
        })
        .sum()
}
