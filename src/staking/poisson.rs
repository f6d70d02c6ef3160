//! Independent goals-based estimate of match-result probabilities.
//!
//! Each side's goal count is modelled as an independent Poisson variable with
//! the supplied expected goals; summing the joint score grid gives home, draw
//! and away probabilities. The result is a statistical second opinion for the
//! disagreement safeguard, not a replacement for the ensemble.

use crate::db::models::PredictionVector;
use crate::error::{EngineError, Result};

/// Highest per-side goal count kept explicitly; the tail mass is folded into
/// the last bucket.
pub const DEFAULT_MAX_GOALS: u32 = 10;

/// Outcome probabilities from expected goals.
///
/// # Arguments
/// * `home_xg`    – Expected goals for the home side (≥ 0).
/// * `away_xg`    – Expected goals for the away side (≥ 0).
/// * `max_goals`  – Score grid size per side.
/// * `confidence` – Confidence to attach to the produced vector.
pub fn poisson_outcome_probabilities(
    home_xg: f64,
    away_xg: f64,
    max_goals: u32,
    confidence: f64,
) -> Result<PredictionVector> {
    for (label, xg) in [("home_xg", home_xg), ("away_xg", away_xg)] {
        if !xg.is_finite() || xg < 0.0 {
            return Err(EngineError::invalid(format!(
                "{} must be a non-negative number, got {}",
                label, xg
            )));
        }
    }

    let pmf_h = poisson_pmf(home_xg, max_goals);
    let pmf_a = poisson_pmf(away_xg, max_goals);

    let mut p_home = 0.0;
    let mut p_draw = 0.0;
    let mut p_away = 0.0;
    for (i, p_i) in pmf_h.iter().enumerate() {
        for (j, p_j) in pmf_a.iter().enumerate() {
            let p = p_i * p_j;
            if i > j {
                p_home += p;
            } else if i < j {
                p_away += p;
            } else {
                p_draw += p;
            }
        }
    }

    // Renormalise away float drift.
    let sum = p_home + p_draw + p_away;
    let vector = if sum > 0.0 {
        PredictionVector::new(p_home / sum, p_draw / sum, p_away / sum, confidence)
    } else {
        PredictionVector::new(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0, confidence)
    };
    vector.validate()?;
    Ok(vector)
}

fn poisson_pmf(lambda: f64, max_k: u32) -> Vec<f64> {
    let max_k = max_k as usize;
    let mut out = vec![0.0; max_k + 1];

    out[0] = (-lambda).exp();
    for k in 1..=max_k {
        out[k] = out[k - 1] * lambda / k as f64;
    }

    let sum: f64 = out.iter().sum();
    if sum < 1.0 {
        out[max_k] += 1.0 - sum;
    }
    out
}
