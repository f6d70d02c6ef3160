//! Closing line value.
//!
//! CLV compares the price a bet was struck at with the market's final
//! (closing) price for the same selection:
//!
//!   CLV% = (closing_implied − opening_implied) / opening_implied × 100
//!
//! Positive CLV means the market moved toward the selection after the bet
//! was placed, which is a skill signal independent of whether the bet won.

use serde::{Deserialize, Serialize};

use crate::error::{validate_odds, Result};
use crate::staking::kelly::implied_probability;

/// CLV% below this is `poor`.
const POOR_BELOW: f64 = -2.0;
/// CLV% at or above this is `good`.
const GOOD_FROM: f64 = 2.0;
/// CLV% at or above this is `excellent`.
const EXCELLENT_FROM: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClvTier {
    Poor,
    Neutral,
    Good,
    Excellent,
}

impl ClvTier {
    pub fn from_percent(clv_percent: f64) -> Self {
        if clv_percent >= EXCELLENT_FROM {
            ClvTier::Excellent
        } else if clv_percent >= GOOD_FROM {
            ClvTier::Good
        } else if clv_percent < POOR_BELOW {
            ClvTier::Poor
        } else {
            ClvTier::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClvMetrics {
    pub opening_odds: f64,
    pub closing_odds: f64,
    pub opening_implied: f64,
    pub closing_implied: f64,
    pub clv_percent: f64,
    /// Bet was struck at a better price than the close
    pub beat_closing_line: bool,
    pub interpretation: ClvTier,
}

/// CLV of backing a selection at `opening` decimal odds that closed at
/// `closing`.
pub fn compute_clv(opening: f64, closing: f64) -> Result<ClvMetrics> {
    validate_odds(opening)?;
    validate_odds(closing)?;

    let opening_implied = implied_probability(opening);
    let closing_implied = implied_probability(closing);
    let clv_percent = (closing_implied - opening_implied) / opening_implied * 100.0;

    Ok(ClvMetrics {
        opening_odds: opening,
        closing_odds: closing,
        opening_implied,
        closing_implied,
        clv_percent,
        beat_closing_line: clv_percent > 0.0,
        interpretation: ClvTier::from_percent(clv_percent),
    })
}

/// Aggregate view over many bets' CLV
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClvSummary {
    pub count: usize,
    pub mean_clv_percent: f64,
    /// Share of bets that beat the closing line
    pub beat_rate: f64,
}

pub fn summarize_clv(metrics: &[ClvMetrics]) -> ClvSummary {
    if metrics.is_empty() {
        return ClvSummary::default();
    }
    let n = metrics.len() as f64;
    ClvSummary {
        count: metrics.len(),
        mean_clv_percent: metrics.iter().map(|m| m.clv_percent).sum::<f64>() / n,
        beat_rate: metrics.iter().filter(|m| m.beat_closing_line).count() as f64 / n,
    }
}
