//! Model-disagreement safeguard.
//!
//! Compares the ensemble probability for the selected outcome against
//! independently produced estimates (e.g. a Poisson goals model). A large
//! spread means the model family disputes its own edge, so the stake is cut
//! or the bet is vetoed.

use serde::{Deserialize, Serialize};

use crate::db::models::{Outcome, PredictionVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisagreementSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Standard-deviation cut-offs for each severity tier, plus the stake
/// multiplier applied at each tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DisagreementThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
    pub medium_multiplier: f64,
    pub high_multiplier: f64,
}

impl Default for DisagreementThresholds {
    fn default() -> Self {
        Self {
            medium: 0.03,
            high: 0.06,
            critical: 0.10,
            medium_multiplier: 0.75,
            high_multiplier: 0.5,
        }
    }
}

impl DisagreementThresholds {
    pub fn classify(&self, std_dev: f64) -> DisagreementSeverity {
        if std_dev >= self.critical {
            DisagreementSeverity::Critical
        } else if std_dev >= self.high {
            DisagreementSeverity::High
        } else if std_dev >= self.medium {
            DisagreementSeverity::Medium
        } else {
            DisagreementSeverity::Low
        }
    }

    /// Stake multiplier for a severity. Critical vetoes the bet.
    pub fn stake_multiplier(&self, severity: DisagreementSeverity) -> f64 {
        match severity {
            DisagreementSeverity::Low => 1.0,
            DisagreementSeverity::Medium => self.medium_multiplier,
            DisagreementSeverity::High => self.high_multiplier,
            DisagreementSeverity::Critical => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisagreementAnalysis {
    pub outcome: Outcome,
    pub primary_probability: f64,
    pub secondary_probabilities: Vec<f64>,
    pub mean_probability: f64,
    /// Population standard deviation across all estimates
    pub std_dev: f64,
    /// Largest absolute gap between the primary and any secondary estimate
    pub max_deviation: f64,
    pub severity: DisagreementSeverity,
    pub stake_multiplier: f64,
}

/// Measure how strongly the estimates disagree on `outcome`.
///
/// Returns `None` when no secondary estimate is available.
pub fn analyze_disagreement(
    outcome: Outcome,
    primary: &PredictionVector,
    secondary: &[PredictionVector],
    thresholds: &DisagreementThresholds,
) -> Option<DisagreementAnalysis> {
    if secondary.is_empty() {
        return None;
    }

    let primary_probability = primary.probability(outcome);
    let secondary_probabilities: Vec<f64> =
        secondary.iter().map(|v| v.probability(outcome)).collect();

    let mut all = Vec::with_capacity(secondary.len() + 1);
    all.push(primary_probability);
    all.extend_from_slice(&secondary_probabilities);

    let n = all.len() as f64;
    let mean = all.iter().sum::<f64>() / n;
    let variance = all.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.max(0.0).sqrt();
    let max_deviation = secondary_probabilities
        .iter()
        .map(|p| (p - primary_probability).abs())
        .fold(0.0, f64::max);

    let severity = thresholds.classify(std_dev);
    Some(DisagreementAnalysis {
        outcome,
        primary_probability,
        secondary_probabilities,
        mean_probability: mean,
        std_dev,
        max_deviation,
        severity,
        stake_multiplier: thresholds.stake_multiplier(severity),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn vector(home: f64) -> PredictionVector {
        let rest = (1.0 - home) / 2.0;
        PredictionVector::new(home, rest, rest, 0.7)
    }

    #[test]
    fn no_secondary_means_no_analysis() {
        let t = DisagreementThresholds::default();
        assert!(analyze_disagreement(Outcome::Home, &vector(0.5), &[], &t).is_none());
    }

    #[test]
    fn agreeing_models_are_low_severity() {
        let t = DisagreementThresholds::default();
        let a = analyze_disagreement(Outcome::Home, &vector(0.55), &[vector(0.53)], &t).unwrap();
        assert_eq!(a.severity, DisagreementSeverity::Low);
        assert_relative_eq!(a.std_dev, 0.01, epsilon = 1e-9);
        assert_relative_eq!(a.max_deviation, 0.02, epsilon = 1e-9);
        assert_relative_eq!(a.stake_multiplier, 1.0);
    }

    #[test]
    fn severity_tiers() {
        let t = DisagreementThresholds::default();
        let sev = |secondary: f64| {
            analyze_disagreement(Outcome::Home, &vector(0.60), &[vector(secondary)], &t)
                .unwrap()
                .severity
        };
        // Two estimates: std dev = half the gap
        assert_eq!(sev(0.52), DisagreementSeverity::Medium);
        assert_eq!(sev(0.46), DisagreementSeverity::High);
        assert_eq!(sev(0.35), DisagreementSeverity::Critical);
    }

    #[test]
    fn critical_vetoes_stake() {
        let t = DisagreementThresholds::default();
        assert_relative_eq!(t.stake_multiplier(DisagreementSeverity::Critical), 0.0);
        assert!(DisagreementSeverity::Critical > DisagreementSeverity::High);
    }
}
