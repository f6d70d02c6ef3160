use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::models::{MarketOdds, Outcome, PredictionVector};
use crate::error::{validate_bankroll, Result};

use super::disagreement::{
    analyze_disagreement, DisagreementAnalysis, DisagreementSeverity, DisagreementThresholds,
};
use super::kelly::{edge, expected_value, full_kelly, implied_probability, kelly_stake};

/// Fraction of full Kelly a bettor is willing to stake.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    /// 1/8 Kelly
    Conservative,
    /// 1/4 Kelly
    #[default]
    Moderate,
    /// 1/2 Kelly
    Aggressive,
}

impl RiskProfile {
    pub fn kelly_multiplier(&self) -> f64 {
        match self {
            RiskProfile::Conservative => 0.125,
            RiskProfile::Moderate => 0.25,
            RiskProfile::Aggressive => 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    #[serde(rename = "bet")]
    Bet,
    #[serde(rename = "no-bet")]
    NoBet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

/// Optimizer policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StakeConfig {
    /// Minimum edge (model prob − implied prob) required to bet
    pub min_edge: f64,
    /// Hard cap on stake as a fraction of bankroll, whatever Kelly says
    pub max_stake_fraction: f64,
    pub disagreement: DisagreementThresholds,
}

impl Default for StakeConfig {
    fn default() -> Self {
        Self {
            min_edge: 0.02,
            max_stake_fraction: 0.05,
            disagreement: DisagreementThresholds::default(),
        }
    }
}

/// Outcome of a single optimizer call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeRecommendation {
    pub recommendation: Recommendation,
    /// Selected market; `None` when no outcome cleared the edge threshold
    pub market: Option<Outcome>,
    /// Decimal odds of the selected market
    pub odds: Option<f64>,
    /// Model win probability of the selected market
    pub probability: Option<f64>,
    pub stake: f64,
    /// Best edge observed (may be negative on no-bet)
    pub edge: f64,
    pub expected_value: f64,
    /// Full Kelly fraction, clamped to [0, 1], before profile scaling
    pub kelly_fraction: f64,
    /// Final stake as a fraction of bankroll
    pub bankroll_fraction: f64,
    pub risk_level: RiskLevel,
    pub confidence_level: ConfidenceLevel,
    pub disagreement_analysis: Option<DisagreementAnalysis>,
    /// Multiplier applied to the Kelly stake because of model disagreement
    pub stake_adjustment: Option<f64>,
    pub reasoning: Vec<String>,
}

impl StakeRecommendation {
    pub fn is_bet(&self) -> bool {
        self.recommendation == Recommendation::Bet
    }
}

/// Turns a probability vector and market prices into a sized bet.
#[derive(Debug, Clone, Default)]
pub struct StakeOptimizer {
    config: StakeConfig,
}

impl StakeOptimizer {
    pub fn new(config: StakeConfig) -> Self {
        StakeOptimizer { config }
    }

    pub fn config(&self) -> &StakeConfig {
        &self.config
    }

    /// Compute a bet/no-bet recommendation.
    ///
    /// `secondary` holds independent estimates (e.g. a Poisson goals model)
    /// for the disagreement safeguard; pass an empty slice when none exist.
    pub fn compute_stake(
        &self,
        prediction: &PredictionVector,
        odds: &MarketOdds,
        bankroll: f64,
        profile: RiskProfile,
        secondary: &[PredictionVector],
    ) -> Result<StakeRecommendation> {
        validate_bankroll(bankroll)?;
        prediction.validate()?;
        odds.validate()?;
        for estimate in secondary {
            estimate.validate()?;
        }

        let confidence_level = Self::confidence_level(prediction.confidence);
        let mut reasoning = Vec::new();

        // Greatest edge across offered markets; ties keep home/draw/away order.
        let mut best: Option<(Outcome, f64, f64)> = None;
        for outcome in Outcome::ALL {
            let Some(price) = odds.get(outcome) else {
                continue;
            };
            let e = edge(prediction.probability(outcome), price);
            debug!(
                "{}: p={:.4} implied={:.4} edge={:+.4}",
                outcome,
                prediction.probability(outcome),
                implied_probability(price),
                e
            );
            if best.map_or(true, |(_, _, b)| e > b) {
                best = Some((outcome, price, e));
            }
        }

        let Some((outcome, price, best_edge)) = best else {
            reasoning.push("No market prices supplied".to_string());
            return Ok(self.no_bet(None, 0.0, confidence_level, None, reasoning));
        };

        if best_edge <= self.config.min_edge {
            reasoning.push(format!(
                "Best edge {:+.2}pp on {} does not exceed the {:.2}pp minimum",
                best_edge * 100.0,
                outcome,
                self.config.min_edge * 100.0
            ));
            debug!("No bet: best edge {:.4} on {}", best_edge, outcome);
            return Ok(self.no_bet(None, best_edge, confidence_level, None, reasoning));
        }

        let p = prediction.probability(outcome);
        reasoning.push(format!(
            "Model gives {} {:.1}% vs market-implied {:.1}% at {:.2} (edge {:+.2}pp)",
            outcome,
            p * 100.0,
            implied_probability(price) * 100.0,
            price,
            best_edge * 100.0
        ));

        let kelly = full_kelly(p, price);
        let multiplier = profile.kelly_multiplier();
        let raw_stake = kelly_stake(p, price, multiplier) * bankroll;
        let cap = self.config.max_stake_fraction * bankroll;
        reasoning.push(format!(
            "Full Kelly {:.2}% × {:?} profile ({}) = {:.2}% of bankroll",
            kelly * 100.0,
            profile,
            multiplier,
            kelly * multiplier * 100.0
        ));

        let mut stake = raw_stake;
        if stake > cap {
            reasoning.push(format!(
                "Stake capped at {:.1}% of bankroll ({:.2})",
                self.config.max_stake_fraction * 100.0,
                cap
            ));
            stake = cap;
        }

        let analysis =
            analyze_disagreement(outcome, prediction, secondary, &self.config.disagreement);
        let mut stake_adjustment = None;
        if let Some(a) = &analysis {
            match a.severity {
                DisagreementSeverity::Critical => {
                    reasoning.push(format!(
                        "Critical model disagreement on {} (σ={:.3}); edge is not trustworthy",
                        outcome, a.std_dev
                    ));
                    info!(
                        "Disagreement veto on {}: σ={:.3}, primary={:.3}, mean={:.3}",
                        outcome, a.std_dev, a.primary_probability, a.mean_probability
                    );
                    return Ok(self.no_bet(
                        Some((outcome, price, p)),
                        best_edge,
                        confidence_level,
                        analysis,
                        reasoning,
                    ));
                }
                DisagreementSeverity::Low => {
                    reasoning.push(format!(
                        "Secondary estimates agree (σ={:.3})",
                        a.std_dev
                    ));
                }
                severity => {
                    stake *= a.stake_multiplier;
                    stake_adjustment = Some(a.stake_multiplier);
                    reasoning.push(format!(
                        "{:?} model disagreement (σ={:.3}); stake scaled by {}",
                        severity, a.std_dev, a.stake_multiplier
                    ));
                    info!(
                        "Disagreement on {} ({:?}), stake scaled by {}",
                        outcome, severity, a.stake_multiplier
                    );
                }
            }
        }

        let stake = stake.clamp(0.0, bankroll);
        let ev = expected_value(stake, price, p);
        let bankroll_fraction = stake / bankroll;
        reasoning.push(format!(
            "Stake {:.2} ({:.2}% of bankroll), expected value {:+.2}",
            stake,
            bankroll_fraction * 100.0,
            ev
        ));

        Ok(StakeRecommendation {
            recommendation: Recommendation::Bet,
            market: Some(outcome),
            odds: Some(price),
            probability: Some(p),
            stake,
            edge: best_edge,
            expected_value: ev,
            kelly_fraction: kelly,
            bankroll_fraction,
            risk_level: Self::risk_level(bankroll_fraction),
            confidence_level,
            disagreement_analysis: analysis,
            stake_adjustment,
            reasoning,
        })
    }

    fn no_bet(
        &self,
        selection: Option<(Outcome, f64, f64)>,
        best_edge: f64,
        confidence_level: ConfidenceLevel,
        disagreement_analysis: Option<DisagreementAnalysis>,
        reasoning: Vec<String>,
    ) -> StakeRecommendation {
        let stake_adjustment = disagreement_analysis.as_ref().map(|a| a.stake_multiplier);
        StakeRecommendation {
            recommendation: Recommendation::NoBet,
            market: selection.map(|(o, _, _)| o),
            odds: selection.map(|(_, price, _)| price),
            probability: selection.map(|(_, _, p)| p),
            stake: 0.0,
            edge: best_edge,
            expected_value: 0.0,
            kelly_fraction: 0.0,
            bankroll_fraction: 0.0,
            risk_level: RiskLevel::Low,
            confidence_level,
            disagreement_analysis,
            stake_adjustment,
            reasoning,
        }
    }

    fn risk_level(bankroll_fraction: f64) -> RiskLevel {
        if bankroll_fraction < 0.02 {
            RiskLevel::Low
        } else if bankroll_fraction < 0.05 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    fn confidence_level(confidence: f64) -> ConfidenceLevel {
        if confidence >= 0.7 {
            ConfidenceLevel::High
        } else if confidence >= 0.5 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use approx::assert_relative_eq;

    fn optimizer() -> StakeOptimizer {
        StakeOptimizer::default()
    }

    #[test]
    fn bets_on_largest_edge() {
        let pred = PredictionVector::new(0.55, 0.25, 0.20, 0.8);
        let odds = MarketOdds::new(2.2, Some(3.5), 4.5);
        let rec = optimizer()
            .compute_stake(&pred, &odds, 1000.0, RiskProfile::Moderate, &[])
            .unwrap();
        assert!(rec.is_bet());
        assert_eq!(rec.market, Some(Outcome::Home));
        // edge = 0.55 - 1/2.2
        assert_relative_eq!(rec.edge, 0.55 - 1.0 / 2.2, epsilon = 1e-12);
        // f* = (1.2*0.55 - 0.45)/1.2 = 0.175; ×0.25 → 4.375% → 43.75
        assert_relative_eq!(rec.kelly_fraction, 0.175, epsilon = 1e-12);
        assert_relative_eq!(rec.stake, 43.75, epsilon = 1e-9);
        assert_relative_eq!(rec.expected_value, 43.75 * (2.2 * 0.55 - 1.0), epsilon = 1e-9);
        assert_eq!(rec.risk_level, RiskLevel::Medium);
        assert_eq!(rec.confidence_level, ConfidenceLevel::High);
        assert!(rec.disagreement_analysis.is_none());
    }

    #[test]
    fn stake_capped_at_max_fraction() {
        let pred = PredictionVector::new(0.70, 0.20, 0.10, 0.9);
        let odds = MarketOdds::new(2.5, Some(4.0), 8.0);
        let rec = optimizer()
            .compute_stake(&pred, &odds, 1000.0, RiskProfile::Aggressive, &[])
            .unwrap();
        // f* = (1.5*0.7 - 0.3)/1.5 = 0.5 → ½ Kelly = 25%, capped at 5%
        assert_relative_eq!(rec.kelly_fraction, 0.5, epsilon = 1e-12);
        assert_relative_eq!(rec.stake, 50.0, epsilon = 1e-9);
        assert_eq!(rec.risk_level, RiskLevel::High);
    }

    #[test]
    fn no_bet_when_no_positive_ev() {
        // odds·p ≤ 1 for every outcome
        let pred = PredictionVector::new(0.45, 0.30, 0.25, 0.6);
        let odds = MarketOdds::new(2.0, Some(3.2), 3.8);
        let rec = optimizer()
            .compute_stake(&pred, &odds, 500.0, RiskProfile::Aggressive, &[])
            .unwrap();
        assert_eq!(rec.recommendation, Recommendation::NoBet);
        assert_relative_eq!(rec.stake, 0.0);
        assert!(rec.market.is_none());
        assert!(!rec.reasoning.is_empty());
    }

    #[test]
    fn no_bet_below_min_edge() {
        // edge = 0.51 - 0.5 = 1pp < 2pp
        let pred = PredictionVector::new(0.51, 0.0, 0.49, 0.6);
        let odds = MarketOdds::new(2.0, None, 2.1);
        let rec = optimizer()
            .compute_stake(&pred, &odds, 500.0, RiskProfile::Moderate, &[])
            .unwrap();
        assert_eq!(rec.recommendation, Recommendation::NoBet);
    }

    #[test]
    fn critical_disagreement_overrides_to_no_bet() {
        let pred = PredictionVector::new(0.60, 0.25, 0.15, 0.8);
        let poisson = PredictionVector::new(0.38, 0.32, 0.30, 0.5);
        let odds = MarketOdds::new(2.1, Some(3.4), 5.0);
        let rec = optimizer()
            .compute_stake(&pred, &odds, 1000.0, RiskProfile::Moderate, &[poisson])
            .unwrap();
        assert_eq!(rec.recommendation, Recommendation::NoBet);
        assert_relative_eq!(rec.stake, 0.0);
        assert_eq!(rec.market, Some(Outcome::Home));
        let analysis = rec.disagreement_analysis.unwrap();
        assert_eq!(analysis.severity, DisagreementSeverity::Critical);
    }

    #[test]
    fn high_disagreement_halves_stake() {
        let pred = PredictionVector::new(0.55, 0.25, 0.20, 0.8);
        let odds = MarketOdds::new(2.2, Some(3.5), 4.5);
        let baseline = optimizer()
            .compute_stake(&pred, &odds, 1000.0, RiskProfile::Moderate, &[])
            .unwrap();
        // gap 0.14 → σ = 0.07 → high
        let secondary = PredictionVector::new(0.41, 0.30, 0.29, 0.5);
        let rec = optimizer()
            .compute_stake(&pred, &odds, 1000.0, RiskProfile::Moderate, &[secondary])
            .unwrap();
        assert!(rec.is_bet());
        assert_eq!(rec.stake_adjustment, Some(0.5));
        assert_relative_eq!(rec.stake, baseline.stake * 0.5, epsilon = 1e-9);
    }

    #[test]
    fn rejects_invalid_input() {
        let pred = PredictionVector::new(0.5, 0.3, 0.2, 0.8);
        let odds = MarketOdds::new(2.0, Some(3.0), 4.0);
        let o = optimizer();
        assert!(matches!(
            o.compute_stake(&pred, &odds, 0.0, RiskProfile::Moderate, &[]),
            Err(EngineError::InvalidInput(_))
        ));
        let bad_odds = MarketOdds::new(1.0, Some(3.0), 4.0);
        assert!(o
            .compute_stake(&pred, &bad_odds, 100.0, RiskProfile::Moderate, &[])
            .is_err());
        let bad_pred = PredictionVector::new(0.6, 0.3, 0.2, 0.8);
        assert!(o
            .compute_stake(&bad_pred, &odds, 100.0, RiskProfile::Moderate, &[])
            .is_err());
    }

    #[test]
    fn kelly_and_stake_bounds_hold_across_grid() {
        let o = StakeOptimizer::new(StakeConfig {
            max_stake_fraction: 1.0,
            ..StakeConfig::default()
        });
        let odds_grid = [1.01, 1.5, 2.0, 3.0, 7.5, 50.0];
        for h in 0..=10 {
            for d in 0..=(10 - h) {
                let home = h as f64 / 10.0;
                let draw = d as f64 / 10.0;
                let away = 1.0 - home - draw;
                let pred = PredictionVector::new(home, draw, away.max(0.0), 0.5);
                for &oh in &odds_grid {
                    for &oa in &odds_grid {
                        let odds = MarketOdds::new(oh, Some(3.0), oa);
                        let rec = o
                            .compute_stake(&pred, &odds, 250.0, RiskProfile::Aggressive, &[])
                            .unwrap();
                        assert!((0.0..=1.0).contains(&rec.kelly_fraction));
                        assert!(rec.stake >= 0.0 && rec.stake <= 250.0);
                        let any_positive_ev = Outcome::ALL.iter().any(|&out| {
                            odds.get(out).unwrap() * pred.probability(out) > 1.0
                        });
                        if !any_positive_ev {
                            assert_eq!(rec.recommendation, Recommendation::NoBet);
                            assert_relative_eq!(rec.stake, 0.0);
                        }
                    }
                }
            }
        }
    }
}
