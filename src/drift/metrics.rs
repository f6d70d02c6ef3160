use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::calibration::{expected_calibration_error, log_loss, DEFAULT_BINS};
use crate::db::models::{BetOutcome, Outcome, PredictionRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeStats {
    /// Settled predictions whose top pick was this outcome
    pub predicted: usize,
    pub correct: usize,
    pub accuracy: f64,
}

/// Performance of the model over a set of prediction records.
///
/// Accuracy, Brier and calibration figures cover settled records only;
/// `total_predictions` counts every record in the set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollingMetrics {
    pub accuracy: f64,
    pub brier_score: f64,
    /// Profit over total staked; 0 when nothing was staked
    pub roi: f64,
    pub total_predictions: usize,
    pub settled_predictions: usize,
    pub correct_predictions: usize,
    pub total_bets: usize,
    pub winning_bets: usize,
    pub total_profit: f64,
    pub total_staked: f64,
    pub by_outcome: BTreeMap<Outcome, OutcomeStats>,
    pub log_loss: f64,
    pub calibration_error: f64,
    /// Latest settlement time among the records
    pub updated_at: Option<DateTime<Utc>>,
}

impl RollingMetrics {
    pub fn compute<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a PredictionRecord>,
    {
        let mut m = RollingMetrics::default();
        let mut brier_sum = 0.0;
        let mut actual_probs = Vec::new();
        let mut reliability = Vec::new();

        for record in records {
            m.total_predictions += 1;
            let Some(actual) = record.actual else {
                continue;
            };
            m.settled_predictions += 1;

            let pick = record.prediction.predicted_outcome();
            let correct = record.correct.unwrap_or(pick == actual);
            let stats = m.by_outcome.entry(pick).or_default();
            stats.predicted += 1;
            if correct {
                stats.correct += 1;
                m.correct_predictions += 1;
            }

            brier_sum += record
                .brier_score
                .unwrap_or_else(|| record.prediction.brier_score(actual));
            actual_probs.push(record.prediction.probability(actual));
            reliability.push((record.prediction.probability(pick), correct));

            if let Some(at) = record.settled_at {
                m.updated_at = Some(m.updated_at.map_or(at, |u| u.max(at)));
            }

            if record.bet_placed {
                if let Some(profit) = record.bet_profit {
                    m.total_bets += 1;
                    m.total_profit += profit;
                    m.total_staked += record.stake.unwrap_or(0.0);
                    if record.bet_outcome == Some(BetOutcome::Won) {
                        m.winning_bets += 1;
                    }
                }
            }
        }

        if m.settled_predictions > 0 {
            let n = m.settled_predictions as f64;
            m.accuracy = m.correct_predictions as f64 / n;
            m.brier_score = brier_sum / n;
            m.log_loss = log_loss(&actual_probs);
            m.calibration_error = expected_calibration_error(&reliability, DEFAULT_BINS);
        }
        if m.total_staked > 0.0 {
            m.roi = m.total_profit / m.total_staked;
        }
        for stats in m.by_outcome.values_mut() {
            if stats.predicted > 0 {
                stats.accuracy = stats.correct as f64 / stats.predicted as f64;
            }
        }
        m
    }
}
