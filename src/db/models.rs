use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{validate_odds, validate_probability, EngineError, Result};

/// One of the three match-result markets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Home, Outcome::Draw, Outcome::Away];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Home => "home",
            Outcome::Draw => "draw",
            Outcome::Away => "away",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome-probability vector produced by the external scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionVector {
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
    /// Scorer's self-reported confidence (0.0–1.0)
    pub confidence: f64,
}

impl PredictionVector {
    /// Maximum allowed deviation of `home_win + draw + away_win` from 1.
    pub const SUM_TOLERANCE: f64 = 1e-3;

    pub fn new(home_win: f64, draw: f64, away_win: f64, confidence: f64) -> Self {
        PredictionVector {
            home_win,
            draw,
            away_win,
            confidence,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_probability(self.home_win)?;
        validate_probability(self.draw)?;
        validate_probability(self.away_win)?;
        validate_probability(self.confidence)?;
        let sum = self.home_win + self.draw + self.away_win;
        if (sum - 1.0).abs() > Self::SUM_TOLERANCE {
            return Err(EngineError::invalid(format!(
                "Outcome probabilities must sum to 1 (±{}), got {:.6}",
                Self::SUM_TOLERANCE,
                sum
            )));
        }
        Ok(())
    }

    pub fn probability(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home_win,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away_win,
        }
    }

    /// Most likely outcome. Ties resolve in home, draw, away order.
    pub fn predicted_outcome(&self) -> Outcome {
        let mut best = Outcome::Home;
        for outcome in [Outcome::Draw, Outcome::Away] {
            if self.probability(outcome) > self.probability(best) {
                best = outcome;
            }
        }
        best
    }

    /// Sum of squared errors against the one-hot vector of `actual`.
    pub fn brier_score(&self, actual: Outcome) -> f64 {
        Outcome::ALL
            .iter()
            .map(|&o| {
                let y = if o == actual { 1.0 } else { 0.0 };
                (self.probability(o) - y).powi(2)
            })
            .sum()
    }
}

/// Decimal odds offered for each outcome. `draw` is absent for markets
/// without a draw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOdds {
    pub home: f64,
    #[serde(default)]
    pub draw: Option<f64>,
    pub away: f64,
}

impl MarketOdds {
    pub fn new(home: f64, draw: Option<f64>, away: f64) -> Self {
        MarketOdds { home, draw, away }
    }

    pub fn get(&self, outcome: Outcome) -> Option<f64> {
        match outcome {
            Outcome::Home => Some(self.home),
            Outcome::Draw => self.draw,
            Outcome::Away => Some(self.away),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_odds(self.home)?;
        validate_odds(self.away)?;
        if let Some(draw) = self.draw {
            validate_odds(draw)?;
        }
        Ok(())
    }
}

/// A single source's prices for one matchup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OddsQuote {
    pub source_name: String,
    #[serde(default)]
    pub home: Option<f64>,
    #[serde(default)]
    pub draw: Option<f64>,
    #[serde(default)]
    pub away: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl OddsQuote {
    pub fn price(&self, outcome: Outcome) -> Option<f64> {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }
}

/// Settlement result of a placed bet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetOutcome {
    Won,
    Lost,
    /// Stake returned (push / abandoned match)
    Void,
}

/// An issued prediction and, once known, its settled result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// e.g. "Arsenal vs Chelsea"
    pub matchup: String,
    pub home_team: String,
    pub away_team: String,
    pub league: String,
    pub prediction: PredictionVector,
    pub odds: MarketOdds,
    pub bet_placed: bool,
    /// Market the bet was placed on, when `bet_placed`
    #[serde(default)]
    pub bet_market: Option<Outcome>,
    /// Amount staked, when `bet_placed`
    #[serde(default)]
    pub stake: Option<f64>,
    #[serde(default)]
    pub actual: Option<Outcome>,
    #[serde(default)]
    pub correct: Option<bool>,
    #[serde(default)]
    pub brier_score: Option<f64>,
    #[serde(default)]
    pub bet_outcome: Option<BetOutcome>,
    #[serde(default)]
    pub bet_profit: Option<f64>,
    #[serde(default)]
    pub settled_at: Option<DateTime<Utc>>,
}

impl PredictionRecord {
    pub fn new(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
        home_team: impl Into<String>,
        away_team: impl Into<String>,
        league: impl Into<String>,
        prediction: PredictionVector,
        odds: MarketOdds,
    ) -> Self {
        let home_team = home_team.into();
        let away_team = away_team.into();
        PredictionRecord {
            id: id.into(),
            timestamp,
            matchup: format!("{} vs {}", home_team, away_team),
            home_team,
            away_team,
            league: league.into(),
            prediction,
            odds,
            bet_placed: false,
            bet_market: None,
            stake: None,
            actual: None,
            correct: None,
            brier_score: None,
            bet_outcome: None,
            bet_profit: None,
            settled_at: None,
        }
    }

    /// Mark the prediction as backed with a bet.
    pub fn with_bet(mut self, market: Outcome, stake: f64) -> Self {
        self.bet_placed = true;
        self.bet_market = Some(market);
        self.stake = Some(stake);
        self
    }

    pub fn is_settled(&self) -> bool {
        self.actual.is_some()
    }

    /// Validate a record before it enters the prediction log.
    pub fn validate(&self) -> Result<()> {
        self.validate_fields()?;
        if self.is_settled() {
            return Err(EngineError::invalid(format!(
                "Prediction {} is already settled; track it before its outcome is known",
                self.id
            )));
        }
        Ok(())
    }

    /// Field checks shared by tracking and import; settled records pass.
    pub fn validate_fields(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::invalid("Prediction id must not be empty"));
        }
        self.prediction.validate()?;
        self.odds.validate()?;
        if let Some(stake) = self.stake {
            if !stake.is_finite() || stake < 0.0 {
                return Err(EngineError::invalid(format!(
                    "Stake must be non-negative, got {}",
                    stake
                )));
            }
        }
        if let Some(market) = self.bet_market {
            if self.odds.get(market).is_none() {
                return Err(EngineError::invalid(format!(
                    "Bet placed on {} but no odds were recorded for it",
                    market
                )));
            }
        }
        Ok(())
    }

    /// Fill in the real-world result. A record settles exactly once.
    ///
    /// When a bet was placed and no explicit bet result is supplied, it is
    /// derived from `bet_market`, `stake` and the recorded odds.
    pub fn settle(
        &mut self,
        actual: Outcome,
        bet_outcome: Option<BetOutcome>,
        bet_profit: Option<f64>,
        settled_at: DateTime<Utc>,
    ) -> Result<()> {
        if self.is_settled() {
            return Err(EngineError::invalid(format!(
                "Prediction {} has already been settled",
                self.id
            )));
        }
        if !self.bet_placed && (bet_outcome.is_some() || bet_profit.is_some()) {
            return Err(EngineError::invalid(format!(
                "Prediction {} has no bet to settle",
                self.id
            )));
        }
        if let Some(profit) = bet_profit {
            if !profit.is_finite() {
                return Err(EngineError::invalid("Bet profit must be finite"));
            }
        }
        if let (Some(market), Some(given)) = (self.bet_market, bet_outcome) {
            let contradicts = match given {
                BetOutcome::Won => market != actual,
                BetOutcome::Lost => market == actual,
                BetOutcome::Void => false,
            };
            if contradicts {
                return Err(EngineError::invalid(format!(
                    "Bet on {} cannot be {:?} when the result is {}",
                    market, given, actual
                )));
            }
        }

        if self.bet_placed {
            let outcome = bet_outcome.or_else(|| {
                self.bet_market.map(|m| {
                    if m == actual {
                        BetOutcome::Won
                    } else {
                        BetOutcome::Lost
                    }
                })
            });
            let profit = bet_profit.or_else(|| {
                let stake = self.stake?;
                match outcome? {
                    BetOutcome::Won => {
                        let odds = self.odds.get(self.bet_market?)?;
                        Some(stake * (odds - 1.0))
                    }
                    BetOutcome::Lost => Some(-stake),
                    BetOutcome::Void => Some(0.0),
                }
            });
            self.bet_outcome = outcome;
            self.bet_profit = profit;
        }

        self.actual = Some(actual);
        self.correct = Some(self.prediction.predicted_outcome() == actual);
        self.brier_score = Some(self.prediction.brier_score(actual));
        self.settled_at = Some(settled_at);
        Ok(())
    }
}
