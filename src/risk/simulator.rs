//! Monte Carlo risk simulator.
//!
//! Each trial replays `horizon` sequential bets at the recommended sizing,
//! drawing every result from Bernoulli(p) at the model's win probability and
//! tracking the running bankroll. A trial is ruined once the bankroll reaches
//! zero; it places no further bets.
//!
//! Every trial owns an RNG seeded from `(seed, trial index)` and per-trial
//! results are reduced in trial order, so a fixed seed reproduces the same
//! result whether trials run sequentially or across the rayon pool.
//!
//! Trials run in batches. A [`CancellationFlag`] is checked between batches;
//! a cancelled run reports statistics over completed trials only and is
//! marked `partial`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{validate_bankroll, validate_odds, validate_probability, EngineError, Result};
use crate::staking::StakeRecommendation;

use super::stats::{percentile, RunningStats};

/// How the stake evolves across the sequence of bets in one trial.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum StakingMode {
    /// Same absolute stake every round (capped at the remaining bankroll)
    #[default]
    Flat,
    /// Same fraction of the current bankroll every round
    Fractional,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Default number of trials
    pub iterations: usize,
    /// Default number of sequential bets per trial
    pub horizon: usize,
    /// Fixed seed for reproducible runs (random when absent)
    pub seed: Option<u64>,
    pub staking: StakingMode,
    /// Trials per batch between cancellation checks
    pub batch_size: usize,
    /// Spread trials across the rayon pool
    pub parallel: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            iterations: 10_000,
            horizon: 100,
            seed: None,
            staking: StakingMode::Flat,
            batch_size: 1_000,
            parallel: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloResult {
    /// 5th percentile of final bankroll
    pub p5: f64,
    /// Median final bankroll
    pub p50: f64,
    /// 95th percentile of final bankroll
    pub p95: f64,
    /// Share of individual bet draws that won
    pub win_rate: f64,
    /// Mean per-bet profit over its standard deviation (0 on zero variance)
    pub sharpe_ratio: f64,
    /// Share of trials whose bankroll reached zero
    pub ruin_probability: f64,
    /// Mean final profit per trial
    pub mean_profit: f64,
    pub iterations: usize,
    pub completed_trials: usize,
    pub horizon: usize,
    /// Set when the run was cancelled before every trial completed
    pub partial: bool,
}

/// Cooperative cancellation shared with whoever enforces the timeout.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A single repeated bet to simulate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetSpec {
    pub win_probability: f64,
    pub odds: f64,
    pub stake: f64,
}

#[derive(Debug, Clone, Copy)]
struct TrialOutcome {
    final_bankroll: f64,
    wins: u64,
    profits: RunningStats,
    ruined: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RiskSimulator {
    config: SimulationConfig,
}

impl RiskSimulator {
    pub fn new(config: SimulationConfig) -> Self {
        RiskSimulator { config }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Simulate repeating `recommendation` at `odds` for `horizon` bets,
    /// `iterations` times.
    pub fn run_simulation(
        &self,
        recommendation: &StakeRecommendation,
        odds: f64,
        bankroll: f64,
        iterations: usize,
        horizon: usize,
    ) -> Result<MonteCarloResult> {
        self.run_simulation_with_cancel(
            recommendation,
            odds,
            bankroll,
            iterations,
            horizon,
            &CancellationFlag::new(),
        )
    }

    pub fn run_simulation_with_cancel(
        &self,
        recommendation: &StakeRecommendation,
        odds: f64,
        bankroll: f64,
        iterations: usize,
        horizon: usize,
        cancel: &CancellationFlag,
    ) -> Result<MonteCarloResult> {
        validate_bankroll(bankroll)?;
        validate_odds(odds)?;
        Self::validate_counts(iterations, horizon)?;

        if !recommendation.is_bet() || recommendation.stake <= 0.0 {
            debug!("Simulation skipped: recommendation carries no stake");
            return Ok(Self::neutral_result(bankroll, iterations, horizon));
        }
        let win_probability = recommendation.probability.ok_or_else(|| {
            EngineError::invalid("Bet recommendation is missing its model probability")
        })?;

        let bet = BetSpec {
            win_probability,
            odds,
            stake: recommendation.stake,
        };
        self.simulate(bet, bankroll, iterations, horizon, cancel)
    }

    /// Simulate a raw bet specification.
    pub fn simulate(
        &self,
        bet: BetSpec,
        bankroll: f64,
        iterations: usize,
        horizon: usize,
        cancel: &CancellationFlag,
    ) -> Result<MonteCarloResult> {
        self.simulate_with_progress(bet, bankroll, iterations, horizon, cancel, |_| {})
    }

    /// Like [`simulate`](Self::simulate), calling `on_batch` with the number
    /// of completed trials after every batch.
    pub fn simulate_with_progress(
        &self,
        bet: BetSpec,
        bankroll: f64,
        iterations: usize,
        horizon: usize,
        cancel: &CancellationFlag,
        mut on_batch: impl FnMut(usize),
    ) -> Result<MonteCarloResult> {
        validate_bankroll(bankroll)?;
        validate_odds(bet.odds)?;
        validate_probability(bet.win_probability)?;
        Self::validate_counts(iterations, horizon)?;
        if !bet.stake.is_finite() || bet.stake < 0.0 {
            return Err(EngineError::invalid(format!(
                "Stake must be non-negative, got {}",
                bet.stake
            )));
        }
        if bet.stake == 0.0 {
            return Ok(Self::neutral_result(bankroll, iterations, horizon));
        }

        let seed = self.config.seed.unwrap_or_else(rand::random::<u64>);
        let staking = self.config.staking;
        let fraction = (bet.stake / bankroll).min(1.0);
        let batch_size = self.config.batch_size.max(1);
        debug!(
            "Monte Carlo: {} trials × {} bets, p={:.4}, odds={:.2}, stake={:.2}, seed={}",
            iterations, horizon, bet.win_probability, bet.odds, bet.stake, seed
        );

        let run_trial = |index: usize| {
            let mut rng = StdRng::seed_from_u64(trial_seed(seed, index as u64));
            simulate_trial(&mut rng, bet, fraction, bankroll, horizon, staking)
        };

        let mut outcomes: Vec<TrialOutcome> = Vec::with_capacity(iterations);
        let mut start = 0;
        while start < iterations {
            if cancel.is_cancelled() {
                warn!(
                    "Monte Carlo cancelled after {}/{} trials",
                    start, iterations
                );
                break;
            }
            let end = (start + batch_size).min(iterations);
            if self.config.parallel {
                let batch: Vec<TrialOutcome> = (start..end).into_par_iter().map(&run_trial).collect();
                outcomes.extend(batch);
            } else {
                outcomes.extend((start..end).map(&run_trial));
            }
            start = end;
            on_batch(start);
        }

        let result = Self::summarise(&outcomes, bankroll, iterations, horizon);
        info!(
            "Monte Carlo done: p5={:.2} p50={:.2} p95={:.2} win_rate={:.3} ruin={:.4}{}",
            result.p5,
            result.p50,
            result.p95,
            result.win_rate,
            result.ruin_probability,
            if result.partial { " (partial)" } else { "" }
        );
        Ok(result)
    }

    fn validate_counts(iterations: usize, horizon: usize) -> Result<()> {
        if iterations == 0 {
            return Err(EngineError::invalid("Iterations must be at least 1"));
        }
        if horizon == 0 {
            return Err(EngineError::invalid("Horizon must be at least 1 bet"));
        }
        Ok(())
    }

    fn neutral_result(bankroll: f64, iterations: usize, horizon: usize) -> MonteCarloResult {
        MonteCarloResult {
            p5: bankroll,
            p50: bankroll,
            p95: bankroll,
            win_rate: 0.0,
            sharpe_ratio: 0.0,
            ruin_probability: 0.0,
            mean_profit: 0.0,
            iterations,
            completed_trials: iterations,
            horizon,
            partial: false,
        }
    }

    fn summarise(
        outcomes: &[TrialOutcome],
        bankroll: f64,
        iterations: usize,
        horizon: usize,
    ) -> MonteCarloResult {
        let completed = outcomes.len();
        if completed == 0 {
            return MonteCarloResult {
                completed_trials: 0,
                partial: true,
                ..Self::neutral_result(bankroll, iterations, horizon)
            };
        }

        let mut finals: Vec<f64> = outcomes.iter().map(|o| o.final_bankroll).collect();
        let mean_final = finals.iter().sum::<f64>() / completed as f64;
        finals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut profits = RunningStats::default();
        let mut wins = 0u64;
        let mut ruined = 0usize;
        for o in outcomes {
            profits.merge(&o.profits);
            wins += o.wins;
            if o.ruined {
                ruined += 1;
            }
        }

        let win_rate = if profits.count > 0 {
            wins as f64 / profits.count as f64
        } else {
            0.0
        };
        let std = profits.std_dev();
        let sharpe_ratio = if std > 1e-12 && std.is_finite() {
            profits.mean / std
        } else {
            0.0
        };

        MonteCarloResult {
            p5: percentile(&finals, 0.05),
            p50: percentile(&finals, 0.50),
            p95: percentile(&finals, 0.95),
            win_rate,
            sharpe_ratio,
            ruin_probability: ruined as f64 / completed as f64,
            mean_profit: mean_final - bankroll,
            iterations,
            completed_trials: completed,
            horizon,
            partial: completed < iterations,
        }
    }
}

fn simulate_trial(
    rng: &mut StdRng,
    bet: BetSpec,
    fraction: f64,
    bankroll: f64,
    horizon: usize,
    staking: StakingMode,
) -> TrialOutcome {
    let mut bank = bankroll;
    let mut wins = 0u64;
    let mut profits = RunningStats::default();
    let mut ruined = false;

    for _ in 0..horizon {
        let stake = match staking {
            StakingMode::Flat => bet.stake.min(bank),
            StakingMode::Fractional => bank * fraction,
        };
        let profit = if rng.gen_bool(bet.win_probability) {
            wins += 1;
            stake * (bet.odds - 1.0)
        } else {
            -stake
        };
        profits.push(profit);
        bank += profit;
        if bank <= 0.0 {
            bank = 0.0;
            ruined = true;
            break;
        }
    }

    TrialOutcome {
        final_bankroll: bank,
        wins,
        profits,
        ruined,
    }
}

/// SplitMix64 finaliser; decorrelates seeds of neighbouring trials.
fn trial_seed(seed: u64, index: u64) -> u64 {
    let mut z = seed ^ index.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
