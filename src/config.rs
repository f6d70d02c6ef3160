use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::drift::{DriftConfig, DriftSeverity};
use crate::risk::{SimulationConfig, StakingMode};
use crate::staking::{DisagreementThresholds, RiskProfile, StakeConfig};

/// Stake sizing, risk simulation and model drift monitoring for sports wagering
#[derive(Parser, Debug, Clone)]
#[command(name = "wager-guard", version, about)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub staking: StakingArgs,

    #[command(flatten)]
    pub simulation: SimulationArgs,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the JSON API
    Serve(ServeArgs),
    /// Size a bet from a JSON stake request file
    Stake {
        /// Path to a JSON file with `prediction`, `odds`, `bankroll` (and optionally `secondary`)
        input: PathBuf,
    },
    /// Run a Monte Carlo simulation from a JSON simulate request file
    Simulate {
        input: PathBuf,
    },
    /// Aggregate a JSON array of odds quotes
    Aggregate {
        input: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// API listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "wager-guard.db")]
    pub database_path: String,

    /// Webhook receiving drift alerts (alerts are only logged when unset)
    #[arg(long, env = "ALERT_WEBHOOK_URL")]
    pub alert_webhook_url: Option<String>,

    /// Lowest drift severity that triggers an alert
    #[arg(long, env = "ALERT_SEVERITY", value_enum, default_value = "high")]
    pub alert_severity: DriftSeverity,

    /// Prediction log capacity
    #[arg(long, env = "DRIFT_MAX_RECORDS", default_value = "1000")]
    pub max_records: usize,

    /// Rolling window age limit in days
    #[arg(long, env = "DRIFT_MAX_AGE_DAYS", default_value = "90")]
    pub max_age_days: i64,

    /// Settled predictions frozen into the drift baseline
    #[arg(long, env = "DRIFT_BASELINE_SIZE", default_value = "50")]
    pub baseline_size: usize,

    /// Recent settled predictions compared against the baseline
    #[arg(long, env = "DRIFT_RECENT_WINDOW", default_value = "50")]
    pub recent_window: usize,

    /// Minimum recent settled predictions before drift is scored
    #[arg(long, env = "DRIFT_MIN_SAMPLES", default_value = "30")]
    pub min_samples: usize,
}

#[derive(Args, Debug, Clone)]
pub struct StakingArgs {
    /// Minimum edge (model probability minus implied probability) to bet
    #[arg(long, global = true, env = "MIN_EDGE", default_value = "0.02")]
    pub min_edge: f64,

    /// Maximum stake as a fraction of bankroll
    #[arg(long, global = true, env = "MAX_STAKE_FRACTION", default_value = "0.05")]
    pub max_stake_fraction: f64,

    /// Risk profile used when a request does not name one
    #[arg(long, global = true, env = "RISK_PROFILE", value_enum, default_value = "moderate")]
    pub risk_profile: RiskProfile,
}

#[derive(Args, Debug, Clone)]
pub struct SimulationArgs {
    /// Monte Carlo trials
    #[arg(long, global = true, env = "SIM_ITERATIONS", default_value = "10000")]
    pub iterations: usize,

    /// Sequential bets per trial
    #[arg(long, global = true, env = "SIM_HORIZON", default_value = "100")]
    pub horizon: usize,

    /// Fixed seed for reproducible simulations
    #[arg(long, global = true, env = "SIM_SEED")]
    pub seed: Option<u64>,

    /// How the stake evolves within a trial
    #[arg(long, global = true, env = "SIM_STAKING", value_enum, default_value = "flat")]
    pub staking: StakingMode,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..1.0).contains(&self.staking.min_edge) {
            anyhow::bail!("min_edge must be between 0.0 and 1.0");
        }
        if !(self.staking.max_stake_fraction > 0.0 && self.staking.max_stake_fraction <= 1.0) {
            anyhow::bail!("max_stake_fraction must be in (0.0, 1.0]");
        }
        if self.simulation.iterations == 0 || self.simulation.horizon == 0 {
            anyhow::bail!("iterations and horizon must be at least 1");
        }
        if let Command::Serve(serve) = &self.command {
            if let Err(e) = serve.drift_config().validate() {
                anyhow::bail!("{}", e);
            }
        }
        Ok(())
    }

    pub fn stake_config(&self) -> StakeConfig {
        StakeConfig {
            min_edge: self.staking.min_edge,
            max_stake_fraction: self.staking.max_stake_fraction,
            disagreement: DisagreementThresholds::default(),
        }
    }

    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            iterations: self.simulation.iterations,
            horizon: self.simulation.horizon,
            seed: self.simulation.seed,
            staking: self.simulation.staking,
            ..SimulationConfig::default()
        }
    }
}

impl ServeArgs {
    pub fn drift_config(&self) -> DriftConfig {
        DriftConfig {
            max_records: self.max_records,
            max_age_days: self.max_age_days,
            baseline_sample_size: self.baseline_size,
            recent_window: self.recent_window,
            min_samples: self.min_samples,
            alert_severity: self.alert_severity,
            ..DriftConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::try_parse_from(["wager-guard", "serve"]).unwrap();
        config.validate().unwrap();
        assert_eq!(config.stake_config().min_edge, 0.02);
        assert_eq!(config.simulation_config().iterations, 10_000);
        match &config.command {
            Command::Serve(serve) => {
                assert_eq!(serve.drift_config().baseline_sample_size, 50);
                assert_eq!(serve.alert_severity, DriftSeverity::High);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn flags_after_subcommand() {
        let config = Config::try_parse_from([
            "wager-guard",
            "simulate",
            "req.json",
            "--seed",
            "42",
            "--staking",
            "fractional",
        ])
        .unwrap();
        let sim = config.simulation_config();
        assert_eq!(sim.seed, Some(42));
        assert_eq!(sim.staking, StakingMode::Fractional);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let config =
            Config::try_parse_from(["wager-guard", "--max-stake-fraction", "1.5", "aggregate", "q.json"])
                .unwrap();
        assert!(config.validate().is_err());

        let config = Config::try_parse_from([
            "wager-guard",
            "serve",
            "--min-samples",
            "80",
            "--recent-window",
            "50",
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }
}
