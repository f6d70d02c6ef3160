pub mod simulator;
pub mod stats;

pub use simulator::{
    BetSpec, CancellationFlag, MonteCarloResult, RiskSimulator, SimulationConfig, StakingMode,
};
