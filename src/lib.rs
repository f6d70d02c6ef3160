//! Wagering decision support: fractional-Kelly stake sizing guarded by model
//! disagreement, seeded Monte Carlo bankroll simulation, multi-source odds
//! aggregation with closing line value, and rolling-window drift monitoring
//! of the prediction model.

pub mod alerts;
pub mod api;
pub mod config;
pub mod db;
pub mod drift;
pub mod error;
pub mod odds;
pub mod risk;
pub mod staking;

pub use error::{EngineError, Result};
