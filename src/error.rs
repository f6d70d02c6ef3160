use thiserror::Error;

/// Errors raised by the wagering core.
///
/// Warm-up conditions (too few samples for drift detection) are not errors;
/// they are reported as a normal result state on the returned report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Malformed input rejected before any computation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The aggregator received no quote with a usable price.
    #[error("No odds available: {0}")]
    NoOddsAvailable(String),

    /// The persistence adapter failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidInput(msg.into())
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Storage(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Reject a bankroll that is not a finite positive amount.
pub fn validate_bankroll(bankroll: f64) -> Result<()> {
    if !bankroll.is_finite() || bankroll <= 0.0 {
        return Err(EngineError::invalid(format!(
            "Bankroll must be positive, got {}",
            bankroll
        )));
    }
    Ok(())
}

/// Reject decimal odds that cannot pay out more than the stake.
pub fn validate_odds(odds: f64) -> Result<()> {
    if !odds.is_finite() || odds <= 1.0 {
        return Err(EngineError::invalid(format!(
            "Decimal odds must be greater than 1, got {}",
            odds
        )));
    }
    Ok(())
}

pub fn validate_probability(prob: f64) -> Result<()> {
    if !prob.is_finite() || !(0.0..=1.0).contains(&prob) {
        return Err(EngineError::invalid(format!(
            "Probability must be between 0 and 1, got {}",
            prob
        )));
    }
    Ok(())
}
