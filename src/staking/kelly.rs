/// Kelly Criterion betting size calculator for decimal odds.
///
/// The Kelly formula sizes a bet to maximise the expected logarithm of wealth,
/// which balances risk and reward optimally over the long run.
///
/// Standard formula:
///   f* = (b·p − q) / b
/// where
///   b  = net odds received on the bet (decimal odds − 1)
///   p  = estimated probability of winning
///   q  = 1 − p  (probability of losing)
///
/// Callers apply a *fractional* Kelly multiplier to reduce variance at the
/// cost of slightly lower expected growth.

/// Market-implied probability of decimal odds (1 / odds).
pub fn implied_probability(decimal_odds: f64) -> f64 {
    if decimal_odds <= 0.0 {
        return 0.0;
    }
    1.0 / decimal_odds
}

/// Full Kelly fraction, clamped to [0, 1].
///
/// Returns `0.0` when expected value is non-positive (i.e. no edge) or the
/// odds cannot pay out.
pub fn full_kelly(win_prob: f64, decimal_odds: f64) -> f64 {
    debug_assert!((0.0..=1.0).contains(&win_prob), "win_prob out of range");

    let b = decimal_odds - 1.0;
    if b <= 0.0 || !b.is_finite() {
        return 0.0;
    }
    let p = win_prob;
    let q = 1.0 - p;

    let f = (b * p - q) / b;

    if f <= 0.0 {
        return 0.0; // no edge
    }
    f.min(1.0)
}

/// Fraction of bankroll to stake under fractional Kelly.
///
/// # Arguments
/// * `win_prob`       – Estimated probability that the bet wins (0.0–1.0).
/// * `decimal_odds`   – Decimal odds offered (> 1.0).
/// * `kelly_fraction` – Fractional Kelly multiplier (0.0–1.0).
pub fn kelly_stake(win_prob: f64, decimal_odds: f64, kelly_fraction: f64) -> f64 {
    debug_assert!(
        (0.0..=1.0).contains(&kelly_fraction),
        "kelly_fraction out of range"
    );
    (full_kelly(win_prob, decimal_odds) * kelly_fraction).clamp(0.0, 1.0)
}

/// Edge of a bet: model probability minus market-implied probability.
///
/// Positive edge means the market is underpricing the outcome.
pub fn edge(win_prob: f64, decimal_odds: f64) -> f64 {
    win_prob - implied_probability(decimal_odds)
}

/// Expected profit of staking `stake` at `decimal_odds`: stake·(odds·p − 1).
pub fn expected_value(stake: f64, decimal_odds: f64, win_prob: f64) -> f64 {
    stake * (decimal_odds * win_prob - 1.0)
}
