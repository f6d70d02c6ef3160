pub mod aggregator;
pub mod clv;

pub use aggregator::{
    aggregate_odds, AggregatedOdds, AggregatorConfig, BestPrice, Liquidity, OddsAggregator,
};
pub use clv::{compute_clv, summarize_clv, ClvMetrics, ClvSummary, ClvTier};
