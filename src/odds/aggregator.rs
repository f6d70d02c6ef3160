use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::db::models::{MarketOdds, OddsQuote, Outcome};
use crate::error::{EngineError, Result};

/// How many independent, closely-agreeing sources back a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liquidity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestPrice {
    pub odds: f64,
    pub source: String,
}

/// `(max − min) / max` across sources, per outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeSpread {
    pub home: Option<f64>,
    pub draw: Option<f64>,
    pub away: Option<f64>,
}

impl OutcomeSpread {
    pub fn get(&self, outcome: Outcome) -> Option<f64> {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    fn set(&mut self, outcome: Outcome, value: f64) {
        match outcome {
            Outcome::Home => self.home = Some(value),
            Outcome::Draw => self.draw = Some(value),
            Outcome::Away => self.away = Some(value),
        }
    }

    /// Widest spread over the offered outcomes
    pub fn max(&self) -> f64 {
        [self.home, self.draw, self.away]
            .into_iter()
            .flatten()
            .fold(0.0, f64::max)
    }
}

/// Margin-free probabilities implied by the best prices
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FairProbabilities {
    pub home: f64,
    pub draw: Option<f64>,
    pub away: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedOdds {
    pub best_home: Option<BestPrice>,
    pub best_draw: Option<BestPrice>,
    pub best_away: Option<BestPrice>,
    pub spread: OutcomeSpread,
    pub liquidity: Liquidity,
    /// Distinct sources with at least one valid price
    pub contributing_sources: usize,
    /// Sum of implied probabilities of the best prices minus 1; negative
    /// means the best prices form an arbitrage
    pub overround: Option<f64>,
    pub fair_probabilities: Option<FairProbabilities>,
    /// The raw quotes, as supplied
    pub sources: Vec<OddsQuote>,
}

impl AggregatedOdds {
    pub fn best(&self, outcome: Outcome) -> Option<&BestPrice> {
        match outcome {
            Outcome::Home => self.best_home.as_ref(),
            Outcome::Draw => self.best_draw.as_ref(),
            Outcome::Away => self.best_away.as_ref(),
        }
    }

    /// Best prices in the shape the stake optimizer consumes. Requires both
    /// home and away prices.
    pub fn market_odds(&self) -> Option<MarketOdds> {
        Some(MarketOdds::new(
            self.best_home.as_ref()?.odds,
            self.best_draw.as_ref().map(|b| b.odds),
            self.best_away.as_ref()?.odds,
        ))
    }
}

/// Liquidity classification policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub high_liquidity_min_sources: usize,
    /// Widest spread still considered "closely agreeing"
    pub high_liquidity_max_spread: f64,
    pub medium_liquidity_min_sources: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            high_liquidity_min_sources: 3,
            high_liquidity_max_spread: 0.05,
            medium_liquidity_min_sources: 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OddsAggregator {
    config: AggregatorConfig,
}

/// Aggregate with the default liquidity policy.
pub fn aggregate_odds(quotes: &[OddsQuote]) -> Result<AggregatedOdds> {
    OddsAggregator::default().aggregate(quotes)
}

fn valid_price(price: f64) -> bool {
    price.is_finite() && price > 1.0
}

impl OddsAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        OddsAggregator { config }
    }

    /// Merge quotes for one matchup into best price per outcome.
    pub fn aggregate(&self, quotes: &[OddsQuote]) -> Result<AggregatedOdds> {
        let mut contributing: HashSet<&str> = HashSet::new();
        let mut best: [Option<BestPrice>; 3] = [None, None, None];
        let mut min_price: [Option<f64>; 3] = [None, None, None];

        for quote in quotes {
            for (slot, outcome) in Outcome::ALL.iter().enumerate() {
                let Some(price) = quote.price(*outcome) else {
                    continue;
                };
                if !valid_price(price) {
                    warn!(
                        "Dropping invalid {} price {} from {}",
                        outcome, price, quote.source_name
                    );
                    continue;
                }
                contributing.insert(quote.source_name.as_str());

                if best[slot].as_ref().map_or(true, |b| price > b.odds) {
                    best[slot] = Some(BestPrice {
                        odds: price,
                        source: quote.source_name.clone(),
                    });
                }
                if min_price[slot].map_or(true, |m| price < m) {
                    min_price[slot] = Some(price);
                }
            }
        }

        if contributing.is_empty() {
            return Err(EngineError::NoOddsAvailable(format!(
                "none of {} quote(s) carried a valid price",
                quotes.len()
            )));
        }

        let mut spread = OutcomeSpread::default();
        for (slot, outcome) in Outcome::ALL.iter().enumerate() {
            if let (Some(b), Some(min)) = (&best[slot], min_price[slot]) {
                spread.set(*outcome, (b.odds - min) / b.odds);
            }
        }

        let contributing_sources = contributing.len();
        let liquidity = self.classify_liquidity(contributing_sources, spread.max());

        let [best_home, best_draw, best_away] = best;
        let (overround, fair_probabilities) = match (&best_home, &best_away) {
            (Some(h), Some(a)) => {
                let ih = 1.0 / h.odds;
                let ia = 1.0 / a.odds;
                let id = best_draw.as_ref().map(|d| 1.0 / d.odds);
                let book = ih + ia + id.unwrap_or(0.0);
                (
                    Some(book - 1.0),
                    Some(FairProbabilities {
                        home: ih / book,
                        draw: id.map(|d| d / book),
                        away: ia / book,
                    }),
                )
            }
            _ => (None, None),
        };

        debug!(
            "Aggregated {} source(s): liquidity={:?}, max spread={:.4}",
            contributing_sources,
            liquidity,
            spread.max()
        );

        Ok(AggregatedOdds {
            best_home,
            best_draw,
            best_away,
            spread,
            liquidity,
            contributing_sources,
            overround,
            fair_probabilities,
            sources: quotes.to_vec(),
        })
    }

    fn classify_liquidity(&self, sources: usize, max_spread: f64) -> Liquidity {
        if sources >= self.config.high_liquidity_min_sources
            && max_spread < self.config.high_liquidity_max_spread
        {
            Liquidity::High
        } else if sources >= self.config.medium_liquidity_min_sources {
            Liquidity::Medium
        } else {
            Liquidity::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Utc;

    fn quote(name: &str, home: f64, draw: f64, away: f64) -> OddsQuote {
        OddsQuote {
            source_name: name.into(),
            home: Some(home),
            draw: Some(draw),
            away: Some(away),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn best_prices_from_two_sources() {
        let quotes = vec![quote("A", 2.0, 2.0, 2.0), quote("B", 2.2, 3.0, 2.9)];
        let agg = aggregate_odds(&quotes).unwrap();

        let home = agg.best_home.as_ref().unwrap();
        assert_relative_eq!(home.odds, 2.2);
        assert_eq!(home.source, "B");
        let draw = agg.best_draw.as_ref().unwrap();
        assert_relative_eq!(draw.odds, 3.0);
        assert_eq!(draw.source, "B");
        let away = agg.best_away.as_ref().unwrap();
        assert_relative_eq!(away.odds, 2.9);
        assert_eq!(away.source, "B");

        assert_eq!(agg.contributing_sources, 2);
        assert_eq!(agg.liquidity, Liquidity::Medium);
        assert_relative_eq!(agg.spread.home.unwrap(), 0.2 / 2.2, epsilon = 1e-12);
        assert_relative_eq!(agg.spread.draw.unwrap(), 1.0 / 3.0, epsilon = 1e-12);
        assert_eq!(agg.sources.len(), 2);
    }

    #[test]
    fn tight_three_source_market_is_high_liquidity() {
        let quotes = vec![
            quote("A", 2.00, 3.40, 3.90),
            quote("B", 2.05, 3.45, 3.95),
            quote("C", 2.02, 3.50, 4.00),
        ];
        let agg = aggregate_odds(&quotes).unwrap();
        assert_eq!(agg.liquidity, Liquidity::High);
    }

    #[test]
    fn wide_three_source_market_is_medium() {
        let quotes = vec![
            quote("A", 2.0, 3.4, 3.9),
            quote("B", 2.6, 3.4, 3.9),
            quote("C", 2.1, 3.4, 3.9),
        ];
        assert_eq!(aggregate_odds(&quotes).unwrap().liquidity, Liquidity::Medium);
    }

    #[test]
    fn single_source_is_low_with_zero_spread() {
        let agg = aggregate_odds(&[quote("A", 1.9, 3.6, 4.2)]).unwrap();
        assert_eq!(agg.liquidity, Liquidity::Low);
        assert_relative_eq!(agg.spread.max(), 0.0);
    }

    #[test]
    fn invalid_prices_are_dropped() {
        let bad = quote("Broken", 0.9, f64::NAN, 50.0);
        let quotes = vec![bad, quote("A", 2.1, 3.3, 3.5)];
        let agg = aggregate_odds(&quotes).unwrap();
        assert_eq!(agg.best_home.unwrap().source, "A");
        assert_eq!(agg.best_draw.unwrap().source, "A");
        // the broken source still contributes its valid away price
        assert_eq!(agg.best_away.unwrap().source, "Broken");
        assert_eq!(agg.contributing_sources, 2);
    }

    #[test]
    fn no_valid_quotes_is_an_error() {
        let mut q = quote("A", 1.0, 0.5, -2.0);
        q.draw = None;
        assert!(matches!(
            aggregate_odds(&[q]),
            Err(EngineError::NoOddsAvailable(_))
        ));
        assert!(matches!(
            aggregate_odds(&[]),
            Err(EngineError::NoOddsAvailable(_))
        ));
    }

    #[test]
    fn missing_market_is_absent_not_zero() {
        let mut q = quote("A", 1.8, 3.0, 2.1);
        q.draw = None;
        let agg = aggregate_odds(&[q]).unwrap();
        assert!(agg.best_draw.is_none());
        assert!(agg.spread.draw.is_none());
        let odds = agg.market_odds().unwrap();
        assert_eq!(odds.draw, None);
        let fair = agg.fair_probabilities.unwrap();
        assert_relative_eq!(fair.home + fair.away, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn overround_and_fair_probabilities() {
        let agg = aggregate_odds(&[quote("A", 2.0, 4.0, 4.0)]).unwrap();
        // 0.5 + 0.25 + 0.25 = 1.0 → no margin
        assert_relative_eq!(agg.overround.unwrap(), 0.0, epsilon = 1e-12);
        let fair = agg.fair_probabilities.unwrap();
        assert_relative_eq!(fair.home, 0.5, epsilon = 1e-12);
        assert_relative_eq!(fair.draw.unwrap(), 0.25, epsilon = 1e-12);
    }
}
