//! Quote provider: current price and display name per ticker, plus random picks from the
//! configured stock universe.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};
use yahoo_finance_api as yahoo;

use crate::error::MarketDataError;
use crate::types::Quote;
use crate::utils::sanitize_symbol;

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn quote(&self, ticker: &str) -> Result<Quote, MarketDataError>;

    async fn random_symbol(&self) -> Result<String, MarketDataError>;
}

/// Yahoo Finance quotes: last daily close for price, search result for the name.
pub struct YahooQuotes {
    connector: yahoo::YahooConnector,
    universe: Vec<String>,
}

impl YahooQuotes {
    pub fn new(universe: Vec<String>) -> Result<Self, MarketDataError> {
        let connector = yahoo::YahooConnector::new().map_err(|e| MarketDataError::Provider {
            message: format!("failed to initialize Yahoo connector: {e}"),
        })?;
        let universe = universe.iter().map(|s| sanitize_symbol(s)).collect();
        Ok(Self { connector, universe })
    }

    async fn last_close(&self, symbol: &str) -> Result<Decimal, MarketDataError> {
        let response = self
            .connector
            .get_latest_quotes(symbol, "1d")
            .await
            .map_err(|e| {
                if matches!(e, yahoo::YahooError::NoQuotes | yahoo::YahooError::NoResult) {
                    MarketDataError::SymbolNotFound(symbol.to_string())
                } else {
                    MarketDataError::Provider {
                        message: e.to_string(),
                    }
                }
            })?;
        let last = response
            .last_quote()
            .map_err(|_| MarketDataError::NoData(symbol.to_string()))?;
        Decimal::from_f64(last.close)
            .filter(|p| *p > Decimal::ZERO)
            .map(|p| p.round_dp(4))
            .ok_or_else(|| MarketDataError::NoData(symbol.to_string()))
    }

    /// Long name if Yahoo knows one; the symbol otherwise. Never fails the quote.
    async fn display_name(&self, symbol: &str) -> String {
        match self.connector.search_ticker(symbol).await {
            Ok(found) => found
                .quotes
                .iter()
                .find(|q| q.symbol.eq_ignore_ascii_case(symbol))
                .map(|q| pick_name(&q.long_name, &q.short_name, symbol))
                .unwrap_or_else(|| symbol.to_string()),
            Err(e) => {
                warn!("Name lookup for {} failed: {}", symbol, e);
                symbol.to_string()
            }
        }
    }
}

fn pick_name(long_name: &str, short_name: &str, symbol: &str) -> String {
    let long_name = long_name.trim().replace("&amp;", "&");
    if !long_name.is_empty() {
        return long_name;
    }
    let short_name = short_name.trim();
    if short_name.is_empty() {
        symbol.to_string()
    } else {
        short_name.to_string()
    }
}

#[async_trait]
impl QuoteProvider for YahooQuotes {
    async fn quote(&self, ticker: &str) -> Result<Quote, MarketDataError> {
        let symbol = sanitize_symbol(ticker);
        let price = self.last_close(&symbol).await?;
        let name = self.display_name(&symbol).await;
        debug!("Quote {} ({}) = {}", symbol, name, price);
        Ok(Quote {
            ticker: symbol,
            name,
            price,
        })
    }

    async fn random_symbol(&self) -> Result<String, MarketDataError> {
        pick_random(&self.universe)
    }
}

pub fn pick_random(universe: &[String]) -> Result<String, MarketDataError> {
    universe
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or(MarketDataError::EmptyUniverse)
}

/// Fixed-price provider for tests. Prices can be changed or removed between calls.
#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct StaticQuotes {
        prices: Mutex<HashMap<String, (String, Decimal)>>,
    }

    impl StaticQuotes {
        pub fn with(entries: &[(&str, &str, Decimal)]) -> Self {
            let me = Self::default();
            for (t, n, p) in entries {
                me.set(t, n, *p);
            }
            me
        }

        pub fn set(&self, ticker: &str, name: &str, price: Decimal) {
            self.prices
                .lock()
                .unwrap()
                .insert(ticker.to_string(), (name.to_string(), price));
        }

        pub fn remove(&self, ticker: &str) {
            self.prices.lock().unwrap().remove(ticker);
        }
    }

    #[async_trait]
    impl QuoteProvider for StaticQuotes {
        async fn quote(&self, ticker: &str) -> Result<Quote, MarketDataError> {
            let symbol = sanitize_symbol(ticker);
            let prices = self.prices.lock().unwrap();
            let (name, price) = prices
                .get(&symbol)
                .cloned()
                .ok_or_else(|| MarketDataError::SymbolNotFound(symbol.clone()))?;
            Ok(Quote {
                ticker: symbol,
                name,
                price,
            })
        }

        async fn random_symbol(&self) -> Result<String, MarketDataError> {
            let mut keys: Vec<String> = self.prices.lock().unwrap().keys().cloned().collect();
            keys.sort();
            pick_random(&keys)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_prefers_long_then_short_then_symbol() {
        assert_eq!(pick_name("Apple Inc.", "Apple", "AAPL"), "Apple Inc.");
        assert_eq!(pick_name("  ", "Apple", "AAPL"), "Apple");
        assert_eq!(pick_name("", "", "AAPL"), "AAPL");
        assert_eq!(pick_name("AT&amp;T Inc.", "", "T"), "AT&T Inc.");
    }

    #[test]
    fn random_pick_from_universe() {
        let universe = vec!["AAPL".to_string(), "MSFT".to_string()];
        for _ in 0..10 {
            assert!(universe.contains(&pick_random(&universe).unwrap()));
        }
        assert!(matches!(pick_random(&[]), Err(MarketDataError::EmptyUniverse)));
    }
}
