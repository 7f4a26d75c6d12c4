//! Paper trade execution against the ledger.
//!
//! Quotes are fetched before taking the ledger's write transaction. Inside it the
//! funds/holdings checks are repeated with that same price, then the ledger is mutated
//! as one unit.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ErrorKind, LedgerError, TradeError};
use crate::ledger::{consume_lots_lifo, LedgerStore};
use crate::quotes::QuoteProvider;
use crate::risk;
use crate::types::{Quantity, Quote, Side};
use crate::utils::{money, sanitize_symbol, shares};

/// A committed trade.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub side: Side,
    pub ticker: String,
    pub name: String,
    pub shares: Decimal,
    pub unit_price: Decimal,
    /// Cost for buys, proceeds for sells.
    pub value: Decimal,
    pub balance_after: Decimal,
}

impl Fill {
    pub fn message(&self) -> String {
        match self.side {
            Side::Buy => format!(
                "Bought {} shares of {} ({}) at {} each for {}. Remaining balance: {}",
                shares(self.shares),
                self.name,
                self.ticker,
                money(self.unit_price),
                money(self.value),
                money(self.balance_after)
            ),
            Side::Sell => format!(
                "Sold {} shares of {} ({}) at {} each for {}. New balance: {}",
                shares(self.shares),
                self.name,
                self.ticker,
                money(self.unit_price),
                money(self.value),
                money(self.balance_after)
            ),
        }
    }
}

/// What the chat layer gets back from a trade. Never an error that escapes.
#[derive(Debug)]
pub enum TradeOutcome {
    Executed(Fill),
    Rejected(TradeError),
}

impl TradeOutcome {
    pub fn success(&self) -> bool {
        matches!(self, TradeOutcome::Executed(_))
    }

    pub fn message(&self) -> String {
        match self {
            TradeOutcome::Executed(fill) => fill.message(),
            TradeOutcome::Rejected(e) => e.to_string(),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            TradeOutcome::Executed(_) => None,
            TradeOutcome::Rejected(e) => Some(e.kind()),
        }
    }

    pub fn into_pair(self) -> (bool, String) {
        (self.success(), self.message())
    }
}

impl From<Result<Fill, TradeError>> for TradeOutcome {
    fn from(r: Result<Fill, TradeError>) -> Self {
        match r {
            Ok(fill) => TradeOutcome::Executed(fill),
            Err(e) => TradeOutcome::Rejected(e),
        }
    }
}

pub struct TradeEngine {
    ledger: Arc<LedgerStore>,
    quotes: Arc<dyn QuoteProvider>,
}

impl TradeEngine {
    pub fn new(ledger: Arc<LedgerStore>, quotes: Arc<dyn QuoteProvider>) -> Self {
        Self { ledger, quotes }
    }

    pub async fn buy(&self, ticker: &str, qty: Quantity) -> TradeOutcome {
        let outcome: TradeOutcome = self.try_buy(ticker, qty).await.into();
        log_outcome(Side::Buy, ticker, &outcome);
        outcome
    }

    pub async fn sell(&self, ticker: &str, qty: Quantity) -> TradeOutcome {
        let outcome: TradeOutcome = self.try_sell(ticker, qty).await.into();
        log_outcome(Side::Sell, ticker, &outcome);
        outcome
    }

    async fn fetch_quote(&self, side: Side, ticker: &str) -> Result<Quote, TradeError> {
        self.quotes
            .quote(ticker)
            .await
            .map_err(|source| TradeError::MarketDataUnavailable {
                side,
                ticker: ticker.to_string(),
                source,
            })
    }

    async fn try_buy(&self, ticker: &str, qty: Quantity) -> Result<Fill, TradeError> {
        let ticker = sanitize_symbol(ticker);
        risk::validate_request(Side::Buy, &ticker, qty)?;
        let quote = self.fetch_quote(Side::Buy, &ticker).await?;
        let n = risk::buy_shares(&ticker, qty, quote.price)?;
        let cost = risk::notional(Side::Buy, &ticker, n, quote.price)?;
        let storage = |source: LedgerError| TradeError::Storage {
            side: Side::Buy,
            ticker: ticker.clone(),
            source,
        };

        let _txn = self.ledger.write_txn().await;
        let balance = self.ledger.get_balance().map_err(storage)?;
        risk::check_funds(&ticker, &quote.name, cost, balance)?;
        let balance_after = self
            .ledger
            .commit_buy(&ticker, &quote.name, n, quote.price)
            .map_err(storage)?;

        Ok(Fill {
            side: Side::Buy,
            ticker: ticker.clone(),
            name: quote.name,
            shares: n,
            unit_price: quote.price,
            value: cost,
            balance_after,
        })
    }

    async fn try_sell(&self, ticker: &str, qty: Quantity) -> Result<Fill, TradeError> {
        let ticker = sanitize_symbol(ticker);
        risk::validate_request(Side::Sell, &ticker, qty)?;
        let storage = |source: LedgerError| TradeError::Storage {
            side: Side::Sell,
            ticker: ticker.clone(),
            source,
        };

        // Cheap rejection before going to the network.
        let owned = owned_shares(&self.ledger, &ticker).map_err(storage)?;
        if owned <= Decimal::ZERO {
            return Err(TradeError::NoPosition {
                ticker: ticker.clone(),
            });
        }
        if let Quantity::Shares(n) = qty {
            risk::check_holding(&ticker, &ticker, n, owned)?;
        }

        let quote = self.fetch_quote(Side::Sell, &ticker).await?;

        let _txn = self.ledger.write_txn().await;
        let lots = self.ledger.list_lots(None).map_err(storage)?;
        let owned: Decimal = lots
            .iter()
            .filter(|l| l.ticker.eq_ignore_ascii_case(&ticker))
            .map(|l| l.shares)
            .sum();
        let n = risk::sell_shares(&ticker, qty, quote.price, owned)?;
        risk::check_holding(&ticker, &quote.name, n, owned)?;
        let remaining = consume_lots_lifo(&lots, &ticker, n).ok_or_else(|| {
            TradeError::InsufficientShares {
                ticker: ticker.clone(),
                name: quote.name.clone(),
                owned,
                requested: n,
            }
        })?;
        let proceeds = risk::notional(Side::Sell, &ticker, n, quote.price)?;
        let balance_after = self
            .ledger
            .commit_sell(&ticker, &remaining, proceeds)
            .map_err(storage)?;

        Ok(Fill {
            side: Side::Sell,
            ticker: ticker.clone(),
            name: quote.name,
            shares: n,
            unit_price: quote.price,
            value: proceeds,
            balance_after,
        })
    }
}

fn owned_shares(ledger: &LedgerStore, ticker: &str) -> Result<Decimal, LedgerError> {
    Ok(ledger.list_lots(Some(ticker))?.iter().map(|l| l.shares).sum())
}

fn log_outcome(side: Side, ticker: &str, outcome: &TradeOutcome) {
    match outcome {
        TradeOutcome::Executed(fill) => info!("{} executed: {}", side, fill.message()),
        TradeOutcome::Rejected(e) => warn!("{} {} rejected ({:?}): {}", side, ticker, e.kind(), e),
    }
}
