//! Error taxonomy for the ledger, market data and trade paths.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::Side;
use crate::utils::money;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger file is malformed: {0}")]
    Csv(#[from] csv::Error),

    #[error("could not replace ledger file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Anything that stops a quote or universe lookup. All variants are "market data unavailable".
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("no price data for {0}")]
    NoData(String),

    #[error("market data provider error: {message}")]
    Provider { message: String },

    #[error("stock universe is empty")]
    EmptyUniverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    MarketDataUnavailable,
    InsufficientFunds,
    InsufficientShares,
    Storage,
}

/// Why a trade did not execute. `Display` is the message relayed to chat.
#[derive(Error, Debug)]
pub enum TradeError {
    #[error("Invalid {side} request for {ticker}: {reason}")]
    InvalidArgument {
        side: Side,
        ticker: String,
        reason: String,
    },

    #[error("Failed to {} {ticker}: {source}", verb(.side))]
    MarketDataUnavailable {
        side: Side,
        ticker: String,
        #[source]
        source: MarketDataError,
    },

    #[error(
        "Insufficient funds to buy {name} ({ticker}). Need {} but only have {}",
        usd(.cost),
        usd(.balance)
    )]
    InsufficientFunds {
        ticker: String,
        name: String,
        cost: Decimal,
        balance: Decimal,
    },

    #[error("You don't own any shares of {ticker}")]
    NoPosition { ticker: String },

    #[error(
        "You only have {} shares of {name}, cannot sell {}",
        shares(.owned),
        shares(.requested)
    )]
    InsufficientShares {
        ticker: String,
        name: String,
        owned: Decimal,
        requested: Decimal,
    },

    #[error("Failed to {} {ticker}: {source}", verb(.side))]
    Storage {
        side: Side,
        ticker: String,
        #[source]
        source: LedgerError,
    },
}

fn usd(d: &Decimal) -> String {
    money(*d)
}

fn shares(d: &Decimal) -> String {
    crate::utils::shares(*d)
}

fn verb(side: &Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

impl TradeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TradeError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            TradeError::MarketDataUnavailable { .. } => ErrorKind::MarketDataUnavailable,
            TradeError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            TradeError::NoPosition { .. } | TradeError::InsufficientShares { .. } => {
                ErrorKind::InsufficientShares
            }
            TradeError::Storage { .. } => ErrorKind::Storage,
        }
    }
}
