//! Core domain types for ledger records, holdings, quotes and portfolio snapshots.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("Buy"),
            Side::Sell => f.write_str("Sell"),
        }
    }
}

/// How much of a ticker to trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Shares(Decimal),
    /// Dollar amount; converted to whole shares at the fill price.
    Amount(Decimal),
    /// Entire position (sell only).
    All,
}

/// Label stored in the `Action` column of the balance ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BalanceAction {
    Deposit,
    Buy(String),
    Sell(String),
}

impl fmt::Display for BalanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceAction::Deposit => f.write_str("Initial deposit"),
            BalanceAction::Buy(t) => write!(f, "Buy {t}"),
            BalanceAction::Sell(t) => write!(f, "Sell {t}"),
        }
    }
}

impl FromStr for BalanceAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("Initial deposit") || s.eq_ignore_ascii_case("Deposit") {
            return Ok(BalanceAction::Deposit);
        }
        match s.split_once(' ') {
            Some(("Buy", t)) => Ok(BalanceAction::Buy(t.trim().to_string())),
            Some(("Sell", t)) => Ok(BalanceAction::Sell(t.trim().to_string())),
            _ => Err(format!("unknown balance action: {s:?}")),
        }
    }
}

impl TryFrom<String> for BalanceAction {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BalanceAction> for String {
    fn from(a: BalanceAction) -> Self {
        a.to_string()
    }
}

/// One row of the balance ledger. `balance` is the balance *after* the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    #[serde(rename = "Timestamp", with = "timestamp")]
    pub timestamp: NaiveDateTime,
    #[serde(rename = "Balance", with = "rust_decimal::serde::str")]
    pub balance: Decimal,
    #[serde(rename = "Action")]
    pub action: BalanceAction,
    /// Positive for buys (debit), negative for sells (credit).
    #[serde(rename = "Amount", with = "rust_decimal::serde::str")]
    pub amount: Decimal,
}

/// One purchase event. `shares` is always > 0 on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotRecord {
    #[serde(rename = "Timestamp", with = "timestamp")]
    pub timestamp: NaiveDateTime,
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Shares", with = "rust_decimal::serde::str")]
    pub shares: Decimal,
    #[serde(rename = "Price", with = "rust_decimal::serde::str")]
    pub unit_price: Decimal,
    #[serde(rename = "Total", with = "rust_decimal::serde::str")]
    pub total_cost: Decimal,
}

/// Aggregate of all lots for one ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub ticker: String,
    pub name: String,
    pub shares: Decimal,
    pub cost_basis: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub ticker: String,
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionValue {
    pub ticker: String,
    pub name: String,
    pub shares: Decimal,
    pub price: Decimal,
    pub value: Decimal,
}

/// Point-in-time valuation; never persisted. `total == cash + stock_value`.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSnapshot {
    pub cash: Decimal,
    pub stock_value: Decimal,
    pub total: Decimal,
    pub positions: Vec<PositionValue>,
    /// Tickers left out of `stock_value` because their quote failed.
    pub unpriced: Vec<String>,
}

/// `%Y-%m-%d %H:%M:%S`, the format both ledgers have always used.
pub mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(raw.trim(), FORMAT).map_err(serde::de::Error::custom)
    }
}
