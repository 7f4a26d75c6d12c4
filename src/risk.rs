//! Pre-trade checks: quantity resolution, funds and holdings.

use rust_decimal::Decimal;

use crate::error::TradeError;
use crate::types::{Quantity, Side};

/// Reject zero or negative requests before any I/O.
pub fn validate_request(side: Side, ticker: &str, qty: Quantity) -> Result<(), TradeError> {
    let invalid = |reason: String| TradeError::InvalidArgument {
        side,
        ticker: ticker.to_string(),
        reason,
    };
    if ticker.is_empty() {
        return Err(invalid("missing ticker".into()));
    }
    match qty {
        Quantity::Shares(n) if n <= Decimal::ZERO => {
            Err(invalid(format!("share count must be positive, got {n}")))
        }
        Quantity::Amount(a) if a <= Decimal::ZERO => {
            Err(invalid(format!("amount must be positive, got {a}")))
        }
        Quantity::All if side == Side::Buy => Err(invalid("cannot buy \"all\"".into())),
        _ => Ok(()),
    }
}

/// Whole shares affordable with `amount`; the fractional remainder is dropped.
/// `None` when the quotient does not fit in a `Decimal`.
pub fn whole_shares(amount: Decimal, price: Decimal) -> Option<Decimal> {
    if price <= Decimal::ZERO {
        return Some(Decimal::ZERO);
    }
    amount.checked_div(price).map(|q| q.floor())
}

/// `shares * price`, rejected instead of overflowing.
pub fn notional(
    side: Side,
    ticker: &str,
    shares: Decimal,
    price: Decimal,
) -> Result<Decimal, TradeError> {
    shares
        .checked_mul(price)
        .ok_or_else(|| TradeError::InvalidArgument {
            side,
            ticker: ticker.to_string(),
            reason: format!("{shares} shares at {price} is out of range"),
        })
}

/// Shares to buy for `qty` at `price`.
pub fn buy_shares(ticker: &str, qty: Quantity, price: Decimal) -> Result<Decimal, TradeError> {
    let n = match qty {
        Quantity::Shares(n) => n,
        Quantity::Amount(a) => whole_shares(a, price).ok_or_else(|| {
            TradeError::InvalidArgument {
                side: Side::Buy,
                ticker: ticker.to_string(),
                reason: format!("amount {a} is out of range"),
            }
        })?,
        Quantity::All => Decimal::ZERO,
    };
    if n <= Decimal::ZERO {
        return Err(TradeError::InvalidArgument {
            side: Side::Buy,
            ticker: ticker.to_string(),
            reason: format!("amount does not cover one share at {}", crate::utils::money(price)),
        });
    }
    Ok(n)
}

/// Shares to sell for `qty`. Dollar amounts clamp to the position instead of failing.
pub fn sell_shares(
    ticker: &str,
    qty: Quantity,
    price: Decimal,
    owned: Decimal,
) -> Result<Decimal, TradeError> {
    let n = match qty {
        Quantity::Shares(n) => n,
        // Too large to divide means more than any position.
        Quantity::Amount(a) => whole_shares(a, price).map_or(owned, |n| n.min(owned)),
        Quantity::All => owned,
    };
    if n <= Decimal::ZERO {
        return Err(TradeError::InvalidArgument {
            side: Side::Sell,
            ticker: ticker.to_string(),
            reason: format!("amount does not cover one share at {}", crate::utils::money(price)),
        });
    }
    Ok(n)
}

pub fn check_funds(
    ticker: &str,
    name: &str,
    cost: Decimal,
    balance: Decimal,
) -> Result<(), TradeError> {
    if cost > balance {
        return Err(TradeError::InsufficientFunds {
            ticker: ticker.to_string(),
            name: name.to_string(),
            cost,
            balance,
        });
    }
    Ok(())
}

pub fn check_holding(
    ticker: &str,
    name: &str,
    requested: Decimal,
    owned: Decimal,
) -> Result<(), TradeError> {
    if owned <= Decimal::ZERO {
        return Err(TradeError::NoPosition {
            ticker: ticker.to_string(),
        });
    }
    if requested > owned {
        return Err(TradeError::InsufficientShares {
            ticker: ticker.to_string(),
            name: name.to_string(),
            owned,
            requested,
        });
    }
    Ok(())
}
