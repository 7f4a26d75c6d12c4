//! Small helpers.

use rust_decimal::{Decimal, RoundingStrategy};

pub fn sanitize_symbol(sym: &str) -> String {
    sym.trim().to_uppercase()
}

/// `$1234.50`
pub fn money(d: Decimal) -> String {
    format!(
        "${:.2}",
        d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

/// Share counts without trailing zeros: `2`, `0.5`.
pub fn shares(d: Decimal) -> String {
    d.normalize().to_string()
}

/// First whitespace-delimited token of a poll label, e.g. `"AAPL (Apple Inc)"` -> `AAPL`.
pub fn ticker_from_label(label: &str) -> Option<String> {
    label
        .split_whitespace()
        .next()
        .map(sanitize_symbol)
        .filter(|t| !t.is_empty())
}
