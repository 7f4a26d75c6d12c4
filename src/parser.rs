//! Parse bot commands from chat messages.
//! Supported: bottest, poll, sellpoll, cancelpoll, buy, sell, balance, portfolio, history.

use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::types::{Quantity, Side};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    BotTest,
    Poll(Side),
    CancelPoll(u64),
    Trade {
        side: Side,
        ticker: String,
        quantity: Quantity,
    },
    Balance,
    Portfolio,
    History,
}

fn trade_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "buy AAPL", "buy AAPL 3", "buy AAPL 2.5", "buy AAPL $500", "sell AAPL all"
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(buy|sell)\s+([A-Z][A-Z0-9.\-]{0,9})(?:\s+(\$\s*[\d.]+|[\d.]+|all))?$")
            .expect("static regex")
    })
}

fn cancel_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^cancelpoll\s+(\d+)$").expect("static regex"))
}

/// `None` if the text lacks the prefix or is not a recognized command.
pub fn parse_command(text: &str, prefix: &str) -> Option<Command> {
    let body = text.trim().strip_prefix(prefix)?.trim();
    let body = collapse_ws(body);

    match body.to_ascii_lowercase().as_str() {
        "bottest" => return Some(Command::BotTest),
        "poll" => return Some(Command::Poll(Side::Buy)),
        "sellpoll" => return Some(Command::Poll(Side::Sell)),
        "balance" => return Some(Command::Balance),
        "portfolio" => return Some(Command::Portfolio),
        "history" => return Some(Command::History),
        _ => {}
    }

    if let Some(c) = cancel_re().captures(&body) {
        return Some(Command::CancelPoll(c[1].parse().ok()?));
    }

    let c = trade_re().captures(&body)?;
    let side = if c[1].eq_ignore_ascii_case("buy") {
        Side::Buy
    } else {
        Side::Sell
    };
    let ticker = c[2].to_uppercase();
    let quantity = match c.get(3).map(|m| m.as_str()) {
        None => Quantity::Shares(Decimal::ONE),
        Some(q) if q.eq_ignore_ascii_case("all") => Quantity::All,
        Some(q) => match q.strip_prefix('$') {
            Some(amount) => Quantity::Amount(Decimal::from_str(amount.trim()).ok()?),
            None => Quantity::Shares(Decimal::from_str(q).ok()?),
        },
    };
    Some(Command::Trade {
        side,
        ticker,
        quantity,
    })
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
