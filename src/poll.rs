//! Two-option stock polls: option drawing, vote tallying, winner log, routing winners to
//! the trade engine and the registry of running poll timers.

use anyhow::Context;
use chrono::Local;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task::AbortHandle;
use tracing::{info, warn};

use crate::error::MarketDataError;
use crate::ledger::LedgerStore;
use crate::quotes::QuoteProvider;
use crate::trade::{TradeEngine, TradeOutcome};
use crate::types::{Quantity, Side};
use crate::utils::ticker_from_label;

pub const EMOJI_ONE: &str = "1\u{fe0f}\u{20e3}";
pub const EMOJI_TWO: &str = "2\u{fe0f}\u{20e3}";

/// Attempts at drawing a second ticker different from the first.
const MAX_DRAWS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    pub side: Side,
    pub first: String,
    pub second: String,
}

impl PollOptions {
    pub fn title(&self) -> &'static str {
        match self.side {
            Side::Buy => "Next stock pick",
            Side::Sell => "Next stock to sell",
        }
    }

    pub fn body(&self) -> String {
        format!(
            "**{}**\n{}  {}\n\n{}  {}",
            self.title(),
            EMOJI_ONE,
            self.first,
            EMOJI_TWO,
            self.second
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    Winner(String),
    Tie,
}

impl PollResult {
    pub fn label(&self) -> &str {
        match self {
            PollResult::Winner(w) => w,
            PollResult::Tie => "Tie",
        }
    }
}

/// Raw reaction counts include the bot's own seed reaction, which is discounted.
pub fn tally(options: &PollOptions, raw_first: u64, raw_second: u64) -> PollResult {
    let first = raw_first.saturating_sub(1);
    let second = raw_second.saturating_sub(1);
    if first > second {
        PollResult::Winner(options.first.clone())
    } else if second > first {
        PollResult::Winner(options.second.clone())
    } else {
        PollResult::Tie
    }
}

/// `"AAPL (Apple Inc.)"`
pub fn option_label(ticker: &str, name: &str) -> String {
    if name.is_empty() || name.eq_ignore_ascii_case(ticker) {
        ticker.to_string()
    } else {
        format!("{ticker} ({name})")
    }
}

/// Two distinct random tickers from the universe, labelled with their names.
pub async fn draw_buy_options(quotes: &dyn QuoteProvider) -> Result<PollOptions, MarketDataError> {
    let first = quotes.random_symbol().await?;
    let mut second = quotes.random_symbol().await?;
    let mut draws = 1;
    while second == first {
        if draws >= MAX_DRAWS {
            return Err(MarketDataError::Provider {
                message: "stock universe needs at least two tickers".into(),
            });
        }
        second = quotes.random_symbol().await?;
        draws += 1;
    }
    let first = quotes.quote(&first).await?;
    let second = quotes.quote(&second).await?;
    Ok(PollOptions {
        side: Side::Buy,
        first: option_label(&first.ticker, &first.name),
        second: option_label(&second.ticker, &second.name),
    })
}

/// Two distinct held tickers, or `None` when fewer than two are held.
pub fn draw_sell_options(ledger: &LedgerStore) -> anyhow::Result<Option<PollOptions>> {
    use rand::seq::SliceRandom;

    let holdings = ledger.holdings().context("read holdings")?;
    let mut picks: Vec<_> = holdings
        .choose_multiple(&mut rand::thread_rng(), 2)
        .map(|h| option_label(&h.ticker, &h.name))
        .collect();
    if picks.len() < 2 {
        return Ok(None);
    }
    let second = picks.pop().unwrap_or_default();
    let first = picks.pop().unwrap_or_default();
    Ok(Some(PollOptions {
        side: Side::Sell,
        first,
        second,
    }))
}

/// Routes a poll winner into a fixed-size trade.
pub struct PollOutcomeAdapter {
    engine: Arc<TradeEngine>,
    shares: Decimal,
}

impl PollOutcomeAdapter {
    pub fn new(engine: Arc<TradeEngine>, shares: Decimal) -> Self {
        Self { engine, shares }
    }

    pub async fn route(&self, winning_label: &str, side: Side) -> TradeOutcome {
        let Some(ticker) = ticker_from_label(winning_label) else {
            return TradeOutcome::Rejected(crate::error::TradeError::InvalidArgument {
                side,
                ticker: String::new(),
                reason: format!("no ticker in poll label {winning_label:?}"),
            });
        };
        let qty = Quantity::Shares(self.shares);
        match side {
            Side::Buy => self.engine.buy(&ticker, qty).await,
            Side::Sell => self.engine.sell(&ticker, qty).await,
        }
    }
}

#[derive(Debug, Serialize)]
struct WinnerRow<'a> {
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Side")]
    side: Side,
    #[serde(rename = "Winner")]
    winner: &'a str,
}

/// Append-only CSV of finished polls.
pub struct WinnerLog {
    path: Option<PathBuf>,
}

impl WinnerLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Dry-run log that records nothing.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn record(&self, side: Side, result: &PollResult) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        wtr.serialize(WinnerRow {
            timestamp: Local::now()
                .format(crate::types::timestamp::FORMAT)
                .to_string(),
            side,
            winner: result.label(),
        })?;
        wtr.flush()?;
        Ok(())
    }
}

/// Poll countdown tasks keyed by poll message id.
#[derive(Default)]
pub struct PollRegistry {
    tasks: Mutex<HashMap<u64, AbortHandle>>,
}

impl PollRegistry {
    /// Spawns `task` for `poll_id`. The task body only starts once its handle is
    /// registered, so a `finish` from inside it always finds the entry.
    pub fn spawn<F>(&self, poll_id: u64, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (registered, ready) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            if ready.await.is_ok() {
                task.await;
            }
        });
        self.insert(poll_id, handle.abort_handle());
        let _ = registered.send(());
    }

    pub fn insert(&self, poll_id: u64, handle: AbortHandle) {
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(old) = tasks.insert(poll_id, handle) {
                old.abort();
            }
        }
    }

    /// Called by the poll task itself once it has finished.
    pub fn finish(&self, poll_id: u64) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.remove(&poll_id);
        }
    }

    pub fn cancel(&self, poll_id: u64) -> bool {
        let handle = self.tasks.lock().ok().and_then(|mut t| t.remove(&poll_id));
        match handle {
            Some(h) => {
                h.abort();
                info!("Poll {} cancelled", poll_id);
                true
            }
            None => false,
        }
    }

    /// Shutdown: running polls are abandoned.
    pub fn abort_all(&self) {
        let Ok(mut tasks) = self.tasks.lock() else {
            return;
        };
        if !tasks.is_empty() {
            warn!("Abandoning {} running poll(s)", tasks.len());
        }
        for (_, h) in tasks.drain() {
            h.abort();
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }
}
