//! Entry point. Wires Discord -> Parser -> Trade engine / Polls -> Ledger.

mod config;
mod discord;
mod error;
mod ledger;
mod parser;
mod poll;
mod quotes;
mod risk;
mod trade;
mod types;
mod utils;
mod valuation;

use anyhow::Context;
use dotenvy::dotenv;
use serenity_self::all::{ChannelId, Http, Message, MessageId, ReactionType};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, LedgerBackendKind};
use crate::discord::Inbound;
use crate::ledger::{CsvBackend, LedgerStore};
use crate::parser::Command;
use crate::poll::{PollOptions, PollOutcomeAdapter, PollRegistry, PollResult, WinnerLog};
use crate::quotes::{QuoteProvider, YahooQuotes};
use crate::trade::TradeEngine;
use crate::types::{PortfolioSnapshot, Side};
use crate::utils::{money, shares};
use crate::valuation::Valuation;

/// Balance records shown by `history`.
const HISTORY_LEN: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    // Load config
    let cfg_path = AppConfig::locate();
    let cfg = AppConfig::load(&cfg_path)?;
    let discord_token = std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN not set")?;

    // Ledger (initialized on first start) & quotes
    let ledger = Arc::new(match cfg.ledger.backend {
        LedgerBackendKind::Csv => LedgerStore::new(
            Box::new(CsvBackend::new(
                &cfg.ledger.balance_path,
                &cfg.ledger.lots_path,
            )),
            cfg.ledger.initial_balance,
        ),
        LedgerBackendKind::Memory => LedgerStore::in_memory(cfg.ledger.initial_balance),
    });
    let balance = ledger.get_balance().context("open ledger")?;
    let quotes: Arc<dyn QuoteProvider> =
        Arc::new(YahooQuotes::new(cfg.market.universe.clone())?);

    let engine = Arc::new(TradeEngine::new(Arc::clone(&ledger), Arc::clone(&quotes)));
    let winners = match cfg.ledger.backend {
        LedgerBackendKind::Csv => WinnerLog::new(&cfg.poll.winners_path),
        LedgerBackendKind::Memory => WinnerLog::disabled(),
    };
    let app = Arc::new(App {
        valuation: Valuation::new(Arc::clone(&ledger), Arc::clone(&quotes)),
        adapter: PollOutcomeAdapter::new(Arc::clone(&engine), cfg.poll.shares),
        polls: PollRegistry::default(),
        winners,
        ledger,
        quotes,
        engine,
        cfg: cfg.clone(),
    });

    info!(
        "Bot started. Config={}, Ledger={:?}, Balance={}, PollDuration={}s, AutoTrade={}",
        cfg_path.display(),
        cfg.ledger.backend,
        money(balance),
        cfg.poll.duration_sec,
        cfg.poll.auto_trade
    );

    // Discord -> internal MPSC
    let (tx, mut rx) = tokio::sync::mpsc::channel::<Inbound>(1024);
    let discord_handle = tokio::spawn({
        let token = discord_token.clone();
        let dcfg = cfg.discord.clone();
        async move {
            if let Err(e) = discord::run(&token, dcfg.channel_ids, dcfg.command_prefix, tx).await
            {
                error!("Discord run error: {:#}", e);
            }
        }
    });

    loop {
        tokio::select! {
            maybe = rx.recv() => {
                let Some(inbound) = maybe else { break; };
                info!("Command from {}: {:?}", inbound.author, inbound.command);
                let app = Arc::clone(&app);
                tokio::spawn(async move { app.handle(inbound).await });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    app.polls.abort_all();
    discord_handle.abort();
    Ok(())
}

struct App {
    cfg: AppConfig,
    ledger: Arc<LedgerStore>,
    quotes: Arc<dyn QuoteProvider>,
    engine: Arc<TradeEngine>,
    valuation: Valuation,
    adapter: PollOutcomeAdapter,
    polls: PollRegistry,
    winners: WinnerLog,
}

impl App {
    async fn handle(self: Arc<Self>, inbound: Inbound) {
        let Inbound {
            http,
            channel_id,
            command,
            ..
        } = inbound;
        match command {
            Command::BotTest => say(&http, channel_id, "bot functional: tests passed").await,
            Command::Poll(side) => self.start_poll(http, channel_id, side).await,
            Command::CancelPoll(id) => {
                let text = if self.polls.cancel(id) {
                    format!("Poll {id} cancelled")
                } else {
                    format!("No running poll with id {id}")
                };
                say(&http, channel_id, text).await;
            }
            Command::Trade {
                side,
                ticker,
                quantity,
            } => {
                let outcome = match side {
                    Side::Buy => self.engine.buy(&ticker, quantity).await,
                    Side::Sell => self.engine.sell(&ticker, quantity).await,
                };
                let (_, text) = outcome.into_pair();
                say(&http, channel_id, text).await;
            }
            Command::Balance => {
                let text = match self.valuation.get_balance() {
                    Ok(b) => format!("Cash balance: {}", money(b)),
                    Err(e) => {
                        error!("balance read failed: {:#}", e);
                        "Could not read the ledger".to_string()
                    }
                };
                say(&http, channel_id, text).await;
            }
            Command::Portfolio => {
                let text = match self.valuation.get_portfolio_value().await {
                    Ok(snap) => render_portfolio(&snap),
                    Err(e) => {
                        error!("portfolio valuation failed: {:#}", e);
                        "Could not read the ledger".to_string()
                    }
                };
                say(&http, channel_id, text).await;
            }
            Command::History => {
                let text = match self.ledger.balance_history(HISTORY_LEN) {
                    Ok(rows) => rows
                        .iter()
                        .map(|r| {
                            format!(
                                "{}  {}  {}  -> {}",
                                r.timestamp.format(types::timestamp::FORMAT),
                                r.action,
                                money(r.amount),
                                money(r.balance)
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n"),
                    Err(e) => {
                        error!("history read failed: {:#}", e);
                        "Could not read the ledger".to_string()
                    }
                };
                say(&http, channel_id, format!("```\n{text}\n```")).await;
            }
        }
    }

    async fn start_poll(self: Arc<Self>, http: Arc<Http>, channel_id: ChannelId, side: Side) {
        let options = match side {
            Side::Buy => poll::draw_buy_options(self.quotes.as_ref())
                .await
                .map_err(anyhow::Error::from),
            Side::Sell => match poll::draw_sell_options(&self.ledger) {
                Ok(Some(o)) => Ok(o),
                Ok(None) => {
                    say(
                        &http,
                        channel_id,
                        "A sell poll needs at least two different holdings",
                    )
                    .await;
                    return;
                }
                Err(e) => Err(e),
            },
        };
        let options = match options {
            Ok(o) => o,
            Err(e) => {
                error!("poll setup failed: {:#}", e);
                say(&http, channel_id, format!("Could not start poll: {e}")).await;
                return;
            }
        };

        let posted = match channel_id.say(&*http, options.body()).await {
            Ok(m) => m,
            Err(e) => {
                error!("poll post failed: {:#}", e);
                return;
            }
        };
        for emoji in [poll::EMOJI_ONE, poll::EMOJI_TWO] {
            if let Err(e) = posted
                .react(&*http, ReactionType::Unicode(emoji.to_string()))
                .await
            {
                warn!("seed reaction {} failed: {:#}", emoji, e);
            }
        }

        let poll_id = posted.id.get();
        info!("Poll {} started: {} vs {}", poll_id, options.first, options.second);
        let app = Arc::clone(&self);
        self.polls.spawn(poll_id, async move {
            app.finish_poll(http, channel_id, poll_id, options).await;
        });
    }

    /// Waits out the voting window, then tallies, announces, logs and optionally trades.
    async fn finish_poll(
        &self,
        http: Arc<Http>,
        channel_id: ChannelId,
        poll_id: u64,
        options: PollOptions,
    ) {
        tokio::time::sleep(Duration::from_secs(self.cfg.poll.duration_sec)).await;
        self.polls.finish(poll_id);

        let message = match channel_id.message(&*http, MessageId::new(poll_id)).await {
            Ok(m) => m,
            Err(e) => {
                error!("poll {} fetch failed, poll dropped: {:#}", poll_id, e);
                return;
            }
        };
        let result = poll::tally(
            &options,
            reaction_count(&message, poll::EMOJI_ONE),
            reaction_count(&message, poll::EMOJI_TWO),
        );
        info!("Poll {} finished: {}", poll_id, result.label());

        let heading = match options.side {
            Side::Buy => "Stock pick winner",
            Side::Sell => "Stock to sell",
        };
        say(&http, channel_id, format!("{heading}:\n{}", result.label())).await;
        if let Err(e) = self.winners.record(options.side, &result) {
            error!("winner log write failed: {:#}", e);
        }

        if let PollResult::Winner(label) = &result {
            if self.cfg.poll.auto_trade {
                let outcome = self.adapter.route(label, options.side).await;
                say(&http, channel_id, outcome.message()).await;
            }
        }
    }
}

fn reaction_count(message: &Message, emoji: &str) -> u64 {
    message
        .reactions
        .iter()
        .find(|r| matches!(&r.reaction_type, ReactionType::Unicode(s) if s == emoji))
        .map(|r| r.count)
        .unwrap_or(0)
}

fn render_portfolio(snap: &PortfolioSnapshot) -> String {
    let mut out = format!(
        "Cash: {}\nStocks: {}\nTotal: {}",
        money(snap.cash),
        money(snap.stock_value),
        money(snap.total)
    );
    for p in &snap.positions {
        out.push_str(&format!(
            "\n- {} ({}): {} @ {} = {}",
            p.ticker,
            p.name,
            shares(p.shares),
            money(p.price),
            money(p.value)
        ));
    }
    if !snap.unpriced.is_empty() {
        out.push_str(&format!(
            "\nNo price available for: {}",
            snap.unpriced.join(", ")
        ));
    }
    out
}

async fn say(http: &Http, channel_id: ChannelId, text: impl Into<String>) {
    if let Err(e) = channel_id.say(http, text).await {
        error!("send to channel {} failed: {:#}", channel_id, e);
    }
}
