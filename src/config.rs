//! Load and validate runtime configuration.

use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordCfg {
    /// Channels the bot listens in; empty means every channel it can see.
    #[serde(default)]
    pub channel_ids: Vec<String>,
    #[serde(default = "default_prefix")]
    pub command_prefix: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackendKind {
    Csv,
    /// Dry run: nothing is written to disk.
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerCfg {
    #[serde(default = "default_balance_path")]
    pub balance_path: String,
    #[serde(default = "default_lots_path")]
    pub lots_path: String,
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,
    #[serde(default = "default_backend")]
    pub backend: LedgerBackendKind,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketCfg {
    #[serde(default = "default_universe")]
    pub universe: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollCfg {
    #[serde(default = "default_duration")]
    pub duration_sec: u64,
    #[serde(default = "default_winners_path")]
    pub winners_path: String,
    /// Route poll winners to the trade engine.
    #[serde(default)]
    pub auto_trade: bool,
    #[serde(default = "default_poll_shares")]
    pub shares: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub discord: DiscordCfg,
    #[serde(default)]
    pub ledger: LedgerCfg,
    #[serde(default)]
    pub market: MarketCfg,
    #[serde(default)]
    pub poll: PollCfg,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_yaml(&s)
    }

    pub fn from_yaml(s: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_yaml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.ledger.initial_balance <= Decimal::ZERO {
            anyhow::bail!("ledger.initial_balance must be positive");
        }
        if self.poll.shares <= Decimal::ZERO {
            anyhow::bail!("poll.shares must be positive");
        }
        if self.poll.duration_sec == 0 {
            anyhow::bail!("poll.duration_sec must be at least 1");
        }
        if self.discord.command_prefix.trim().is_empty() {
            anyhow::bail!("discord.command_prefix must not be empty");
        }
        Ok(())
    }

    /// `$STOCKPICK_CONFIG`, else `./config.yaml`, else the per-user config dir.
    pub fn locate() -> PathBuf {
        if let Ok(p) = std::env::var("STOCKPICK_CONFIG") {
            return PathBuf::from(p);
        }
        let local = PathBuf::from("config.yaml");
        if local.exists() {
            return local;
        }
        directories::ProjectDirs::from("", "", "stockpick-bot")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
            .filter(|p| p.exists())
            .unwrap_or(local)
    }
}

impl Default for LedgerCfg {
    fn default() -> Self {
        Self {
            balance_path: default_balance_path(),
            lots_path: default_lots_path(),
            initial_balance: default_initial_balance(),
            backend: default_backend(),
        }
    }
}

impl Default for MarketCfg {
    fn default() -> Self {
        Self {
            universe: default_universe(),
        }
    }
}

impl Default for PollCfg {
    fn default() -> Self {
        Self {
            duration_sec: default_duration(),
            winners_path: default_winners_path(),
            auto_trade: false,
            shares: default_poll_shares(),
        }
    }
}

fn default_prefix() -> String {
    "!".into()
}
fn default_balance_path() -> String {
    "balance.csv".into()
}
fn default_lots_path() -> String {
    "portfolio.csv".into()
}
fn default_initial_balance() -> Decimal {
    Decimal::from(50_000)
}
fn default_backend() -> LedgerBackendKind {
    LedgerBackendKind::Csv
}
fn default_duration() -> u64 {
    30
}
fn default_winners_path() -> String {
    "log.csv".into()
}
fn default_poll_shares() -> Decimal {
    Decimal::ONE
}

fn default_universe() -> Vec<String> {
    [
        "AAPL", "ABNB", "ADBE", "ADI", "ADP", "ADSK", "AEP", "AMAT", "AMD", "AMGN", "AMZN",
        "ANSS", "APP", "ARM", "ASML", "AVGO", "AXON", "AZN", "BIIB", "BKNG", "BKR", "CCEP",
        "CDNS", "CDW", "CEG", "CHTR", "CMCSA", "COST", "CPRT", "CRWD", "CSCO", "CSGP", "CSX",
        "CTAS", "CTSH", "DASH", "DDOG", "DXCM", "EA", "EXC", "FANG", "FAST", "FTNT", "GEHC",
        "GFS", "GILD", "GOOG", "GOOGL", "HON", "IDXX", "INTC", "INTU", "ISRG", "KDP", "KHC",
        "KLAC", "LIN", "LRCX", "LULU", "MAR", "MCHP", "MDLZ", "MELI", "META", "MNST", "MRVL",
        "MSFT", "MSTR", "MU", "NFLX", "NVDA", "NXPI", "ODFL", "ON", "ORLY", "PANW", "PAYX",
        "PCAR", "PDD", "PEP", "PLTR", "PYPL", "QCOM", "REGN", "ROP", "ROST", "SBUX", "SNPS",
        "TEAM", "TMUS", "TSLA", "TTD", "TTWO", "TXN", "VRSK", "VRTX", "WBD", "WDAY", "XEL",
        "ZS",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
