//! Paper-trading ledger: cash balance records and share lots.
//!
//! Both sequences are append-oriented. The lot sequence is additionally rewritten as a
//! whole on sells; file rewrites go through a temp file and a rename so readers never see
//! a half-written ledger.

use chrono::{Local, NaiveDateTime, Timelike};
use rust_decimal::Decimal;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

use crate::error::LedgerError;
use crate::types::{BalanceAction, BalanceRecord, Holding, LotRecord};

pub const BALANCE_HEADERS: [&str; 4] = ["Timestamp", "Balance", "Action", "Amount"];
pub const LOT_HEADERS: [&str; 6] = ["Timestamp", "Ticker", "Name", "Shares", "Price", "Total"];

/// Durable storage for the two ledger sequences.
pub trait LedgerBackend: Send + Sync {
    fn load_balances(&self) -> Result<Vec<BalanceRecord>, LedgerError>;
    fn append_balance(&self, record: &BalanceRecord) -> Result<(), LedgerError>;
    /// Replace the whole balance sequence. Only used to undo a half-applied trade.
    fn write_balances(&self, records: &[BalanceRecord]) -> Result<(), LedgerError>;

    fn load_lots(&self) -> Result<Vec<LotRecord>, LedgerError>;
    fn append_lot(&self, lot: &LotRecord) -> Result<(), LedgerError>;
    fn write_lots(&self, lots: &[LotRecord]) -> Result<(), LedgerError>;
}

// ---------------- CSV files ----------------

/// `balance.csv` / `portfolio.csv` with a header row each.
pub struct CsvBackend {
    balance_path: PathBuf,
    lots_path: PathBuf,
}

impl CsvBackend {
    pub fn new(balance_path: impl Into<PathBuf>, lots_path: impl Into<PathBuf>) -> Self {
        Self {
            balance_path: balance_path.into(),
            lots_path: lots_path.into(),
        }
    }

    fn read_all<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, LedgerError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut out = Vec::new();
        for row in rdr.deserialize() {
            out.push(row?);
        }
        Ok(out)
    }

    fn append_one<T: serde::Serialize>(
        path: &Path,
        headers: &[&str],
        row: &T,
    ) -> Result<(), LedgerError> {
        ensure_parent(path)?;
        let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            wtr.write_record(headers)?;
        }
        wtr.serialize(row)?;
        wtr.flush()?;
        Ok(())
    }

    /// Write to a sibling temp file, then rename over `path`.
    fn rewrite<T: serde::Serialize>(
        path: &Path,
        headers: &[&str],
        rows: &[T],
    ) -> Result<(), LedgerError> {
        let dir = ensure_parent(path)?;
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(tmp);
        wtr.write_record(headers)?;
        for row in rows {
            wtr.serialize(row)?;
        }
        let tmp = wtr.into_inner().map_err(|e| LedgerError::Io(e.into_error()))?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)?;
        Ok(())
    }
}

/// Creates the parent directory if needed and returns it (`.` for bare file names).
fn ensure_parent(path: &Path) -> Result<PathBuf, LedgerError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

impl LedgerBackend for CsvBackend {
    fn load_balances(&self) -> Result<Vec<BalanceRecord>, LedgerError> {
        Self::read_all(&self.balance_path)
    }

    fn append_balance(&self, record: &BalanceRecord) -> Result<(), LedgerError> {
        Self::append_one(&self.balance_path, &BALANCE_HEADERS, record)
    }

    fn write_balances(&self, records: &[BalanceRecord]) -> Result<(), LedgerError> {
        Self::rewrite(&self.balance_path, &BALANCE_HEADERS, records)
    }

    fn load_lots(&self) -> Result<Vec<LotRecord>, LedgerError> {
        Self::read_all(&self.lots_path)
    }

    fn append_lot(&self, lot: &LotRecord) -> Result<(), LedgerError> {
        Self::append_one(&self.lots_path, &LOT_HEADERS, lot)
    }

    fn write_lots(&self, lots: &[LotRecord]) -> Result<(), LedgerError> {
        Self::rewrite(&self.lots_path, &LOT_HEADERS, lots)
    }
}

// ---------------- In-memory ----------------

/// Non-persistent backend for dry runs and tests.
#[derive(Default)]
pub struct MemoryBackend {
    balances: Mutex<Vec<BalanceRecord>>,
    lots: Mutex<Vec<LotRecord>>,
}

fn poisoned() -> LedgerError {
    LedgerError::Io(std::io::Error::other("memory ledger lock poisoned"))
}

impl LedgerBackend for MemoryBackend {
    fn load_balances(&self) -> Result<Vec<BalanceRecord>, LedgerError> {
        Ok(self.balances.lock().map_err(|_| poisoned())?.clone())
    }

    fn append_balance(&self, record: &BalanceRecord) -> Result<(), LedgerError> {
        self.balances
            .lock()
            .map_err(|_| poisoned())?
            .push(record.clone());
        Ok(())
    }

    fn write_balances(&self, records: &[BalanceRecord]) -> Result<(), LedgerError> {
        *self.balances.lock().map_err(|_| poisoned())? = records.to_vec();
        Ok(())
    }

    fn load_lots(&self) -> Result<Vec<LotRecord>, LedgerError> {
        Ok(self.lots.lock().map_err(|_| poisoned())?.clone())
    }

    fn append_lot(&self, lot: &LotRecord) -> Result<(), LedgerError> {
        self.lots.lock().map_err(|_| poisoned())?.push(lot.clone());
        Ok(())
    }

    fn write_lots(&self, lots: &[LotRecord]) -> Result<(), LedgerError> {
        *self.lots.lock().map_err(|_| poisoned())? = lots.to_vec();
        Ok(())
    }
}

// ---------------- Store ----------------

pub struct LedgerStore {
    backend: Box<dyn LedgerBackend>,
    initial_balance: Decimal,
    init_guard: Mutex<()>,
    /// Trades hold the write side across their two-step commit. Readers that combine
    /// cash and lots hold the read side.
    txn: RwLock<()>,
}

impl LedgerStore {
    pub fn new(backend: Box<dyn LedgerBackend>, initial_balance: Decimal) -> Self {
        Self {
            backend,
            initial_balance,
            init_guard: Mutex::new(()),
            txn: RwLock::new(()),
        }
    }

    pub fn in_memory(initial_balance: Decimal) -> Self {
        Self::new(Box::new(MemoryBackend::default()), initial_balance)
    }

    pub async fn write_txn(&self) -> RwLockWriteGuard<'_, ()> {
        self.txn.write().await
    }

    /// Cash and lots read under this guard belong to the same side of any trade.
    pub async fn read_txn(&self) -> RwLockReadGuard<'_, ()> {
        self.txn.read().await
    }

    /// Current cash. Writes the initial deposit first if the ledger is empty.
    pub fn get_balance(&self) -> Result<Decimal, LedgerError> {
        if let Some(last) = self.backend.load_balances()?.last() {
            return Ok(last.balance);
        }
        let _guard = self.init_guard.lock().map_err(|_| poisoned())?;
        // Another caller may have initialized while we waited.
        if let Some(last) = self.backend.load_balances()?.last() {
            return Ok(last.balance);
        }
        let record = BalanceRecord {
            timestamp: now(),
            balance: self.initial_balance,
            action: BalanceAction::Deposit,
            amount: self.initial_balance,
        };
        self.backend.append_balance(&record)?;
        info!(
            "Ledger initialized with deposit {}",
            crate::utils::money(self.initial_balance)
        );
        Ok(self.initial_balance)
    }

    /// Debits `amount` (credits when negative) and returns the new balance.
    pub fn append_balance(
        &self,
        amount: Decimal,
        action: BalanceAction,
    ) -> Result<Decimal, LedgerError> {
        let current = self.get_balance()?;
        let new_balance = current.checked_sub(amount).ok_or_else(|| {
            LedgerError::InvalidArgument(format!("balance change of {amount} is out of range"))
        })?;
        let record = BalanceRecord {
            timestamp: now(),
            balance: new_balance,
            action,
            amount,
        };
        self.backend.append_balance(&record)?;
        Ok(new_balance)
    }

    pub fn append_lot(
        &self,
        ticker: &str,
        name: &str,
        shares: Decimal,
        unit_price: Decimal,
    ) -> Result<(), LedgerError> {
        if shares <= Decimal::ZERO {
            return Err(LedgerError::InvalidArgument(format!(
                "lot for {ticker} must have positive shares, got {shares}"
            )));
        }
        let lot = LotRecord {
            timestamp: now(),
            ticker: ticker.to_string(),
            name: name.to_string(),
            shares,
            unit_price,
            total_cost: lot_cost(ticker, shares, unit_price)?,
        };
        self.backend.append_lot(&lot)
    }

    /// All lots in insertion order, optionally only those of `ticker`.
    pub fn list_lots(&self, ticker: Option<&str>) -> Result<Vec<LotRecord>, LedgerError> {
        let lots = self.backend.load_lots()?;
        Ok(match ticker {
            Some(t) => lots
                .into_iter()
                .filter(|l| l.ticker.eq_ignore_ascii_case(t))
                .collect(),
            None => lots,
        })
    }

    pub fn replace_lots(&self, lots: &[LotRecord]) -> Result<(), LedgerError> {
        if let Some(bad) = lots.iter().find(|l| l.shares <= Decimal::ZERO) {
            return Err(LedgerError::InvalidArgument(format!(
                "refusing to store a {} lot with {} shares",
                bad.ticker, bad.shares
            )));
        }
        self.backend.write_lots(lots)
    }

    /// Per-ticker aggregates in first-purchase order. Name comes from the newest lot.
    pub fn holdings(&self) -> Result<Vec<Holding>, LedgerError> {
        Ok(aggregate_holdings(&self.backend.load_lots()?))
    }

    /// Last `limit` balance records, oldest first.
    pub fn balance_history(&self, limit: usize) -> Result<Vec<BalanceRecord>, LedgerError> {
        let mut all = self.backend.load_balances()?;
        let skip = all.len().saturating_sub(limit);
        Ok(all.split_off(skip))
    }

    /// Debit the balance and record the lot, or neither.
    pub fn commit_buy(
        &self,
        ticker: &str,
        name: &str,
        shares: Decimal,
        unit_price: Decimal,
    ) -> Result<Decimal, LedgerError> {
        if shares <= Decimal::ZERO {
            return Err(LedgerError::InvalidArgument(format!(
                "cannot buy {shares} shares of {ticker}"
            )));
        }
        let cost = lot_cost(ticker, shares, unit_price)?;
        self.get_balance()?;
        let before = self.backend.load_balances()?;
        let new_balance = self.append_balance(cost, BalanceAction::Buy(ticker.to_string()))?;
        if let Err(e) = self.append_lot(ticker, name, shares, unit_price) {
            warn!("Lot write for {} failed, restoring balance ledger: {}", ticker, e);
            if let Err(undo) = self.backend.write_balances(&before) {
                warn!("Balance ledger restore failed: {}", undo);
            }
            return Err(e);
        }
        Ok(new_balance)
    }

    /// Rewrite lots with `remaining` and credit `proceeds`, or neither.
    pub fn commit_sell(
        &self,
        ticker: &str,
        remaining: &[LotRecord],
        proceeds: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let before = self.backend.load_lots()?;
        self.replace_lots(remaining)?;
        match self.append_balance(-proceeds, BalanceAction::Sell(ticker.to_string())) {
            Ok(balance) => Ok(balance),
            Err(e) => {
                warn!("Balance write for {} failed, restoring lot ledger: {}", ticker, e);
                if let Err(undo) = self.backend.write_lots(&before) {
                    warn!("Lot ledger restore failed: {}", undo);
                }
                Err(e)
            }
        }
    }
}

fn lot_cost(ticker: &str, shares: Decimal, unit_price: Decimal) -> Result<Decimal, LedgerError> {
    shares.checked_mul(unit_price).ok_or_else(|| {
        LedgerError::InvalidArgument(format!(
            "{shares} shares of {ticker} at {unit_price} is out of range"
        ))
    })
}

pub fn aggregate_holdings(lots: &[LotRecord]) -> Vec<Holding> {
    let mut out: Vec<Holding> = Vec::new();
    for lot in lots {
        match out
            .iter_mut()
            .find(|h| h.ticker.eq_ignore_ascii_case(&lot.ticker))
        {
            Some(h) => {
                h.shares += lot.shares;
                h.cost_basis += lot.shares * lot.unit_price;
                h.name = lot.name.clone();
            }
            None => out.push(Holding {
                ticker: lot.ticker.clone(),
                name: lot.name.clone(),
                shares: lot.shares,
                cost_basis: lot.shares * lot.unit_price,
            }),
        }
    }
    out
}

/// Most-recent-first consumption of `ticker` lots.
///
/// Returns the rewritten full sequence, or `None` if the ticker holds fewer than `shares`.
/// Other tickers and untouched lots keep their position in the sequence.
pub fn consume_lots_lifo(
    lots: &[LotRecord],
    ticker: &str,
    shares: Decimal,
) -> Option<Vec<LotRecord>> {
    let owned: Decimal = lots
        .iter()
        .filter(|l| l.ticker.eq_ignore_ascii_case(ticker))
        .map(|l| l.shares)
        .sum();
    if shares > owned {
        return None;
    }

    let mut remaining = shares;
    let mut keep: Vec<Option<LotRecord>> = lots.iter().cloned().map(Some).collect();
    for slot in keep.iter_mut().rev() {
        if remaining <= Decimal::ZERO {
            break;
        }
        let Some(lot) = slot else { continue };
        if !lot.ticker.eq_ignore_ascii_case(ticker) {
            continue;
        }
        if lot.shares <= remaining {
            remaining -= lot.shares;
            *slot = None;
        } else {
            lot.shares -= remaining;
            lot.total_cost = lot.shares * lot.unit_price;
            remaining = Decimal::ZERO;
        }
    }
    Some(keep.into_iter().flatten().collect())
}

fn now() -> NaiveDateTime {
    let ts = Local::now().naive_local();
    // Ledger files only carry whole seconds.
    ts.with_nanosecond(0).unwrap_or(ts)
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Memory backend whose lot or balance writes can be made to fail.
    #[derive(Default)]
    pub struct FlakyBackend {
        inner: MemoryBackend,
        pub fail_lots: AtomicBool,
        pub fail_balances: AtomicBool,
    }

    fn io_fail() -> LedgerError {
        LedgerError::Io(std::io::Error::other("disk full"))
    }

    impl LedgerBackend for Arc<FlakyBackend> {
        fn load_balances(&self) -> Result<Vec<BalanceRecord>, LedgerError> {
            self.inner.load_balances()
        }
        fn append_balance(&self, record: &BalanceRecord) -> Result<(), LedgerError> {
            if self.fail_balances.load(Ordering::SeqCst) {
                return Err(io_fail());
            }
            self.inner.append_balance(record)
        }
        fn write_balances(&self, records: &[BalanceRecord]) -> Result<(), LedgerError> {
            self.inner.write_balances(records)
        }
        fn load_lots(&self) -> Result<Vec<LotRecord>, LedgerError> {
            self.inner.load_lots()
        }
        fn append_lot(&self, lot: &LotRecord) -> Result<(), LedgerError> {
            if self.fail_lots.load(Ordering::SeqCst) {
                return Err(io_fail());
            }
            self.inner.append_lot(lot)
        }
        fn write_lots(&self, lots: &[LotRecord]) -> Result<(), LedgerError> {
            self.inner.write_lots(lots)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FlakyBackend;
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn lot(ticker: &str, shares: Decimal) -> LotRecord {
        LotRecord {
            timestamp: now(),
            ticker: ticker.to_string(),
            name: format!("{ticker} Inc"),
            shares,
            unit_price: dec!(10),
            total_cost: shares * dec!(10),
        }
    }

    fn shares_of(lots: &[LotRecord]) -> Vec<(String, Decimal)> {
        lots.iter().map(|l| (l.ticker.clone(), l.shares)).collect()
    }

    #[test]
    fn balance_initializes_lazily() {
        let store = LedgerStore::in_memory(dec!(50000));
        assert_eq!(store.get_balance().unwrap(), dec!(50000));
        assert_eq!(store.get_balance().unwrap(), dec!(50000));
        let history = store.balance_history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, BalanceAction::Deposit);
        assert_eq!(history[0].amount, dec!(50000));
    }

    #[test]
    fn append_balance_debits_and_credits() {
        let store = LedgerStore::in_memory(dec!(1000));
        let b = store
            .append_balance(dec!(300), BalanceAction::Buy("AAPL".into()))
            .unwrap();
        assert_eq!(b, dec!(700));
        let b = store
            .append_balance(dec!(-125.5), BalanceAction::Sell("AAPL".into()))
            .unwrap();
        assert_eq!(b, dec!(825.5));
        assert_eq!(store.get_balance().unwrap(), dec!(825.5));
    }

    #[test]
    fn append_lot_rejects_non_positive_shares() {
        let store = LedgerStore::in_memory(dec!(1000));
        assert!(matches!(
            store.append_lot("AAPL", "Apple", Decimal::ZERO, dec!(1)),
            Err(LedgerError::InvalidArgument(_))
        ));
        assert!(store.list_lots(None).unwrap().is_empty());
    }

    #[test]
    fn list_lots_filters_by_ticker_in_order() {
        let store = LedgerStore::in_memory(dec!(1000));
        store.append_lot("AAPL", "Apple", dec!(1), dec!(10)).unwrap();
        store.append_lot("MSFT", "Microsoft", dec!(2), dec!(20)).unwrap();
        store.append_lot("AAPL", "Apple", dec!(3), dec!(30)).unwrap();
        let aapl = store.list_lots(Some("AAPL")).unwrap();
        assert_eq!(aapl.len(), 2);
        assert_eq!(aapl[0].shares, dec!(1));
        assert_eq!(aapl[1].shares, dec!(3));
        assert_eq!(aapl[1].total_cost, dec!(90));
    }

    #[test]
    fn lifo_consumes_newest_lot_first() {
        let lots = vec![lot("X", dec!(5)), lot("X", dec!(3))];
        let out = consume_lots_lifo(&lots, "X", dec!(4)).unwrap();
        assert_eq!(shares_of(&out), vec![("X".to_string(), dec!(4))]);
        assert_eq!(out[0].total_cost, dec!(40));
    }

    #[test]
    fn lifo_keeps_other_tickers_in_place() {
        let lots = vec![
            lot("X", dec!(5)),
            lot("Y", dec!(1)),
            lot("X", dec!(3)),
            lot("Z", dec!(2)),
        ];
        let out = consume_lots_lifo(&lots, "X", dec!(2)).unwrap();
        assert_eq!(
            shares_of(&out),
            vec![
                ("X".to_string(), dec!(5)),
                ("Y".to_string(), dec!(1)),
                ("X".to_string(), dec!(1)),
                ("Z".to_string(), dec!(2)),
            ]
        );
    }

    #[test]
    fn lifo_selling_everything_leaves_no_lot() {
        let lots = vec![lot("X", dec!(5)), lot("Y", dec!(1)), lot("X", dec!(3))];
        let out = consume_lots_lifo(&lots, "X", dec!(8)).unwrap();
        assert_eq!(shares_of(&out), vec![("Y".to_string(), dec!(1))]);
    }

    #[test]
    fn lifo_rejects_oversell() {
        let lots = vec![lot("X", dec!(2))];
        assert!(consume_lots_lifo(&lots, "X", dec!(3)).is_none());
    }

    #[test]
    fn holdings_aggregate_per_ticker() {
        let lots = vec![lot("X", dec!(5)), lot("Y", dec!(1)), lot("X", dec!(3))];
        let h = aggregate_holdings(&lots);
        assert_eq!(h.len(), 2);
        assert_eq!(h[0].ticker, "X");
        assert_eq!(h[0].shares, dec!(8));
        assert_eq!(h[0].cost_basis, dec!(80));
    }

    #[test]
    fn csv_backend_round_trips_and_rewrites() {
        let dir = tempdir().unwrap();
        let balance = dir.path().join("data/balance.csv");
        let lots = dir.path().join("data/portfolio.csv");
        let store = LedgerStore::new(
            Box::new(CsvBackend::new(&balance, &lots)),
            dec!(50000),
        );

        store
            .commit_buy("AAPL", "Apple Inc, Common", dec!(2), dec!(150))
            .unwrap();
        assert_eq!(store.get_balance().unwrap(), dec!(49700));

        let text = fs::read_to_string(&balance).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Timestamp,Balance,Action,Amount"));
        assert!(lines.next().unwrap().ends_with(",50000,Initial deposit,50000"));
        assert!(lines.next().unwrap().ends_with(",49700,Buy AAPL,300"));

        // Reopen from disk.
        let reopened = LedgerStore::new(
            Box::new(CsvBackend::new(&balance, &lots)),
            dec!(1),
        );
        assert_eq!(reopened.get_balance().unwrap(), dec!(49700));
        let on_disk = reopened.list_lots(None).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].name, "Apple Inc, Common");
        assert_eq!(on_disk[0].total_cost, dec!(300));

        reopened.replace_lots(&[]).unwrap();
        assert_eq!(
            fs::read_to_string(&lots).unwrap().trim(),
            "Timestamp,Ticker,Name,Shares,Price,Total"
        );
        assert!(reopened.list_lots(None).unwrap().is_empty());
    }

    #[test]
    fn replace_lots_refuses_empty_lots() {
        let store = LedgerStore::in_memory(dec!(1000));
        store.append_lot("AAPL", "Apple", dec!(2), dec!(10)).unwrap();
        store.append_lot("MSFT", "Microsoft", dec!(1), dec!(20)).unwrap();
        let before = store.list_lots(None).unwrap();

        let mut zeroed = before.clone();
        zeroed[0].shares = Decimal::ZERO;
        assert!(matches!(
            store.replace_lots(&zeroed),
            Err(LedgerError::InvalidArgument(_))
        ));
        assert_eq!(store.list_lots(None).unwrap(), before);
    }

    #[test]
    fn out_of_range_buy_is_rejected_before_writing() {
        let store = LedgerStore::in_memory(dec!(1000));
        assert!(matches!(
            store.commit_buy("AAPL", "Apple", Decimal::MAX, dec!(150)),
            Err(LedgerError::InvalidArgument(_))
        ));
        assert_eq!(store.balance_history(10).unwrap().len(), 1);
        assert!(store.list_lots(None).unwrap().is_empty());
    }

    #[test]
    fn failed_lot_write_rolls_back_buy() {
        let backend = Arc::new(FlakyBackend::default());
        let store = LedgerStore::new(Box::new(Arc::clone(&backend)), dec!(1000));
        store.get_balance().unwrap();
        backend.fail_lots.store(true, Ordering::SeqCst);

        assert!(store.commit_buy("AAPL", "Apple", dec!(1), dec!(100)).is_err());
        assert_eq!(store.get_balance().unwrap(), dec!(1000));
        assert_eq!(store.balance_history(10).unwrap().len(), 1);
        assert!(store.list_lots(None).unwrap().is_empty());
    }

    #[test]
    fn failed_balance_write_rolls_back_sell() {
        let backend = Arc::new(FlakyBackend::default());
        let store = LedgerStore::new(Box::new(Arc::clone(&backend)), dec!(1000));
        store.commit_buy("AAPL", "Apple", dec!(3), dec!(100)).unwrap();
        let lots = store.list_lots(None).unwrap();
        let remaining = consume_lots_lifo(&lots, "AAPL", dec!(1)).unwrap();

        backend.fail_balances.store(true, Ordering::SeqCst);
        assert!(store.commit_sell("AAPL", &remaining, dec!(100)).is_err());
        assert_eq!(store.list_lots(None).unwrap(), lots);
        assert_eq!(store.get_balance().unwrap(), dec!(700));
    }
}
