//! Marks holdings to current quotes. Read-only over the ledger.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;

use crate::error::LedgerError;
use crate::ledger::LedgerStore;
use crate::quotes::QuoteProvider;
use crate::types::{PortfolioSnapshot, PositionValue};

pub struct Valuation {
    ledger: Arc<LedgerStore>,
    quotes: Arc<dyn QuoteProvider>,
}

impl Valuation {
    pub fn new(ledger: Arc<LedgerStore>, quotes: Arc<dyn QuoteProvider>) -> Self {
        Self { ledger, quotes }
    }

    pub fn get_balance(&self) -> Result<Decimal, LedgerError> {
        self.ledger.get_balance()
    }

    /// Cash plus holdings at current prices. A ticker whose quote fails is logged and
    /// left out of `stock_value` rather than failing the whole snapshot.
    pub async fn get_portfolio_value(&self) -> Result<PortfolioSnapshot, LedgerError> {
        let (cash, holdings) = {
            let _txn = self.ledger.read_txn().await;
            (self.ledger.get_balance()?, self.ledger.holdings()?)
        };

        let mut positions = Vec::with_capacity(holdings.len());
        let mut unpriced = Vec::new();
        let mut stock_value = Decimal::ZERO;
        for h in holdings {
            let q = match self.quotes.quote(&h.ticker).await {
                Ok(q) => q,
                Err(e) => {
                    warn!("Error getting price for {}: {}", h.ticker, e);
                    unpriced.push(h.ticker);
                    continue;
                }
            };
            let marked = h
                .shares
                .checked_mul(q.price)
                .and_then(|value| stock_value.checked_add(value).map(|sum| (value, sum)));
            let Some((value, running)) = marked else {
                warn!("Value of {} {} at {} is out of range", h.shares, h.ticker, q.price);
                unpriced.push(h.ticker);
                continue;
            };
            stock_value = running;
            positions.push(PositionValue {
                ticker: h.ticker,
                name: h.name,
                shares: h.shares,
                price: q.price,
                value,
            });
        }

        Ok(PortfolioSnapshot {
            cash,
            stock_value,
            total: cash.saturating_add(stock_value),
            positions,
            unpriced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerBackend, MemoryBackend};
    use crate::quotes::fake::StaticQuotes;
    use crate::trade::TradeEngine;
    use crate::types::{BalanceRecord, LotRecord, Quantity};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn setup() -> (Arc<LedgerStore>, Arc<StaticQuotes>, Valuation) {
        let ledger = Arc::new(LedgerStore::in_memory(dec!(50000)));
        let quotes = Arc::new(StaticQuotes::with(&[
            ("AAPL", "Apple Inc.", dec!(160)),
            ("MSFT", "Microsoft", dec!(400)),
        ]));
        let v = Valuation::new(Arc::clone(&ledger), quotes.clone());
        (ledger, quotes, v)
    }

    #[tokio::test]
    async fn empty_portfolio_is_all_cash() {
        let (_, _, v) = setup();
        let snap = v.get_portfolio_value().await.unwrap();
        assert_eq!(snap.cash, dec!(50000));
        assert_eq!(snap.stock_value, Decimal::ZERO);
        assert_eq!(snap.total, dec!(50000));
        assert!(snap.positions.is_empty());
    }

    #[tokio::test]
    async fn marks_lots_to_current_price() {
        let (ledger, _, v) = setup();
        ledger.commit_buy("AAPL", "Apple Inc.", dec!(2), dec!(150)).unwrap();
        ledger.commit_buy("AAPL", "Apple Inc.", dec!(1), dec!(155)).unwrap();
        ledger.commit_buy("MSFT", "Microsoft", dec!(1), dec!(390)).unwrap();

        let snap = v.get_portfolio_value().await.unwrap();
        assert_eq!(snap.cash, dec!(50000) - dec!(300) - dec!(155) - dec!(390));
        assert_eq!(snap.stock_value, dec!(3) * dec!(160) + dec!(400));
        assert_eq!(snap.total, snap.cash + snap.stock_value);
        assert_eq!(snap.positions.len(), 2);
        assert_eq!(snap.positions[0].shares, dec!(3));

        // Stable quotes, no trades: identical snapshot.
        assert_eq!(v.get_portfolio_value().await.unwrap(), snap);
    }

    #[tokio::test]
    async fn failed_quote_excludes_ticker() {
        let (ledger, quotes, v) = setup();
        ledger.commit_buy("AAPL", "Apple Inc.", dec!(2), dec!(150)).unwrap();
        ledger.commit_buy("MSFT", "Microsoft", dec!(1), dec!(390)).unwrap();
        quotes.remove("AAPL");

        let snap = v.get_portfolio_value().await.unwrap();
        assert_eq!(snap.stock_value, dec!(400));
        assert_eq!(snap.unpriced, vec!["AAPL".to_string()]);
        assert_eq!(snap.total, snap.cash + dec!(400));
    }

    /// Memory backend that stalls inside the lot write of a buy.
    #[derive(Default)]
    struct SlowLots {
        inner: MemoryBackend,
        entered: AtomicBool,
    }

    impl LedgerBackend for Arc<SlowLots> {
        fn load_balances(&self) -> Result<Vec<BalanceRecord>, LedgerError> {
            self.inner.load_balances()
        }
        fn append_balance(&self, record: &BalanceRecord) -> Result<(), LedgerError> {
            self.inner.append_balance(record)
        }
        fn write_balances(&self, records: &[BalanceRecord]) -> Result<(), LedgerError> {
            self.inner.write_balances(records)
        }
        fn load_lots(&self) -> Result<Vec<LotRecord>, LedgerError> {
            self.inner.load_lots()
        }
        fn append_lot(&self, lot: &LotRecord) -> Result<(), LedgerError> {
            self.entered.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(300));
            self.inner.append_lot(lot)
        }
        fn write_lots(&self, lots: &[LotRecord]) -> Result<(), LedgerError> {
            self.inner.write_lots(lots)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn snapshot_during_buy_sees_whole_trade() {
        let backend = Arc::new(SlowLots::default());
        let ledger = Arc::new(LedgerStore::new(Box::new(Arc::clone(&backend)), dec!(50000)));
        let quotes = Arc::new(StaticQuotes::with(&[("AAPL", "Apple Inc.", dec!(150))]));
        let engine = Arc::new(TradeEngine::new(Arc::clone(&ledger), quotes.clone()));
        let v = Valuation::new(Arc::clone(&ledger), quotes.clone());

        let buy = tokio::spawn({
            let e = Arc::clone(&engine);
            async move { e.buy("AAPL", Quantity::Shares(dec!(10))).await.success() }
        });
        for _ in 0..200 {
            if backend.entered.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(backend.entered.load(Ordering::SeqCst));

        let snap = v.get_portfolio_value().await.unwrap();
        assert_eq!(snap.cash, dec!(48500));
        assert_eq!(snap.stock_value, dec!(1500));
        assert_eq!(snap.total, dec!(50000));
        assert!(buy.await.unwrap());
    }
}
