use crate::domain::ports::{LedgerStore, TransactionStore, UnitOfWork, WalletStore};
use crate::domain::transaction::Transaction;
use crate::domain::wallet::{Balance, BalanceDelta, Wallet};
use crate::error::{Result, RetryError};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Column Family for storing wallets.
pub const CF_WALLETS: &str = "wallets";
/// Column Family for storing transaction records.
pub const CF_TRANSACTIONS: &str = "transactions";

/// A persistent ledger implementation using RocksDB.
///
/// Wallets and transactions live in separate Column Families, keyed by id and
/// encoded as JSON. Every write goes through a single writer lock, so a balance
/// increment is a serialized read-apply-write and an atomic unit can hold the
/// lock for its whole lifetime and land as one `WriteBatch`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbLedger {
    db: Arc<DB>,
    writer: Arc<Mutex<()>>,
}

impl RocksDbLedger {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("wallets" and "transactions") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_wallets = ColumnFamilyDescriptor::new(CF_WALLETS, Options::default());
        let cf_transactions = ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_wallets, cf_transactions])?;

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
        })
    }
}

fn column<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| RetryError::Storage(format!("{name} column family not found")))
}

fn read<T: DeserializeOwned>(db: &DB, cf: &str, key: &str) -> Result<Option<T>> {
    match db.get_cf(column(db, cf)?, key.as_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn write<T: Serialize>(db: &DB, cf: &str, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    db.put_cf(column(db, cf)?, key.as_bytes(), bytes)?;
    Ok(())
}

fn scan<T: DeserializeOwned>(db: &DB, cf: &str) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for item in db.iterator_cf(column(db, cf)?, IteratorMode::Start) {
        let (_key, value) = item?;
        values.push(serde_json::from_slice(&value)?);
    }
    Ok(values)
}

#[async_trait]
impl TransactionStore for RocksDbLedger {
    async fn store_transaction(&self, tx: Transaction) -> Result<()> {
        let _writer = self.writer.lock().await;
        write(&self.db, CF_TRANSACTIONS, &tx.id, &tx)
    }

    async fn get_transaction(&self, tx_id: &str) -> Result<Option<Transaction>> {
        read(&self.db, CF_TRANSACTIONS, tx_id)
    }

    async fn list_retryable(&self) -> Result<Vec<Transaction>> {
        let mut pending: Vec<Transaction> = scan::<Transaction>(&self.db, CF_TRANSACTIONS)?
            .into_iter()
            .filter(Transaction::awaiting_retry)
            .collect();
        pending.sort_by_key(|tx| tx.metadata.next_retry_at.unwrap_or(tx.created_at));
        Ok(pending)
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        scan(&self.db, CF_TRANSACTIONS)
    }
}

#[async_trait]
impl WalletStore for RocksDbLedger {
    async fn open_wallet(&self, wallet: Wallet) -> Result<()> {
        let _writer = self.writer.lock().await;
        if read::<Wallet>(&self.db, CF_WALLETS, &wallet.id)?.is_some() {
            return Err(RetryError::Validation(format!(
                "Wallet {} already exists",
                wallet.id
            )));
        }
        write(&self.db, CF_WALLETS, &wallet.id, &wallet)
    }

    async fn get_wallet(&self, wallet_id: &str) -> Result<Option<Wallet>> {
        read(&self.db, CF_WALLETS, wallet_id)
    }

    async fn adjust_balance(&self, wallet_id: &str, delta: BalanceDelta) -> Result<Balance> {
        let _writer = self.writer.lock().await;
        let mut wallet: Wallet = read(&self.db, CF_WALLETS, wallet_id)?
            .ok_or_else(|| RetryError::NotFound(format!("wallet {wallet_id}")))?;
        let balance = wallet.apply(delta)?;
        write(&self.db, CF_WALLETS, wallet_id, &wallet)?;
        Ok(balance)
    }

    async fn all_wallets(&self) -> Result<Vec<Wallet>> {
        // Keys iterate in byte order, which is id order.
        scan(&self.db, CF_WALLETS)
    }
}

#[async_trait]
impl LedgerStore for RocksDbLedger {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(RocksDbUnit {
            db: self.db.clone(),
            _writer: guard,
            transactions: HashMap::new(),
            wallets: HashMap::new(),
        }))
    }
}

/// Atomic unit over the RocksDB ledger: staged in memory, written as one batch.
struct RocksDbUnit {
    db: Arc<DB>,
    _writer: OwnedMutexGuard<()>,
    transactions: HashMap<String, Transaction>,
    wallets: HashMap<String, Wallet>,
}

#[async_trait]
impl UnitOfWork for RocksDbUnit {
    async fn get_transaction(&mut self, tx_id: &str) -> Result<Option<Transaction>> {
        match self.transactions.get(tx_id) {
            Some(staged) => Ok(Some(staged.clone())),
            None => read(&self.db, CF_TRANSACTIONS, tx_id),
        }
    }

    async fn get_wallet(&mut self, wallet_id: &str) -> Result<Option<Wallet>> {
        match self.wallets.get(wallet_id) {
            Some(staged) => Ok(Some(staged.clone())),
            None => read(&self.db, CF_WALLETS, wallet_id),
        }
    }

    async fn store_transaction(&mut self, tx: Transaction) -> Result<()> {
        self.transactions.insert(tx.id.clone(), tx);
        Ok(())
    }

    async fn adjust_balance(&mut self, wallet_id: &str, delta: BalanceDelta) -> Result<Balance> {
        let mut wallet = self
            .get_wallet(wallet_id)
            .await?
            .ok_or_else(|| RetryError::NotFound(format!("wallet {wallet_id}")))?;
        let balance = wallet.apply(delta)?;
        self.wallets.insert(wallet.id.clone(), wallet);
        Ok(balance)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut batch = WriteBatch::default();
        let wallets_cf = column(&self.db, CF_WALLETS)?;
        let transactions_cf = column(&self.db, CF_TRANSACTIONS)?;

        for (id, wallet) in &self.wallets {
            batch.put_cf(wallets_cf, id.as_bytes(), serde_json::to_vec(wallet)?);
        }
        for (id, tx) in &self.transactions {
            batch.put_cf(transactions_cf, id.as_bytes(), serde_json::to_vec(tx)?);
        }

        self.db.write(batch)?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::{SettlementDetails, TransactionStatus};
    use crate::domain::wallet::{Amount, Direction};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn delta(value: rust_decimal::Decimal, direction: Direction) -> BalanceDelta {
        BalanceDelta::new(Amount::new(value).unwrap(), direction)
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDbLedger::open(dir.path()).expect("Failed to open RocksDB");

        assert!(store.db.cf_handle(CF_WALLETS).is_some());
        assert!(store.db.cf_handle(CF_TRANSACTIONS).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_wallet_store() {
        let dir = tempdir().unwrap();
        let store = RocksDbLedger::open(dir.path()).unwrap();

        store.open_wallet(Wallet::open("w2", dec!(5))).await.unwrap();
        store.open_wallet(Wallet::open("w1", dec!(100.0))).await.unwrap();

        let balance = store
            .adjust_balance("w1", delta(dec!(40), Direction::Debit))
            .await
            .unwrap();
        assert_eq!(balance, Balance::new(dec!(60.0)));

        let overdraw = store
            .adjust_balance("w2", delta(dec!(6), Direction::Debit))
            .await;
        assert!(matches!(overdraw, Err(RetryError::InsufficientFunds { .. })));

        let all = store.all_wallets().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "w1");
        assert_eq!(all[1].balance(), Balance::new(dec!(5)));
        assert!(store.get_wallet("w3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rocksdb_transaction_store() {
        let dir = tempdir().unwrap();
        let store = RocksDbLedger::open(dir.path()).unwrap();

        let mut tx = Transaction::new(
            "tx1",
            "w1",
            Amount::new(dec!(100.0)).unwrap(),
            SettlementDetails::Funding {
                gateway_reference: Some("ref".to_string()),
            },
        );
        tx.status = TransactionStatus::Failed;
        tx.metadata.next_retry_at = Some(chrono::Utc::now());

        store.store_transaction(tx.clone()).await.unwrap();

        let retrieved = store.get_transaction("tx1").await.unwrap().unwrap();
        assert_eq!(retrieved, tx);
        assert_eq!(store.list_retryable().await.unwrap(), vec![tx]);
        assert!(store.get_transaction("tx2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rocksdb_unit_commits_as_one_batch() {
        let dir = tempdir().unwrap();
        let store = RocksDbLedger::open(dir.path()).unwrap();
        store.open_wallet(Wallet::open("a", dec!(50))).await.unwrap();
        store.open_wallet(Wallet::open("b", dec!(0))).await.unwrap();

        let mut unit = store.begin().await.unwrap();
        unit.adjust_balance("a", delta(dec!(20), Direction::Debit))
            .await
            .unwrap();
        unit.adjust_balance("b", delta(dec!(20), Direction::Credit))
            .await
            .unwrap();
        unit.commit().await.unwrap();

        let a = store.get_wallet("a").await.unwrap().unwrap();
        let b = store.get_wallet("b").await.unwrap().unwrap();
        assert_eq!(a.balance(), Balance::new(dec!(30)));
        assert_eq!(b.balance(), Balance::new(dec!(20)));
    }

    #[tokio::test]
    async fn test_rocksdb_unit_rollback_writes_nothing() {
        let dir = tempdir().unwrap();
        let store = RocksDbLedger::open(dir.path()).unwrap();
        store.open_wallet(Wallet::open("a", dec!(50))).await.unwrap();

        let mut unit = store.begin().await.unwrap();
        unit.adjust_balance("a", delta(dec!(20), Direction::Debit))
            .await
            .unwrap();
        unit.rollback().await.unwrap();

        let a = store.get_wallet("a").await.unwrap().unwrap();
        assert_eq!(a.balance(), Balance::new(dec!(50)));
    }
}
