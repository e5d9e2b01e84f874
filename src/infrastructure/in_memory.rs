use crate::domain::ports::{LedgerStore, TransactionStore, UnitOfWork, WalletStore};
use crate::domain::transaction::Transaction;
use crate::domain::wallet::{Balance, BalanceDelta, Wallet};
use crate::error::{Result, RetryError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

#[derive(Default)]
struct LedgerState {
    transactions: HashMap<String, Transaction>,
    wallets: HashMap<String, Wallet>,
}

/// A thread-safe in-memory ledger holding transactions and wallets.
///
/// Uses a single `Arc<RwLock<..>>` over both maps so an atomic unit can hold the
/// write side for its whole lifetime. Ideal for testing or when persistence is not
/// required.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryLedger {
    async fn store_transaction(&self, tx: Transaction) -> Result<()> {
        let mut state = self.state.write().await;
        state.transactions.insert(tx.id.clone(), tx);
        Ok(())
    }

    async fn get_transaction(&self, tx_id: &str) -> Result<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state.transactions.get(tx_id).cloned())
    }

    async fn list_retryable(&self) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut pending: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|tx| tx.awaiting_retry())
            .cloned()
            .collect();
        pending.sort_by_key(|tx| tx.metadata.next_retry_at.unwrap_or(tx.created_at));
        Ok(pending)
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut transactions: Vec<Transaction> = state.transactions.values().cloned().collect();
        transactions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(transactions)
    }
}

#[async_trait]
impl WalletStore for InMemoryLedger {
    async fn open_wallet(&self, wallet: Wallet) -> Result<()> {
        let mut state = self.state.write().await;
        if state.wallets.contains_key(&wallet.id) {
            return Err(RetryError::Validation(format!(
                "Wallet {} already exists",
                wallet.id
            )));
        }
        state.wallets.insert(wallet.id.clone(), wallet);
        Ok(())
    }

    async fn get_wallet(&self, wallet_id: &str) -> Result<Option<Wallet>> {
        let state = self.state.read().await;
        Ok(state.wallets.get(wallet_id).cloned())
    }

    async fn adjust_balance(&self, wallet_id: &str, delta: BalanceDelta) -> Result<Balance> {
        let mut state = self.state.write().await;
        let wallet = state
            .wallets
            .get_mut(wallet_id)
            .ok_or_else(|| RetryError::NotFound(format!("wallet {wallet_id}")))?;
        wallet.apply(delta)
    }

    async fn all_wallets(&self) -> Result<Vec<Wallet>> {
        let state = self.state.read().await;
        let mut wallets: Vec<Wallet> = state.wallets.values().cloned().collect();
        wallets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(wallets)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().write_owned().await;
        Ok(Box::new(InMemoryUnit {
            guard,
            transactions: HashMap::new(),
            wallets: HashMap::new(),
        }))
    }
}

/// Atomic unit over the in-memory ledger.
///
/// Holds the ledger's write lock until it is committed or dropped; changes are staged
/// locally and only written into the shared maps on commit.
struct InMemoryUnit {
    guard: OwnedRwLockWriteGuard<LedgerState>,
    transactions: HashMap<String, Transaction>,
    wallets: HashMap<String, Wallet>,
}

#[async_trait]
impl UnitOfWork for InMemoryUnit {
    async fn get_transaction(&mut self, tx_id: &str) -> Result<Option<Transaction>> {
        Ok(self
            .transactions
            .get(tx_id)
            .or_else(|| self.guard.transactions.get(tx_id))
            .cloned())
    }

    async fn get_wallet(&mut self, wallet_id: &str) -> Result<Option<Wallet>> {
        Ok(self
            .wallets
            .get(wallet_id)
            .or_else(|| self.guard.wallets.get(wallet_id))
            .cloned())
    }

    async fn store_transaction(&mut self, tx: Transaction) -> Result<()> {
        self.transactions.insert(tx.id.clone(), tx);
        Ok(())
    }

    async fn adjust_balance(&mut self, wallet_id: &str, delta: BalanceDelta) -> Result<Balance> {
        let mut wallet = match self.wallets.get(wallet_id) {
            Some(staged) => staged.clone(),
            None => self
                .guard
                .wallets
                .get(wallet_id)
                .cloned()
                .ok_or_else(|| RetryError::NotFound(format!("wallet {wallet_id}")))?,
        };
        let balance = wallet.apply(delta)?;
        self.wallets.insert(wallet.id.clone(), wallet);
        Ok(balance)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryUnit {
            mut guard,
            transactions,
            wallets,
        } = *self;
        guard.transactions.extend(transactions);
        guard.wallets.extend(wallets);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
