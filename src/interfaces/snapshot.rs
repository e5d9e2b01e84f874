//! JSON seed file for populating a ledger before a retry run.
//!
//! ```json
//! {
//!   "wallets": [{ "id": "alice", "balance": "100" }],
//!   "transactions": [{ "id": "fund-1", "status": "failed", "category": "funding", ... }]
//! }
//! ```

use crate::domain::ports::LedgerStore;
use crate::domain::transaction::Transaction;
use crate::domain::wallet::{Wallet, WalletId};
use crate::error::{Result, RetryError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use tracing::{debug, info};

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct WalletSeed {
    pub id: WalletId,
    pub balance: Decimal,
}

#[derive(Debug, Deserialize, PartialEq, Clone, Default)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub wallets: Vec<WalletSeed>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct SeedReport {
    pub wallets_opened: usize,
    pub transactions_stored: usize,
}

impl LedgerSnapshot {
    pub fn from_reader<R: Read>(source: R) -> Result<Self> {
        Ok(serde_json::from_reader(source)?)
    }

    /// Writes the snapshot into the store without overwriting anything already
    /// there, so reseeding a persistent ledger keeps its balances and retry state.
    pub async fn seed(self, store: &dyn LedgerStore) -> Result<SeedReport> {
        let mut report = SeedReport::default();

        for seed in self.wallets {
            match store.open_wallet(Wallet::open(seed.id.clone(), seed.balance)).await {
                Ok(()) => report.wallets_opened += 1,
                Err(RetryError::Validation(_)) => {
                    debug!(wallet_id = %seed.id, "Wallet already present, keeping stored balance");
                }
                Err(e) => return Err(e),
            }
        }

        for tx in self.transactions {
            if store.get_transaction(&tx.id).await?.is_some() {
                debug!(transaction_id = %tx.id, "Transaction already present, keeping stored record");
                continue;
            }
            store.store_transaction(tx).await?;
            report.transactions_stored += 1;
        }

        info!(
            wallets = report.wallets_opened,
            transactions = report.transactions_stored,
            "Ledger seeded"
        );
        Ok(report)
    }
}
