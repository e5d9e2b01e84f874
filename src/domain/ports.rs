use super::transaction::{Category, Transaction, TransactionId};
use super::wallet::{Amount, Balance, BalanceDelta, Wallet, WalletId};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Inserts or replaces the whole transaction record.
    async fn store_transaction(&self, tx: Transaction) -> Result<()>;
    async fn get_transaction(&self, tx_id: &str) -> Result<Option<Transaction>>;
    /// Non-terminal transactions that were scheduled for, or were in the middle of, a retry.
    async fn list_retryable(&self) -> Result<Vec<Transaction>>;
    /// Every transaction, ordered by id.
    async fn all_transactions(&self) -> Result<Vec<Transaction>>;
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Creates a wallet. Fails if a wallet with the same id already exists.
    async fn open_wallet(&self, wallet: Wallet) -> Result<()>;
    async fn get_wallet(&self, wallet_id: &str) -> Result<Option<Wallet>>;
    /// Atomically applies a signed delta and returns the new balance.
    async fn adjust_balance(&self, wallet_id: &str, delta: BalanceDelta) -> Result<Balance>;
    async fn all_wallets(&self) -> Result<Vec<Wallet>>;
}

/// A store-level atomic unit spanning transactions and wallets.
///
/// Nothing staged in a unit is visible outside it until `commit` succeeds.
/// Dropping a unit without committing discards every staged change.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn get_transaction(&mut self, tx_id: &str) -> Result<Option<Transaction>>;
    async fn get_wallet(&mut self, wallet_id: &str) -> Result<Option<Wallet>>;
    async fn store_transaction(&mut self, tx: Transaction) -> Result<()>;
    async fn adjust_balance(&mut self, wallet_id: &str, delta: BalanceDelta) -> Result<Balance>;
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Backing store for the whole ledger: both record kinds plus atomic units over them.
#[async_trait]
pub trait LedgerStore: TransactionStore + WalletStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

/// The external call a settlement client is asked to perform.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOperation {
    ConfirmPayment,
    BankTransfer,
    ServicePayment,
    PlaceBet,
}

impl SettlementOperation {
    pub fn path(&self) -> &'static str {
        match self {
            Self::ConfirmPayment => "payments/confirm",
            Self::BankTransfer => "transfers/bank",
            Self::ServicePayment => "services/pay",
            Self::PlaceBet => "bets/place",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct SettlementRequest {
    pub operation: SettlementOperation,
    pub transaction_id: TransactionId,
    pub wallet_id: WalletId,
    pub category: Category,
    pub amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Category-specific payload (bank details, bet slip, service descriptor).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct SettlementReceipt {
    pub success: bool,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
}

impl SettlementReceipt {
    pub fn accepted(reference: impl Into<String>) -> Self {
        Self {
            success: true,
            reference: Some(reference.into()),
            error_code: None,
        }
    }

    pub fn declined(error_code: impl Into<String>) -> Self {
        Self {
            success: false,
            reference: None,
            error_code: Some(error_code.into()),
        }
    }
}

/// An external settlement provider (payment gateway, bank, VTU service, betting platform).
#[async_trait]
pub trait SettlementClient: Send + Sync {
    async fn call(
        &self,
        request: SettlementRequest,
    ) -> std::result::Result<SettlementReceipt, SettlementError>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type SettlementClientRef = Arc<dyn SettlementClient>;
