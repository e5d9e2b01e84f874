use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::transaction::TransactionStatus;

#[derive(Error, Debug)]
pub enum RetryError {
    #[error("Transaction not found: {0}")]
    NotFound(String),
    #[error("Transaction {id} cannot be retried in its current state: {reason}")]
    InvalidState { id: String, reason: String },
    #[error("Transaction {id} has used all {max_attempts} retry attempts")]
    RetriesExhausted { id: String, max_attempts: u32 },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Insufficient funds in wallet {wallet}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        wallet: String,
        balance: Decimal,
        requested: Decimal,
    },
    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),
    #[error("Atomic unit aborted: {0}")]
    Transactional(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RetryError {
    pub(crate) fn invalid_status(id: &str, status: TransactionStatus) -> Self {
        Self::InvalidState {
            id: id.to_string(),
            reason: format!("status is {status}, expected failed or pending"),
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for RetryError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Failures reported by (or while talking to) an external settlement provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettlementError {
    #[error("{0}")]
    Rejected(String),
    #[error("settlement call timed out after {0}ms")]
    Timeout(u128),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("settlement provider unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, RetryError>;
