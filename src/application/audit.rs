use super::settlement::SettlementOutcome;
use crate::domain::ports::LedgerStoreRef;
use crate::domain::transaction::{AttemptStatus, RetryHistoryEntry, Transaction, TransactionStatus};
use crate::error::{Result, RetryError};
use chrono::Utc;
use tracing::{info, warn};

/// Writes retry bookkeeping onto transaction records.
///
/// Every method mutates the caller's copy of the transaction and persists the
/// whole record, so the caller's copy always matches what is stored.
#[derive(Clone)]
pub struct AuditRecorder {
    store: LedgerStoreRef,
    max_attempts: u32,
}

impl AuditRecorder {
    pub fn new(store: LedgerStoreRef, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    /// Moves the transaction to `pending` and opens a new history entry for `retry_attempt`.
    pub async fn record_attempt_start(
        &self,
        tx: &mut Transaction,
        retry_attempt: u32,
        reason: &str,
    ) -> Result<()> {
        if retry_attempt == 0 || retry_attempt > self.max_attempts {
            return Err(RetryError::RetriesExhausted {
                id: tx.id.clone(),
                max_attempts: self.max_attempts,
            });
        }

        let now = Utc::now();
        tx.status = TransactionStatus::Pending;
        tx.metadata.retry_count = retry_attempt;
        tx.metadata.last_retry_at = Some(now);
        tx.metadata.retry_reason = Some(reason.to_string());
        tx.metadata.next_retry_at = None;
        tx.metadata.retry_history.push(RetryHistoryEntry {
            attempt: retry_attempt,
            timestamp: now,
            reason: reason.to_string(),
            status: None,
            error: None,
            response: None,
        });

        self.store.store_transaction(tx.clone()).await
    }

    /// Marks the transaction `completed`. Calling it on an already completed
    /// transaction changes nothing.
    pub async fn mark_retry_success(
        &self,
        tx: &mut Transaction,
        outcome: &SettlementOutcome,
    ) -> Result<()> {
        if tx.status == TransactionStatus::Completed {
            warn!(transaction_id = %tx.id, "Transaction already completed, ignoring success");
            return Ok(());
        }

        tx.status = TransactionStatus::Completed;
        tx.completed_at = Some(Utc::now());
        tx.metadata.next_retry_at = None;
        if let Some(entry) = tx.metadata.retry_history.last_mut() {
            entry.status = Some(AttemptStatus::Success);
            entry.response = outcome.response().cloned();
        }

        info!(
            transaction_id = %tx.id,
            attempt = tx.metadata.retry_count,
            "Retry succeeded"
        );
        self.store.store_transaction(tx.clone()).await
    }

    /// Records a failed attempt. Once `retry_attempt` reaches the attempt limit the
    /// transaction becomes terminally failed and needs manual intervention.
    pub async fn mark_retry_failed(
        &self,
        tx: &mut Transaction,
        outcome: &SettlementOutcome,
        retry_attempt: u32,
    ) -> Result<()> {
        if tx.status == TransactionStatus::Completed {
            warn!(transaction_id = %tx.id, "Transaction already completed, ignoring failure");
            return Ok(());
        }

        let error = outcome
            .error()
            .unwrap_or("settlement failed without a reason")
            .to_string();

        if let Some(entry) = tx.metadata.retry_history.last_mut() {
            entry.status = Some(AttemptStatus::Failed);
            entry.error = Some(error.clone());
        }
        tx.status = TransactionStatus::Failed;
        tx.metadata.next_retry_at = None;

        if retry_attempt >= self.max_attempts {
            tx.failed_at = Some(Utc::now());
            tx.metadata.retry_exhausted = true;
            tx.metadata.final_failure_reason = Some(error.clone());
            warn!(
                transaction_id = %tx.id,
                attempt = retry_attempt,
                error = %error,
                "Retries exhausted, manual intervention required"
            );
        } else {
            info!(
                transaction_id = %tx.id,
                attempt = retry_attempt,
                max_attempts = self.max_attempts,
                error = %error,
                "Retry attempt failed"
            );
        }

        self.store.store_transaction(tx.clone()).await
    }
}
