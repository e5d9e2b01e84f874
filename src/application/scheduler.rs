use super::audit::AuditRecorder;
use super::processor;
use super::settlement::{SettlementDispatcher, SettlementOutcome};
use crate::config::RetryConfig;
use crate::domain::ports::LedgerStoreRef;
use crate::domain::transaction::{Transaction, TransactionId};
use crate::error::{Result, RetryError};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const INTERRUPTED_ATTEMPT: &str = "attempt interrupted before completion";

/// Stand-in deadline for delays too large to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// A transaction waiting for its next retry attempt.
#[derive(Debug, Clone)]
pub struct RetryQueueItem {
    pub transaction_id: TransactionId,
    /// Snapshot taken at enqueue time. The processor reloads before acting.
    pub transaction: Transaction,
    /// 1-based number of the attempt this item will run.
    pub retry_attempt: u32,
    pub queued_at: DateTime<Utc>,
    pub reason: String,
    pub next_retry_at: DateTime<Utc>,
    /// `next_retry_at` on the runtime clock, which is what the processor sleeps on.
    pub(super) due: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Enqueued {
    pub retry_attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingItem {
    pub transaction_id: TransactionId,
    pub retry_attempt: u32,
    pub next_retry_at: DateTime<Utc>,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    pub queue_length: usize,
    pub is_processing: bool,
    pub pending_items: Vec<PendingItem>,
}

#[derive(Default)]
pub(super) struct QueueState {
    /// Insertion order is the processing order among ready items.
    pub(super) items: Vec<RetryQueueItem>,
    pub(super) processing: bool,
    pub(super) worker: Option<JoinHandle<()>>,
    /// Bumped by `clear_queue`; a worker from an older generation stops.
    pub(super) generation: u64,
}

pub(super) struct SchedulerInner {
    pub(super) store: LedgerStoreRef,
    pub(super) dispatcher: SettlementDispatcher,
    pub(super) recorder: AuditRecorder,
    pub(super) config: RetryConfig,
    pub(super) queue: Mutex<QueueState>,
    pub(super) wake: Notify,
}

impl SchedulerInner {
    pub(super) fn new(
        store: LedgerStoreRef,
        dispatcher: SettlementDispatcher,
        config: RetryConfig,
    ) -> Self {
        let recorder = AuditRecorder::new(store.clone(), config.max_attempts);
        Self {
            store,
            dispatcher,
            recorder,
            config,
            queue: Mutex::new(QueueState::default()),
            wake: Notify::new(),
        }
    }
}

/// Schedules failed transactions for retry and owns the single worker that drains
/// the queue.
///
/// Cheap to clone; clones share the same queue. The queue itself is a cache over
/// the retry metadata persisted on each transaction and can be rebuilt with
/// [`RetryScheduler::rehydrate`].
///
/// The queue lock is held from the moment a transaction is read until it is
/// queued. The processor removes an item only after its outcome is recorded, so
/// `enqueue` either sees the item or sees the recorded outcome.
#[derive(Clone)]
pub struct RetryScheduler {
    inner: Arc<SchedulerInner>,
}

impl RetryScheduler {
    pub fn new(store: LedgerStoreRef, dispatcher: SettlementDispatcher, config: RetryConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner::new(store, dispatcher, config)),
        }
    }

    /// Schedules the next retry attempt of a failed or stuck transaction.
    ///
    /// Enqueueing a transaction that is already queued creates nothing new and
    /// returns the attempt number already scheduled.
    pub async fn enqueue(&self, transaction_id: &str, reason: &str) -> Result<Enqueued> {
        let mut queue = self.inner.queue.lock().await;

        if let Some(retry_attempt) = queued_attempt(&queue, transaction_id) {
            debug!(transaction_id, retry_attempt, "Already queued");
            self.ensure_processor(&mut queue);
            return Ok(Enqueued { retry_attempt });
        }

        let tx = self
            .inner
            .store
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| RetryError::NotFound(transaction_id.to_string()))?;
        self.check_retryable(&tx)?;

        match self.inner.store.get_wallet(&tx.wallet_id).await? {
            Some(wallet) => debug!(
                transaction_id,
                wallet_id = %wallet.id,
                balance = %wallet.balance(),
                "Loaded owning wallet"
            ),
            None => warn!(transaction_id, wallet_id = %tx.wallet_id, "Owning wallet not found"),
        }

        self.schedule(&mut queue, tx, reason, None).await
    }

    fn check_retryable(&self, tx: &Transaction) -> Result<()> {
        if !tx.status.is_retryable() {
            return Err(RetryError::invalid_status(&tx.id, tx.status));
        }
        if tx.metadata.retry_exhausted || tx.metadata.retry_count >= self.inner.config.max_attempts {
            return Err(RetryError::RetriesExhausted {
                id: tx.id.clone(),
                max_attempts: self.inner.config.max_attempts,
            });
        }
        let category = tx.category();
        if !self.inner.dispatcher.supports(category) {
            return Err(RetryError::InvalidState {
                id: tx.id.clone(),
                reason: format!("category {category} is not enabled for automatic retry"),
            });
        }
        Ok(())
    }

    /// Inserts a queue item for a validated transaction that is not queued yet.
    /// `due` keeps a previously persisted schedule; otherwise the backoff schedule
    /// decides.
    async fn schedule(
        &self,
        queue: &mut QueueState,
        mut tx: Transaction,
        reason: &str,
        due: Option<DateTime<Utc>>,
    ) -> Result<Enqueued> {
        let now = Utc::now();
        let retry_count = tx.metadata.retry_count;
        let retry_attempt = retry_count + 1;
        let (next_retry_at, delay) = match due {
            Some(at) => (at, (at - now).to_std().unwrap_or_default()),
            None => {
                let delay = self.inner.config.backoff_for(retry_count);
                (after(now, delay), delay)
            }
        };
        let clock = Instant::now();
        let deadline = clock
            .checked_add(delay)
            .unwrap_or_else(|| clock + FAR_FUTURE);

        tx.metadata.next_retry_at = Some(next_retry_at);
        tx.metadata.retry_reason = Some(reason.to_string());
        self.inner.store.store_transaction(tx.clone()).await?;

        info!(
            transaction_id = %tx.id,
            retry_attempt,
            %next_retry_at,
            reason,
            "Retry scheduled"
        );
        queue.items.push(RetryQueueItem {
            transaction_id: tx.id.clone(),
            transaction: tx,
            retry_attempt,
            queued_at: now,
            reason: reason.to_string(),
            next_retry_at,
            due: deadline,
        });

        self.ensure_processor(queue);
        self.inner.wake.notify_one();

        Ok(Enqueued { retry_attempt })
    }

    fn ensure_processor(&self, queue: &mut QueueState) {
        if queue.processing {
            return;
        }
        queue.processing = true;
        let generation = queue.generation;
        let inner = self.inner.clone();
        // A worker stopped by `clear_queue` may still be finishing its attempt.
        let previous = queue.worker.take();
        queue.worker = Some(tokio::spawn(async move {
            if let Some(previous) = previous
                && let Err(e) = previous.await
            {
                error!(error = %e, "Previous retry processor task failed");
            }
            processor::run(inner, generation).await;
        }));
        debug!(generation, "Retry processor started");
    }

    /// Snapshot of the queue. Changes nothing.
    pub async fn queue_status(&self) -> QueueStatus {
        let queue = self.inner.queue.lock().await;
        QueueStatus {
            queue_length: queue.items.len(),
            is_processing: queue.processing,
            pending_items: queue
                .items
                .iter()
                .map(|item| PendingItem {
                    transaction_id: item.transaction_id.clone(),
                    retry_attempt: item.retry_attempt,
                    next_retry_at: item.next_retry_at,
                    queued_at: item.queued_at,
                })
                .collect(),
        }
    }

    /// Drops every queued item and stops the processor. Persisted transactions
    /// are left alone. An attempt already in flight still finishes, and a worker
    /// started afterwards waits for it.
    pub async fn clear_queue(&self) {
        let mut queue = self.inner.queue.lock().await;
        let dropped = queue.items.len();
        queue.items.clear();
        queue.processing = false;
        queue.generation += 1;
        drop(queue);
        self.inner.wake.notify_one();
        info!(dropped, "Retry queue cleared");
    }

    /// Rebuilds the queue from persisted retry metadata after a restart.
    ///
    /// An attempt that was started but never recorded is closed as failed first;
    /// if it was the final allowed attempt the transaction is exhausted instead of
    /// re-queued. Returns the number of transactions queued.
    ///
    /// Meant for startup, before anything else has been enqueued.
    pub async fn rehydrate(&self) -> Result<usize> {
        let candidates = self.inner.store.list_retryable().await?;
        let mut queued = 0;

        for mut tx in candidates {
            let mut queue = self.inner.queue.lock().await;
            if queued_attempt(&queue, &tx.id).is_some() {
                continue;
            }

            if let Some(attempt) = tx.metadata.unfinished_attempt().map(|entry| entry.attempt) {
                warn!(transaction_id = %tx.id, attempt, "Closing attempt interrupted by restart");
                self.inner
                    .recorder
                    .mark_retry_failed(&mut tx, &SettlementOutcome::failed(INTERRUPTED_ATTEMPT), attempt)
                    .await?;
                if tx.metadata.retry_exhausted {
                    continue;
                }
            }

            if let Err(e) = self.check_retryable(&tx) {
                warn!(transaction_id = %tx.id, error = %e, "Not re-queueing transaction");
                continue;
            }

            let reason = tx
                .metadata
                .retry_reason
                .clone()
                .unwrap_or_else(|| "rehydrated".to_string());
            let due = tx.metadata.next_retry_at;
            self.schedule(&mut queue, tx, &reason, due).await?;
            queued += 1;
        }

        if queued > 0 {
            info!(queued, "Retry queue rehydrated");
        }
        Ok(queued)
    }

    /// Waits until the processor has drained the queue and exited.
    pub async fn wait_until_idle(&self) {
        loop {
            let worker = self.inner.queue.lock().await.worker.take();
            let Some(worker) = worker else {
                return;
            };
            if let Err(e) = worker.await {
                error!(error = %e, "Retry processor task failed");
            }
        }
    }
}

fn queued_attempt(queue: &QueueState, transaction_id: &str) -> Option<u32> {
    queue
        .items
        .iter()
        .find(|item| item.transaction_id == transaction_id)
        .map(|item| item.retry_attempt)
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
