//! The single worker that drains the retry queue.
//!
//! Items become eligible strictly by `next_retry_at` and ready items run one at a
//! time in insertion order. When nothing is ready the worker sleeps until the
//! earliest item is due (bounded by `max_idle_wait`) or until the scheduler wakes
//! it. It exits once the queue is empty or `clear_queue` bumped the generation.

use super::scheduler::{RetryQueueItem, SchedulerInner};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[cfg_attr(test, derive(Debug))]
enum Next {
    Run(Vec<RetryQueueItem>),
    Wait(Duration),
    Stop,
}

pub(super) async fn run(inner: Arc<SchedulerInner>, generation: u64) {
    loop {
        let ready = match next_batch(&inner, generation).await {
            Next::Run(items) => items,
            Next::Wait(wait) => {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = inner.wake.notified() => {}
                }
                continue;
            }
            Next::Stop => return,
        };

        for item in ready {
            process_item(&inner, &item).await;

            let mut queue = inner.queue.lock().await;
            if queue.generation != generation {
                debug!(generation, "Queue cleared mid-batch, processor stopping");
                return;
            }
            queue
                .items
                .retain(|queued| queued.transaction_id != item.transaction_id);
        }

        tokio::time::sleep(inner.config.batch_pause).await;
    }
}

async fn next_batch(inner: &SchedulerInner, generation: u64) -> Next {
    let mut queue = inner.queue.lock().await;
    if queue.generation != generation {
        return Next::Stop;
    }
    if queue.items.is_empty() {
        queue.processing = false;
        debug!("Retry queue drained, processor stopping");
        return Next::Stop;
    }

    let now = Instant::now();
    let ready: Vec<RetryQueueItem> = queue
        .items
        .iter()
        .filter(|item| item.due <= now)
        .cloned()
        .collect();
    if !ready.is_empty() {
        return Next::Run(ready);
    }

    let wait = queue
        .items
        .iter()
        .map(|item| item.due.saturating_duration_since(now))
        .min()
        .unwrap_or_default()
        .min(inner.config.max_idle_wait);
    debug!(wait_ms = wait.as_millis() as u64, "No retry due yet");
    Next::Wait(wait)
}

/// Runs one attempt end to end. Failures are logged and recorded, never raised.
async fn process_item(inner: &SchedulerInner, item: &RetryQueueItem) {
    let mut tx = match inner.store.get_transaction(&item.transaction_id).await {
        Ok(Some(tx)) => tx,
        Ok(None) => {
            warn!(transaction_id = %item.transaction_id, "Queued transaction disappeared");
            return;
        }
        Err(e) => {
            error!(transaction_id = %item.transaction_id, error = %e, "Failed to reload queued transaction");
            return;
        }
    };
    if tx.is_terminal() {
        info!(
            transaction_id = %tx.id,
            status = %tx.status,
            "Transaction settled elsewhere, skipping retry"
        );
        return;
    }

    if let Err(e) = inner
        .recorder
        .record_attempt_start(&mut tx, item.retry_attempt, &item.reason)
        .await
    {
        error!(transaction_id = %tx.id, attempt = item.retry_attempt, error = %e, "Could not start retry attempt");
        return;
    }

    info!(
        transaction_id = %tx.id,
        category = %tx.category(),
        attempt = item.retry_attempt,
        "Processing retry"
    );
    let outcome = inner.dispatcher.dispatch(&tx).await;

    let recorded = if outcome.is_success() {
        inner.recorder.mark_retry_success(&mut tx, &outcome).await
    } else {
        inner
            .recorder
            .mark_retry_failed(&mut tx, &outcome, item.retry_attempt)
            .await
    };
    if let Err(e) = recorded {
        error!(transaction_id = %tx.id, error = %e, "Failed to record retry outcome");
    }
}
