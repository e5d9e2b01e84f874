mod common;

use async_trait::async_trait;
use common::{Harness, ScriptedClient, SlowClient, fast_config, failed, funding};
use retry_engine::application::scheduler::RetryScheduler;
use retry_engine::application::settlement::{SettlementClients, SettlementDispatcher};
use retry_engine::config::RetryConfig;
use retry_engine::domain::ports::{
    LedgerStore, LedgerStoreRef, TransactionStore, UnitOfWork, WalletStore,
};
use retry_engine::domain::transaction::{SettlementDetails, Transaction, TransactionStatus};
use retry_engine::domain::wallet::{Balance, BalanceDelta, Wallet};
use retry_engine::error::{Result, RetryError};
use retry_engine::infrastructure::in_memory::InMemoryLedger;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

/// In-memory ledger whose wallet lookups are slow.
struct SlowWalletLedger {
    inner: InMemoryLedger,
    delay: Duration,
}

#[async_trait]
impl TransactionStore for SlowWalletLedger {
    async fn store_transaction(&self, tx: Transaction) -> Result<()> {
        self.inner.store_transaction(tx).await
    }

    async fn get_transaction(&self, tx_id: &str) -> Result<Option<Transaction>> {
        self.inner.get_transaction(tx_id).await
    }

    async fn list_retryable(&self) -> Result<Vec<Transaction>> {
        self.inner.list_retryable().await
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        self.inner.all_transactions().await
    }
}

#[async_trait]
impl WalletStore for SlowWalletLedger {
    async fn open_wallet(&self, wallet: Wallet) -> Result<()> {
        self.inner.open_wallet(wallet).await
    }

    async fn get_wallet(&self, wallet_id: &str) -> Result<Option<Wallet>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_wallet(wallet_id).await
    }

    async fn adjust_balance(&self, wallet_id: &str, delta: BalanceDelta) -> Result<Balance> {
        self.inner.adjust_balance(wallet_id, delta).await
    }

    async fn all_wallets(&self) -> Result<Vec<Wallet>> {
        self.inner.all_wallets().await
    }
}

#[async_trait]
impl LedgerStore for SlowWalletLedger {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        self.inner.begin().await
    }
}

fn scheduler_with(store: LedgerStoreRef, client: Arc<SlowClient>, config: RetryConfig) -> RetryScheduler {
    let dispatcher =
        SettlementDispatcher::new(store.clone(), SettlementClients::uniform(client), &config);
    RetryScheduler::new(store, dispatcher, config)
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_during_attempt_does_not_settle_twice() {
    let ledger = InMemoryLedger::new();
    ledger.open_wallet(Wallet::open("w1", dec!(0))).await.unwrap();
    ledger
        .store_transaction(funding("fund-c", "w1", dec!(100)))
        .await
        .unwrap();
    let store = Arc::new(SlowWalletLedger {
        inner: ledger.clone(),
        delay: Duration::from_millis(300),
    });
    let client = Arc::new(SlowClient::new(Duration::from_millis(100)));
    let scheduler = scheduler_with(store, client.clone(), fast_config());

    let first = scheduler.enqueue("fund-c", "gateway timeout").await.unwrap();
    assert_eq!(first.retry_attempt, 1);

    // The attempt is now with the provider
    tokio::time::sleep(Duration::from_millis(40)).await;
    match scheduler.enqueue("fund-c", "operator retry").await {
        Ok(again) => assert_eq!(again.retry_attempt, 1),
        Err(RetryError::InvalidState { .. }) => {}
        Err(e) => panic!("unexpected error: {e}"),
    }
    scheduler.wait_until_idle().await;

    let tx = ledger.get_transaction("fund-c").await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(tx.metadata.retry_count, 1);
    assert_eq!(tx.metadata.retry_history.len(), 1);
    assert_eq!(client.calls(), 1);
    assert_eq!(
        ledger.get_wallet("w1").await.unwrap().unwrap().balance(),
        Balance::new(dec!(100))
    );
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_after_clear_waits_for_attempt_in_flight() {
    let store = Arc::new(InMemoryLedger::new());
    store.open_wallet(Wallet::open("w1", dec!(0))).await.unwrap();
    store
        .store_transaction(funding("fund-x", "w1", dec!(10)))
        .await
        .unwrap();
    store
        .store_transaction(funding("fund-y", "w1", dec!(5)))
        .await
        .unwrap();
    let client = Arc::new(SlowClient::new(Duration::from_millis(300)));
    let scheduler = scheduler_with(store.clone(), client.clone(), fast_config());

    scheduler.enqueue("fund-x", "gateway timeout").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    scheduler.clear_queue().await;
    scheduler.enqueue("fund-y", "gateway timeout").await.unwrap();
    scheduler.wait_until_idle().await;

    assert_eq!(client.max_in_flight(), 1);
    assert_eq!(client.calls(), 2);
    for id in ["fund-x", "fund-y"] {
        let tx = store.get_transaction(id).await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed, "{id}");
    }
    assert_eq!(
        store.get_wallet("w1").await.unwrap().unwrap().balance(),
        Balance::new(dec!(15))
    );
}

#[tokio::test(start_paused = true)]
async fn test_sooner_item_wakes_sleeping_processor() {
    let config = RetryConfig {
        backoff_schedule: vec![Duration::from_secs(60), Duration::from_secs(1)],
        max_idle_wait: Duration::from_secs(120),
        ..fast_config()
    };
    let harness = Harness::new(config, ScriptedClient::new())
        .with_wallets(&[("w1", dec!(0))])
        .await;
    harness.insert(funding("fund-late", "w1", dec!(7))).await;
    let mut soon = failed(
        "fund-soon",
        "w1",
        dec!(3),
        SettlementDetails::Funding {
            gateway_reference: Some("gw-fund-soon".to_string()),
        },
    );
    soon.metadata.retry_count = 1;
    harness.insert(soon).await;

    harness.scheduler.enqueue("fund-late", "gateway timeout").await.unwrap();
    // Let the processor settle into its long wait
    tokio::time::sleep(Duration::from_millis(10)).await;
    harness.scheduler.enqueue("fund-soon", "gateway timeout").await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(
        harness.transaction("fund-soon").await.status,
        TransactionStatus::Completed
    );
    assert_eq!(
        harness.transaction("fund-late").await.status,
        TransactionStatus::Failed
    );
    assert_eq!(harness.balance("w1").await, Balance::new(dec!(3)));
    let status = harness.scheduler.queue_status().await;
    assert_eq!(status.queue_length, 1);
    assert_eq!(status.pending_items[0].transaction_id, "fund-late");

    harness.scheduler.clear_queue().await;
    harness.scheduler.wait_until_idle().await;
    assert_eq!(harness.client.calls().len(), 1);
}
