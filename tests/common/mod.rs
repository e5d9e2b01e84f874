#![allow(dead_code)]

use async_trait::async_trait;
use retry_engine::application::scheduler::RetryScheduler;
use retry_engine::application::settlement::{SettlementClients, SettlementDispatcher};
use retry_engine::config::RetryConfig;
use retry_engine::domain::ports::{
    SettlementClient, SettlementReceipt, SettlementRequest, TransactionStore, WalletStore,
};
use retry_engine::domain::transaction::{
    SettlementDetails, Transaction, TransactionStatus, TransferLeg,
};
use retry_engine::domain::wallet::{Amount, Balance, Wallet};
use retry_engine::error::SettlementError;
use retry_engine::infrastructure::in_memory::InMemoryLedger;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Deterministic settlement provider. Replies from a script, then accepts
/// everything once the script runs out.
#[derive(Default)]
pub struct ScriptedClient {
    script: Mutex<VecDeque<Result<SettlementReceipt, SettlementError>>>,
    calls: Mutex<Vec<SettlementRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, response: Result<SettlementReceipt, SettlementError>) -> Self {
        self.script.lock().unwrap().push_back(response);
        self
    }

    pub fn declining(times: usize, code: &str) -> Self {
        (0..times).fold(Self::new(), |client, _| {
            client.then(Ok(SettlementReceipt::declined(code)))
        })
    }

    pub fn calls(&self) -> Vec<SettlementRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SettlementClient for ScriptedClient {
    async fn call(&self, request: SettlementRequest) -> Result<SettlementReceipt, SettlementError> {
        let reference = format!("prov-{}", request.transaction_id);
        self.calls.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(SettlementReceipt::accepted(reference)))
    }
}

/// Provider that takes `delay` to accept each call and remembers the highest
/// number of calls it ever saw in flight at once.
pub struct SlowClient {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl SlowClient {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettlementClient for SlowClient {
    async fn call(&self, request: SettlementRequest) -> Result<SettlementReceipt, SettlementError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(SettlementReceipt::accepted(format!("prov-{}", request.transaction_id)))
    }
}

/// Config with millisecond backoff so scenarios drain quickly.
pub fn fast_config() -> RetryConfig {
    RetryConfig {
        backoff_schedule: vec![Duration::from_millis(5)],
        max_idle_wait: Duration::from_millis(50),
        batch_pause: Duration::from_millis(1),
        settlement_timeout: Duration::from_millis(500),
        ..RetryConfig::default()
    }
}

pub struct Harness {
    pub store: Arc<InMemoryLedger>,
    pub client: Arc<ScriptedClient>,
    pub scheduler: RetryScheduler,
}

impl Harness {
    pub fn new(config: RetryConfig, client: ScriptedClient) -> Self {
        let store = Arc::new(InMemoryLedger::new());
        let client = Arc::new(client);
        let dispatcher = SettlementDispatcher::new(
            store.clone(),
            SettlementClients::uniform(client.clone()),
            &config,
        );
        let scheduler = RetryScheduler::new(store.clone(), dispatcher, config);
        Self {
            store,
            client,
            scheduler,
        }
    }

    pub async fn with_wallets(self, wallets: &[(&str, Decimal)]) -> Self {
        for (id, balance) in wallets {
            self.store
                .open_wallet(Wallet::open(*id, *balance))
                .await
                .unwrap();
        }
        self
    }

    pub async fn insert(&self, tx: Transaction) {
        self.store.store_transaction(tx).await.unwrap();
    }

    pub async fn transaction(&self, id: &str) -> Transaction {
        self.store.get_transaction(id).await.unwrap().unwrap()
    }

    pub async fn balance(&self, wallet: &str) -> Balance {
        self.store.get_wallet(wallet).await.unwrap().unwrap().balance()
    }

    /// Enqueues and waits for the processor to finish the attempt.
    pub async fn retry(&self, id: &str, reason: &str) {
        self.scheduler.enqueue(id, reason).await.unwrap();
        self.scheduler.wait_until_idle().await;
    }
}

pub fn failed(id: &str, wallet: &str, amount: Decimal, details: SettlementDetails) -> Transaction {
    let mut tx = Transaction::new(id, wallet, Amount::new(amount).unwrap(), details);
    tx.status = TransactionStatus::Failed;
    tx
}

pub fn funding(id: &str, wallet: &str, amount: Decimal) -> Transaction {
    failed(
        id,
        wallet,
        amount,
        SettlementDetails::Funding {
            gateway_reference: Some(format!("gw-{id}")),
        },
    )
}

/// Both legs of a failed transfer of `amount` from `sender` to `receiver`.
pub fn transfer_legs(
    id: &str,
    sender: &str,
    receiver: &str,
    amount: Decimal,
) -> (Transaction, Transaction) {
    let out_id = format!("{id}-out");
    let in_id = format!("{id}-in");
    let outgoing = failed(
        &out_id,
        sender,
        amount,
        SettlementDetails::Transfer {
            related_transaction_id: Some(in_id.clone()),
            leg: TransferLeg::Outgoing,
        },
    );
    let incoming = failed(
        &in_id,
        receiver,
        amount,
        SettlementDetails::Transfer {
            related_transaction_id: Some(out_id),
            leg: TransferLeg::Incoming,
        },
    );
    (outgoing, incoming)
}
