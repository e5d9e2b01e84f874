mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use common::{Harness, ScriptedClient, fast_config, funding};
use predicates::prelude::*;
use retry_engine::config::RetryConfig;
use retry_engine::domain::transaction::TransactionStatus;
use retry_engine::domain::wallet::Balance;
use rust_decimal_macros::dec;
use std::io::Write;
use std::process::Command;
use std::time::Duration;

#[test]
fn test_malformed_csv_handling() {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    csv.write_all(b"transaction,reason\n").unwrap();
    // Not UTF-8
    csv.write_all(b"\xff\xfe,garbage\n").unwrap();
    csv.write_all(b"t1-out,ledger lock timeout\n").unwrap();
    csv.flush().unwrap();

    let mut cmd = Command::new(cargo_bin!("retry-engine"));
    cmd.env("RETRY_BACKOFF_MS", "0")
        .env("RUST_LOG", "info")
        .arg(csv.path())
        .arg("--seed")
        .arg("tests/fixtures/snapshot.json");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading retry request"))
        .stdout(predicate::str::contains("alice,60"))
        .stdout(predicate::str::contains("bob,40"));
}

#[test]
fn test_empty_request_file_still_prints_wallets() {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "transaction,reason").unwrap();

    let mut cmd = Command::new(cargo_bin!("retry-engine"));
    cmd.arg(csv.path())
        .arg("--seed")
        .arg("tests/fixtures/snapshot.json");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("alice,100"))
        .stdout(predicate::str::contains("bob,0"));
}

#[tokio::test]
async fn test_concurrent_enqueues_create_one_item() {
    let config = RetryConfig {
        backoff_schedule: vec![Duration::from_secs(60)],
        ..fast_config()
    };
    let harness = Harness::new(config, ScriptedClient::new())
        .with_wallets(&[("w1", dec!(0))])
        .await;
    harness.insert(funding("fund-1", "w1", dec!(10))).await;

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let scheduler = harness.scheduler.clone();
            tokio::spawn(async move { scheduler.enqueue("fund-1", &format!("caller {i}")).await })
        })
        .collect();
    for handle in handles {
        let enqueued = handle.await.unwrap().unwrap();
        assert_eq!(enqueued.retry_attempt, 1);
    }

    let status = harness.scheduler.queue_status().await;
    assert_eq!(status.queue_length, 1);
    assert!(status.is_processing);

    harness.scheduler.clear_queue().await;
    harness.scheduler.wait_until_idle().await;
    assert!(harness.client.calls().is_empty());
}

#[tokio::test]
async fn test_many_transactions_drain_in_one_run() {
    let harness = Harness::new(fast_config(), ScriptedClient::new())
        .with_wallets(&[("w1", dec!(0))])
        .await;
    let ids: Vec<String> = (0..50).map(|i| format!("fund-{i:02}")).collect();
    for id in &ids {
        harness.insert(funding(id, "w1", dec!(2))).await;
        harness.scheduler.enqueue(id, "batch").await.unwrap();
    }

    harness.scheduler.wait_until_idle().await;

    assert_eq!(harness.balance("w1").await, Balance::new(dec!(100)));
    for id in &ids {
        assert_eq!(harness.transaction(id).await.status, TransactionStatus::Completed);
    }
    assert_eq!(harness.client.calls().len(), 50);
}
