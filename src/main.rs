use clap::Parser;
use miette::{IntoDiagnostic, Result};
use retry_engine::application::scheduler::RetryScheduler;
use retry_engine::application::settlement::{SettlementClients, SettlementDispatcher};
use retry_engine::config::RetryConfig;
use retry_engine::domain::ports::{LedgerStoreRef, SettlementClientRef};
use retry_engine::infrastructure::http::{HttpSettlementClient, OfflineSettlementClient};
use retry_engine::infrastructure::in_memory::InMemoryLedger;
use retry_engine::interfaces::csv::retry_request_reader::RetryRequestReader;
use retry_engine::interfaces::csv::transaction_report_writer::TransactionReportWriter;
use retry_engine::interfaces::csv::wallet_writer::WalletWriter;
use retry_engine::interfaces::snapshot::LedgerSnapshot;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Retry requests CSV file (`transaction,reason`)
    input: PathBuf,

    /// JSON snapshot of wallets and transactions to seed the ledger with
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Base URL of the settlement provider. Without it every provider call fails.
    #[arg(long, env = "SETTLEMENT_URL")]
    settlement_url: Option<String>,

    /// Write a per-transaction retry report CSV to this path
    #[arg(long)]
    transactions_out: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .init();
}

fn open_store(db_path: Option<PathBuf>) -> Result<LedgerStoreRef> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = retry_engine::infrastructure::rocksdb::RocksDbLedger::open(path)
                .into_diagnostic()?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            warn!(
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Arc::new(InMemoryLedger::new()))
        }
        None => Ok(Arc::new(InMemoryLedger::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();
    let cli = Cli::parse();
    let config = RetryConfig::from_env();

    let store = open_store(cli.db_path)?;

    if let Some(seed) = cli.seed {
        let file = File::open(seed).into_diagnostic()?;
        let snapshot = LedgerSnapshot::from_reader(file).into_diagnostic()?;
        snapshot.seed(store.as_ref()).await.into_diagnostic()?;
    }

    let client: SettlementClientRef = match cli.settlement_url {
        Some(url) => {
            info!(%url, "Using HTTP settlement provider");
            Arc::new(HttpSettlementClient::new(url).into_diagnostic()?)
        }
        None => Arc::new(OfflineSettlementClient),
    };
    let dispatcher =
        SettlementDispatcher::new(store.clone(), SettlementClients::uniform(client), &config);
    let scheduler = RetryScheduler::new(store.clone(), dispatcher, config);

    scheduler.rehydrate().await.into_diagnostic()?;

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = RetryRequestReader::new(file);
    for request in reader.requests() {
        match request {
            Ok(request) => {
                if let Err(e) = scheduler
                    .enqueue(&request.transaction_id, request.reason())
                    .await
                {
                    warn!(transaction_id = %request.transaction_id, error = %e, "Retry request rejected");
                }
            }
            Err(e) => warn!(error = %e, "Error reading retry request"),
        }
    }

    scheduler.wait_until_idle().await;

    let wallets = store.all_wallets().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = WalletWriter::new(stdout.lock());
    writer.write_wallets(&wallets).into_diagnostic()?;

    if let Some(path) = cli.transactions_out {
        let transactions = store.all_transactions().await.into_diagnostic()?;
        let file = File::create(path).into_diagnostic()?;
        TransactionReportWriter::new(file)
            .write_transactions(&transactions)
            .into_diagnostic()?;
    }

    Ok(())
}
