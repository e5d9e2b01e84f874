use super::{SettlementOutcome, SettlementStrategy, call_with_timeout};
use crate::application::ledger::LedgerMutator;
use crate::domain::ports::{
    LedgerStoreRef, SettlementClientRef, SettlementOperation, SettlementRequest,
};
use crate::domain::transaction::{Category, SettlementDetails, Transaction};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};

/// Settles categories that pay an external provider out of the wallet:
/// withdrawals, service payments and bets.
///
/// The wallet must cover the amount before the provider is called, and is debited
/// only after the provider accepts.
pub struct DebitStrategy {
    category: Category,
    operation: SettlementOperation,
    store: LedgerStoreRef,
    ledger: LedgerMutator,
    client: SettlementClientRef,
    timeout: Duration,
}

impl DebitStrategy {
    pub fn withdrawal(
        store: LedgerStoreRef,
        ledger: LedgerMutator,
        client: SettlementClientRef,
        timeout: Duration,
    ) -> Self {
        Self::build(Category::Withdrawal, SettlementOperation::BankTransfer, store, ledger, client, timeout)
    }

    pub fn payment(
        store: LedgerStoreRef,
        ledger: LedgerMutator,
        client: SettlementClientRef,
        timeout: Duration,
    ) -> Self {
        Self::build(Category::Payment, SettlementOperation::ServicePayment, store, ledger, client, timeout)
    }

    pub fn betting(
        store: LedgerStoreRef,
        ledger: LedgerMutator,
        client: SettlementClientRef,
        timeout: Duration,
    ) -> Self {
        Self::build(Category::Betting, SettlementOperation::PlaceBet, store, ledger, client, timeout)
    }

    fn build(
        category: Category,
        operation: SettlementOperation,
        store: LedgerStoreRef,
        ledger: LedgerMutator,
        client: SettlementClientRef,
        timeout: Duration,
    ) -> Self {
        Self {
            category,
            operation,
            store,
            ledger,
            client,
            timeout,
        }
    }

    /// Category payload forwarded to the provider, or the precondition that failed.
    fn provider_details(
        &self,
        tx: &Transaction,
    ) -> std::result::Result<Option<serde_json::Value>, String> {
        let payload = match &tx.details {
            SettlementDetails::Withdrawal { bank } => bank.as_ref().map(serde_json::to_value),
            SettlementDetails::Payment { service } => service.as_ref().map(serde_json::to_value),
            SettlementDetails::Betting { bet: Some(bet) } => Some(serde_json::to_value(bet)),
            SettlementDetails::Betting { bet: None } => {
                return Err("Bet slip required for betting retry".to_string());
            }
            other => {
                return Err(format!(
                    "{} transaction routed to {} settlement",
                    other.category(),
                    self.category
                ));
            }
        };
        payload.transpose().map_err(|e| e.to_string())
    }
}

#[async_trait]
impl SettlementStrategy for DebitStrategy {
    fn category(&self) -> Category {
        self.category
    }

    async fn settle(&self, tx: &Transaction) -> Result<SettlementOutcome> {
        let details = match self.provider_details(tx) {
            Ok(details) => details,
            Err(reason) => return Ok(SettlementOutcome::failed(reason)),
        };

        let Some(wallet) = self.store.get_wallet(&tx.wallet_id).await? else {
            return Ok(SettlementOutcome::failed(format!(
                "Wallet {} not found",
                tx.wallet_id
            )));
        };
        if !wallet.balance().covers(tx.amount) {
            return Ok(SettlementOutcome::failed(format!(
                "Insufficient wallet balance: {} available, {} required",
                wallet.balance(),
                tx.amount
            )));
        }

        let request = SettlementRequest {
            operation: self.operation,
            transaction_id: tx.id.clone(),
            wallet_id: tx.wallet_id.clone(),
            category: self.category,
            amount: tx.amount,
            reference: None,
            details,
        };
        let receipt = call_with_timeout(&self.client, request, self.timeout).await?;
        if !receipt.success {
            return Ok(SettlementOutcome::failed(format!(
                "{} provider declined: {}",
                self.category,
                receipt.error_code.as_deref().unwrap_or("no error code")
            )));
        }

        let balance = match self.ledger.debit(&tx.wallet_id, tx.amount).await {
            Ok(balance) => balance,
            Err(e) => {
                error!(
                    transaction_id = %tx.id,
                    provider_reference = ?receipt.reference,
                    error = %e,
                    "Provider accepted but wallet debit failed"
                );
                return Err(e);
            }
        };
        info!(transaction_id = %tx.id, category = %self.category, %balance, "Provider settled and wallet debited");

        Ok(SettlementOutcome::settled(json!({
            "provider_reference": receipt.reference,
            "balance": balance.to_string(),
        })))
    }
}
