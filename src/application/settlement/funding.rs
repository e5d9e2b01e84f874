use super::{SettlementOutcome, SettlementStrategy, call_with_timeout};
use crate::application::ledger::LedgerMutator;
use crate::domain::ports::{SettlementClientRef, SettlementOperation, SettlementRequest};
use crate::domain::transaction::{Category, Transaction};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::info;

/// Confirms a gateway payment by reference, then credits the wallet.
pub struct FundingStrategy {
    ledger: LedgerMutator,
    client: SettlementClientRef,
    timeout: Duration,
}

impl FundingStrategy {
    pub fn new(ledger: LedgerMutator, client: SettlementClientRef, timeout: Duration) -> Self {
        Self {
            ledger,
            client,
            timeout,
        }
    }
}

#[async_trait]
impl SettlementStrategy for FundingStrategy {
    fn category(&self) -> Category {
        Category::Funding
    }

    async fn settle(&self, tx: &Transaction) -> Result<SettlementOutcome> {
        let Some(reference) = tx.gateway_reference() else {
            return Ok(SettlementOutcome::failed(
                "Gateway reference required for funding retry",
            ));
        };

        let request = SettlementRequest {
            operation: SettlementOperation::ConfirmPayment,
            transaction_id: tx.id.clone(),
            wallet_id: tx.wallet_id.clone(),
            category: Category::Funding,
            amount: tx.amount,
            reference: Some(reference.to_string()),
            details: None,
        };
        let receipt = call_with_timeout(&self.client, request, self.timeout).await?;
        if !receipt.success {
            return Ok(SettlementOutcome::failed(format!(
                "Payment confirmation declined: {}",
                receipt.error_code.as_deref().unwrap_or("no error code")
            )));
        }

        let balance = self.ledger.credit(&tx.wallet_id, tx.amount).await?;
        info!(transaction_id = %tx.id, reference, %balance, "Funding confirmed and credited");

        Ok(SettlementOutcome::settled(json!({
            "gateway_reference": reference,
            "provider_reference": receipt.reference,
            "balance": balance.to_string(),
        })))
    }
}
