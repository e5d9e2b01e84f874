use super::{SettlementOutcome, SettlementStrategy};
use crate::domain::transaction::{Category, Transaction};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::json;

/// Marks the transaction settled without calling anyone or touching a wallet.
///
/// Only reachable when `generic` is on the allow-list.
pub struct GenericStrategy;

#[async_trait]
impl SettlementStrategy for GenericStrategy {
    fn category(&self) -> Category {
        Category::Generic
    }

    async fn settle(&self, tx: &Transaction) -> Result<SettlementOutcome> {
        Ok(SettlementOutcome::settled(json!({
            "transaction_id": tx.id,
            "ledger_effect": "none",
        })))
    }
}
