use super::{SettlementOutcome, SettlementStrategy};
use crate::application::ledger::LedgerMutator;
use crate::domain::ports::{LedgerStoreRef, UnitOfWork};
use crate::domain::transaction::{
    Category, SettlementDetails, Transaction, TransactionStatus, TransferLeg,
};
use crate::domain::wallet::Direction;
use crate::error::{Result, RetryError};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

/// Moves money between two wallets and completes both legs of the transfer in
/// one atomic unit.
///
/// No external collaborator is involved. Everything happens inside a single
/// [`UnitOfWork`]; any failure discards the unit so neither wallet nor either leg
/// changes.
pub struct TransferStrategy {
    store: LedgerStoreRef,
    ledger: LedgerMutator,
}

impl TransferStrategy {
    pub fn new(store: LedgerStoreRef, ledger: LedgerMutator) -> Self {
        Self { store, ledger }
    }

    async fn settle_in_unit(
        &self,
        unit: &mut dyn UnitOfWork,
        tx: &Transaction,
    ) -> Result<SettlementOutcome> {
        let SettlementDetails::Transfer { leg, .. } = &tx.details else {
            return Ok(SettlementOutcome::failed(format!(
                "{} transaction routed to transfer settlement",
                tx.category()
            )));
        };

        let counterpart = match tx.related_transaction_id() {
            Some(related_id) => unit.get_transaction(related_id).await?,
            None => None,
        };
        let Some(mut counterpart) = counterpart else {
            return Ok(SettlementOutcome::failed("Related transaction not found"));
        };
        let mut current = unit
            .get_transaction(&tx.id)
            .await?
            .ok_or_else(|| RetryError::NotFound(tx.id.clone()))?;

        if counterpart.status == TransactionStatus::Completed {
            return Ok(SettlementOutcome::failed(format!(
                "Counterpart {} already completed without this leg",
                counterpart.id
            )));
        }
        if counterpart.amount != current.amount {
            return Ok(SettlementOutcome::failed(format!(
                "Transfer legs disagree on amount: {} vs {}",
                current.amount, counterpart.amount
            )));
        }

        let (sender, receiver) = match leg {
            TransferLeg::Outgoing => (current.wallet_id.clone(), counterpart.wallet_id.clone()),
            TransferLeg::Incoming => (counterpart.wallet_id.clone(), current.wallet_id.clone()),
        };

        let Some(sender_wallet) = unit.get_wallet(&sender).await? else {
            return Ok(SettlementOutcome::failed(format!(
                "Sender wallet {sender} not found"
            )));
        };
        if !sender_wallet.balance().covers(current.amount) {
            return Ok(SettlementOutcome::failed(format!(
                "Insufficient sender balance: {} available, {} required",
                sender_wallet.balance(),
                current.amount
            )));
        }

        let sender_balance = self
            .ledger
            .adjust_balance(&sender, current.amount, Direction::Debit, Some(&mut *unit))
            .await?;
        let receiver_balance = self
            .ledger
            .adjust_balance(&receiver, current.amount, Direction::Credit, Some(&mut *unit))
            .await?;

        let now = Utc::now();
        for leg_tx in [&mut current, &mut counterpart] {
            leg_tx.status = TransactionStatus::Completed;
            leg_tx.completed_at = Some(now);
            leg_tx.metadata.next_retry_at = None;
        }
        unit.store_transaction(current).await?;
        unit.store_transaction(counterpart.clone()).await?;

        Ok(SettlementOutcome::settled(json!({
            "sender_wallet": sender,
            "receiver_wallet": receiver,
            "counterpart_transaction_id": counterpart.id,
            "sender_balance": sender_balance.to_string(),
            "receiver_balance": receiver_balance.to_string(),
        })))
    }
}

#[async_trait]
impl SettlementStrategy for TransferStrategy {
    fn category(&self) -> Category {
        Category::Transfer
    }

    async fn settle(&self, tx: &Transaction) -> Result<SettlementOutcome> {
        let mut unit = self.store.begin().await?;

        match self.settle_in_unit(unit.as_mut(), tx).await {
            Ok(outcome) if outcome.is_success() => {
                unit.commit()
                    .await
                    .map_err(|e| RetryError::Transactional(e.to_string()))?;
                info!(transaction_id = %tx.id, "Transfer legs settled atomically");
                Ok(outcome)
            }
            Ok(outcome) => {
                unit.rollback().await?;
                Ok(outcome)
            }
            Err(e) => {
                warn!(transaction_id = %tx.id, error = %e, "Transfer unit rolled back");
                unit.rollback().await?;
                Err(RetryError::Transactional(e.to_string()))
            }
        }
    }
}
