use crate::domain::ports::{LedgerStoreRef, UnitOfWork};
use crate::domain::wallet::{Amount, Balance, BalanceDelta, Direction};
use crate::error::Result;
use tracing::debug;

/// The only sanctioned path to a wallet balance change.
///
/// Every adjustment is a signed increment applied by the store itself, so there is
/// never a read-balance, compute, write-balance window. Passing a unit of work makes
/// the adjustment part of that unit's commit; otherwise it commits on its own.
#[derive(Clone)]
pub struct LedgerMutator {
    store: LedgerStoreRef,
}

impl LedgerMutator {
    pub fn new(store: LedgerStoreRef) -> Self {
        Self { store }
    }

    pub async fn adjust_balance(
        &self,
        wallet_id: &str,
        amount: Amount,
        direction: Direction,
        unit: Option<&mut dyn UnitOfWork>,
    ) -> Result<Balance> {
        let delta = BalanceDelta::new(amount, direction);
        let balance = match unit {
            Some(unit) => unit.adjust_balance(wallet_id, delta).await?,
            None => self.store.adjust_balance(wallet_id, delta).await?,
        };
        debug!(
            wallet_id,
            amount = %amount,
            ?direction,
            balance = %balance,
            "Wallet balance adjusted"
        );
        Ok(balance)
    }

    pub async fn credit(&self, wallet_id: &str, amount: Amount) -> Result<Balance> {
        self.adjust_balance(wallet_id, amount, Direction::Credit, None)
            .await
    }

    pub async fn debit(&self, wallet_id: &str, amount: Amount) -> Result<Balance> {
        self.adjust_balance(wallet_id, amount, Direction::Debit, None)
            .await
    }
}
