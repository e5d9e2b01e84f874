//! Category-specific settlement strategies and the dispatcher that routes to them.
//!
//! A strategy checks its preconditions, talks to an external settlement client if
//! the category needs one, and applies the ledger effect through the
//! [`LedgerMutator`]. Whatever happens inside, the dispatcher hands the caller a
//! [`SettlementOutcome`]; strategy errors never cross it.

mod debit;
mod funding;
mod generic;
mod transfer;

pub use debit::DebitStrategy;
pub use funding::FundingStrategy;
pub use generic::GenericStrategy;
pub use transfer::TransferStrategy;

use super::ledger::LedgerMutator;
use crate::config::RetryConfig;
use crate::domain::ports::{
    LedgerStoreRef, SettlementClientRef, SettlementReceipt, SettlementRequest,
};
use crate::domain::transaction::{Category, Transaction};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of one settlement attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    Settled { response: serde_json::Value },
    Failed { error: String },
}

impl SettlementOutcome {
    pub fn settled(response: serde_json::Value) -> Self {
        Self::Settled { response }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Settled { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error } => Some(error),
            Self::Settled { .. } => None,
        }
    }

    pub fn response(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Settled { response } => Some(response),
            Self::Failed { .. } => None,
        }
    }
}

#[async_trait]
pub trait SettlementStrategy: Send + Sync {
    fn category(&self) -> Category;

    /// Settles one transaction. Precondition failures come back as
    /// `Ok(SettlementOutcome::Failed)`; an `Err` means something broke underneath.
    async fn settle(&self, tx: &Transaction) -> Result<SettlementOutcome>;
}

/// The external collaborators, one per category that needs one.
#[derive(Clone)]
pub struct SettlementClients {
    pub funding: SettlementClientRef,
    pub bank_transfer: SettlementClientRef,
    pub service: SettlementClientRef,
    pub betting: SettlementClientRef,
}

impl SettlementClients {
    /// Routes every category to the same client.
    pub fn uniform(client: SettlementClientRef) -> Self {
        Self {
            funding: client.clone(),
            bank_transfer: client.clone(),
            service: client.clone(),
            betting: client,
        }
    }
}

/// Calls a settlement client under the caller's timeout.
pub(crate) async fn call_with_timeout(
    client: &SettlementClientRef,
    request: SettlementRequest,
    timeout: Duration,
) -> std::result::Result<SettlementReceipt, SettlementError> {
    match tokio::time::timeout(timeout, client.call(request)).await {
        Ok(result) => result,
        Err(_) => Err(SettlementError::Timeout(timeout.as_millis())),
    }
}

pub struct SettlementDispatcher {
    strategies: HashMap<Category, Arc<dyn SettlementStrategy>>,
    allowed: HashSet<Category>,
}

impl SettlementDispatcher {
    /// Creates a dispatcher with the built-in strategy for every category.
    pub fn new(store: LedgerStoreRef, clients: SettlementClients, config: &RetryConfig) -> Self {
        let ledger = LedgerMutator::new(store.clone());
        let timeout = config.settlement_timeout;

        let strategies: Vec<Arc<dyn SettlementStrategy>> = vec![
            Arc::new(FundingStrategy::new(ledger.clone(), clients.funding, timeout)),
            Arc::new(DebitStrategy::withdrawal(
                store.clone(),
                ledger.clone(),
                clients.bank_transfer,
                timeout,
            )),
            Arc::new(DebitStrategy::payment(
                store.clone(),
                ledger.clone(),
                clients.service,
                timeout,
            )),
            Arc::new(DebitStrategy::betting(
                store.clone(),
                ledger.clone(),
                clients.betting,
                timeout,
            )),
            Arc::new(TransferStrategy::new(store, ledger)),
            Arc::new(GenericStrategy),
        ];

        let mut dispatcher = Self {
            strategies: HashMap::new(),
            allowed: config.allowed_categories.clone(),
        };
        for strategy in strategies {
            dispatcher = dispatcher.with_strategy(strategy);
        }
        dispatcher
    }

    /// Registers (or replaces) the strategy for its category.
    pub fn with_strategy(mut self, strategy: Arc<dyn SettlementStrategy>) -> Self {
        self.strategies.insert(strategy.category(), strategy);
        self
    }

    /// Whether transactions of this category can be settled automatically.
    pub fn supports(&self, category: Category) -> bool {
        self.allowed.contains(&category) && self.strategies.contains_key(&category)
    }

    pub async fn dispatch(&self, tx: &Transaction) -> SettlementOutcome {
        let category = tx.category();
        if !self.allowed.contains(&category) {
            return SettlementOutcome::failed(format!(
                "Category {category} is not enabled for automatic retry"
            ));
        }
        let Some(strategy) = self.strategies.get(&category) else {
            return SettlementOutcome::failed(format!(
                "No settlement strategy registered for category {category}"
            ));
        };

        debug!(transaction_id = %tx.id, %category, "Dispatching settlement");
        match strategy.settle(tx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(transaction_id = %tx.id, %category, error = %e, "Settlement strategy failed");
                SettlementOutcome::failed(e.to_string())
            }
        }
    }
}
