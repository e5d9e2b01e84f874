//! Application layer: retry scheduling, settlement and ledger orchestration.
//!
//! [`scheduler::RetryScheduler`] is the entry point. It validates and queues
//! transactions, and a single background worker (processor) drains the queue
//! through the [`settlement::SettlementDispatcher`], recording every attempt with
//! the [`audit::AuditRecorder`]. Wallet balances only ever change through the
//! [`ledger::LedgerMutator`].

pub mod audit;
pub mod ledger;
mod processor;
pub mod scheduler;
pub mod settlement;
