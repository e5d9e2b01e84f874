//! Domain model: transactions, wallets, and the ports the engine talks through.

pub mod ports;
pub mod transaction;
pub mod wallet;
