//! Adapters for the domain ports: ledger stores and settlement clients.

pub mod http;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
