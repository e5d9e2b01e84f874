use crate::domain::transaction::TransactionId;
use crate::error::{Result, RetryError};
use serde::Deserialize;
use std::io::Read;

const DEFAULT_REASON: &str = "manual retry";

/// One row of a retry request file: which transaction to retry and why.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct RetryRequest {
    #[serde(rename = "transaction")]
    pub transaction_id: TransactionId,
    #[serde(default)]
    reason: Option<String>,
}

impl RetryRequest {
    pub fn new(transaction_id: impl Into<TransactionId>, reason: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            reason: Some(reason.into()),
        }
    }

    /// The stated reason, or a generic one when the column is empty.
    pub fn reason(&self) -> &str {
        self.reason
            .as_deref()
            .filter(|reason| !reason.is_empty())
            .unwrap_or(DEFAULT_REASON)
    }
}

/// Reads retry requests from a CSV source with a `transaction,reason` header.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<RetryRequest>`.
/// It handles whitespace trimming and flexible record lengths automatically.
pub struct RetryRequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RetryRequestReader<R> {
    /// Creates a new `RetryRequestReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes requests.
    pub fn requests(self) -> impl Iterator<Item = Result<RetryRequest>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(RetryError::from))
    }
}
