use super::wallet::{Amount, WalletId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type TransactionId = String;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    /// Whether a retry may be scheduled from this status.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Funding,
    Withdrawal,
    Transfer,
    Payment,
    Betting,
    Generic,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Funding,
        Category::Withdrawal,
        Category::Transfer,
        Category::Payment,
        Category::Betting,
        Category::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Funding => "funding",
            Self::Withdrawal => "withdrawal",
            Self::Transfer => "transfer",
            Self::Payment => "payment",
            Self::Betting => "betting",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown transaction category: {s}"))
    }
}

/// Which side of a transfer a transaction record represents.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransferLeg {
    /// The sender's debit leg.
    Outgoing,
    /// The receiver's credit leg.
    Incoming,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct BankDetails {
    pub bank_code: String,
    pub account_number: String,
    pub account_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ServiceDetails {
    /// Service family, e.g. airtime, data, cable, electricity, education.
    pub service: String,
    pub provider: Option<String>,
    /// Phone number, smartcard number, meter number...
    pub recipient: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct BetSlip {
    pub provider: String,
    pub customer_id: String,
}

/// Category-specific settlement data, tagged by category.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum SettlementDetails {
    Funding {
        gateway_reference: Option<String>,
    },
    Withdrawal {
        #[serde(default)]
        bank: Option<BankDetails>,
    },
    Transfer {
        related_transaction_id: Option<TransactionId>,
        leg: TransferLeg,
    },
    Payment {
        #[serde(default)]
        service: Option<ServiceDetails>,
    },
    Betting {
        #[serde(default)]
        bet: Option<BetSlip>,
    },
    Generic,
}

impl SettlementDetails {
    pub fn category(&self) -> Category {
        match self {
            Self::Funding { .. } => Category::Funding,
            Self::Withdrawal { .. } => Category::Withdrawal,
            Self::Transfer { .. } => Category::Transfer,
            Self::Payment { .. } => Category::Payment,
            Self::Betting { .. } => Category::Betting,
            Self::Generic => Category::Generic,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Success,
    Failed,
}

/// One retry attempt as recorded on the transaction.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RetryHistoryEntry {
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    /// Unset while the attempt is in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AttemptStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct RetryMetadata {
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub last_retry_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_reason: Option<String>,
    #[serde(default)]
    pub retry_history: Vec<RetryHistoryEntry>,
    #[serde(default)]
    pub retry_exhausted: bool,
    #[serde(default)]
    pub final_failure_reason: Option<String>,
    /// Set while a retry is scheduled but not yet started.
    #[serde(default)]
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl RetryMetadata {
    /// The attempt that started but never recorded an outcome, if any.
    pub fn unfinished_attempt(&self) -> Option<&RetryHistoryEntry> {
        self.retry_history
            .last()
            .filter(|entry| entry.status.is_none())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub status: TransactionStatus,
    pub wallet_id: WalletId,
    pub amount: Amount,
    #[serde(flatten)]
    pub details: SettlementDetails,
    #[serde(default)]
    pub metadata: RetryMetadata,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn new(
        id: impl Into<TransactionId>,
        wallet_id: impl Into<WalletId>,
        amount: Amount,
        details: SettlementDetails,
    ) -> Self {
        Self {
            id: id.into(),
            status: TransactionStatus::Pending,
            wallet_id: wallet_id.into(),
            amount,
            details,
            metadata: RetryMetadata::default(),
            created_at: Utc::now(),
            completed_at: None,
            failed_at: None,
        }
    }

    pub fn category(&self) -> Category {
        self.details.category()
    }

    pub fn is_terminal(&self) -> bool {
        self.status == TransactionStatus::Completed || self.metadata.retry_exhausted
    }

    /// Whether the retry pipeline still owes this transaction an attempt.
    pub fn awaiting_retry(&self) -> bool {
        !self.is_terminal()
            && self.status.is_retryable()
            && (self.metadata.next_retry_at.is_some()
                || self.metadata.unfinished_attempt().is_some())
    }

    pub fn related_transaction_id(&self) -> Option<&str> {
        match &self.details {
            SettlementDetails::Transfer {
                related_transaction_id,
                ..
            } => related_transaction_id.as_deref(),
            _ => None,
        }
    }

    pub fn gateway_reference(&self) -> Option<&str> {
        match &self.details {
            SettlementDetails::Funding { gateway_reference } => gateway_reference.as_deref(),
            _ => None,
        }
    }
}
