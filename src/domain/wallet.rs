use crate::error::RetryError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;

pub type WalletId = String;

/// Represents a wallet balance.
///
/// This is a wrapper around `rust_decimal::Decimal` to enforce domain-specific rules
/// and provide type safety for ledger arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

/// Represents a positive monetary amount for transactions.
///
/// Ensures that transaction amounts are always positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, RetryError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(RetryError::Validation(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = RetryError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Whether the balance can absorb a debit of `amount`.
    pub fn covers(&self, amount: Amount) -> bool {
        self.0 >= amount.value()
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which way a ledger adjustment moves money relative to the wallet.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

/// Signed change to apply to a balance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceDelta(Decimal);

impl BalanceDelta {
    pub fn new(amount: Amount, direction: Direction) -> Self {
        match direction {
            Direction::Credit => Self(amount.value()),
            Direction::Debit => Self(amount.value().neg()),
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

/// A customer wallet.
///
/// The balance is only ever changed through [`Wallet::apply`], which the stores
/// call from inside their atomic increment. Nothing assigns it directly.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Wallet {
    pub id: WalletId,
    balance: Balance,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Wallet {
    /// Opens a wallet with an initial balance.
    pub fn open(id: impl Into<WalletId>, opening_balance: Decimal) -> Self {
        Self {
            id: id.into(),
            balance: Balance::new(opening_balance),
            updated_at: None,
        }
    }

    pub fn balance(&self) -> Balance {
        self.balance
    }

    /// Applies a signed delta. Rejects the change if it would overdraw the wallet.
    pub fn apply(&mut self, delta: BalanceDelta) -> Result<Balance, RetryError> {
        let next = self.balance.0 + delta.value();
        if next < Decimal::ZERO {
            return Err(RetryError::InsufficientFunds {
                wallet: self.id.clone(),
                balance: self.balance.0,
                requested: delta.value().abs(),
            });
        }
        self.balance = Balance(next);
        self.updated_at = Some(Utc::now());
        Ok(self.balance)
    }
}
