use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::money::Money;
use super::series::SeriesId;

/// Longest prefix of the source text kept on a candidate as its audit trail.
pub const REFERENCE_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Send,
    Receive,
    Buy,
    Withdraw,
    Deposit,
}

impl TransactionKind {
    /// Money leaving the wallet.
    pub fn is_outflow(self) -> bool {
        matches!(
            self,
            TransactionKind::Send | TransactionKind::Buy | TransactionKind::Withdraw
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Send => "send",
            TransactionKind::Receive => "receive",
            TransactionKind::Buy => "buy",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::Deposit => "deposit",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "send" => Ok(TransactionKind::Send),
            "receive" => Ok(TransactionKind::Receive),
            "buy" => Ok(TransactionKind::Buy),
            "withdraw" => Ok(TransactionKind::Withdraw),
            "deposit" => Ok(TransactionKind::Deposit),
            other => Err(format!("Unknown transaction kind: '{other}'")),
        }
    }
}

/// A provisional transaction extracted from raw text. Built once, read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCandidate {
    amount: Money,
    counterparty_raw: Option<String>,
    kind: TransactionKind,
    balance_after: Option<Money>,
    timestamp: NaiveDateTime,
    reference: String,
    phone_number: Option<String>,
}

impl TransactionCandidate {
    /// Returns `None` when `amount` is not strictly positive or exceeds
    /// [`Money::max_value`].
    pub fn new(
        amount: Money,
        kind: TransactionKind,
        timestamp: NaiveDateTime,
        source: &str,
    ) -> Option<Self> {
        if !amount.is_positive() || !amount.is_within_limit() {
            return None;
        }
        Some(Self {
            amount,
            counterparty_raw: None,
            kind,
            balance_after: None,
            timestamp,
            reference: truncate_reference(source),
            phone_number: None,
        })
    }

    pub fn with_counterparty(mut self, counterparty: Option<String>) -> Self {
        self.counterparty_raw = counterparty.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_balance(mut self, balance: Option<Money>) -> Self {
        self.balance_after = balance;
        self
    }

    pub fn with_phone(mut self, phone: Option<String>) -> Self {
        self.phone_number = phone;
        self
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn counterparty_raw(&self) -> Option<&str> {
        self.counterparty_raw.as_deref()
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn balance_after(&self) -> Option<Money> {
        self.balance_after
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn epoch_millis(&self) -> i64 {
        self.timestamp.and_utc().timestamp_millis()
    }

    pub fn year(&self) -> i32 {
        self.timestamp.year()
    }

    pub fn month(&self) -> u32 {
        self.timestamp.month()
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }
}

fn truncate_reference(source: &str) -> String {
    source.trim().chars().take(REFERENCE_MAX_CHARS).collect()
}

/// A ledger row already persisted by the surrounding application. Used as the
/// read-only history snapshot handed to the matchers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub occurred_at: NaiveDateTime,
    pub amount: Money,
    pub kind: TransactionKind,
    pub payee: Option<String>,
    pub phone_number: Option<String>,
    pub category: Option<String>,
    pub series_id: Option<SeriesId>,
    pub reference: String,
    pub source_hash: Option<String>,
}

/// A reviewed row resolved to its final values, ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub occurred_at: NaiveDateTime,
    pub amount: Money,
    pub kind: TransactionKind,
    pub payee: Option<String>,
    pub phone_number: Option<String>,
    pub category: Option<String>,
    pub series_id: Option<SeriesId>,
    pub reference: String,
    pub source_hash: String,
}

impl NewLedgerEntry {
    pub fn validate(self) -> Result<NewLedgerEntry, LedgerError> {
        if !self.amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount(self.amount));
        }
        if self.amount.to_cents().is_none() {
            return Err(LedgerError::AmountOutOfRange(self.amount));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("Amount must be greater than zero, got {0}")]
    NonPositiveAmount(Money),
    #[error("Amount {0} is too large to store")]
    AmountOutOfRange(Money),
}
