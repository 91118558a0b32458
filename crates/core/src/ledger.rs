use thiserror::Error;

use super::transaction::{LedgerError, NewLedgerEntry};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommitError {
    #[error("Failed to save transactions: {0}")]
    Storage(String),
    #[error("Invalid ledger entry: {0}")]
    Invalid(#[from] LedgerError),
}

/// Persistence boundary for reviewed transactions.
///
/// `write_entries` is all-or-nothing: either every entry is stored and their
/// new ids are returned in input order, or nothing is stored and an error is
/// returned.
#[allow(async_fn_in_trait)]
pub trait LedgerWriter {
    async fn write_entries(&self, entries: &[NewLedgerEntry]) -> Result<Vec<i64>, CommitError>;
}
