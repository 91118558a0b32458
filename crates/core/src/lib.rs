pub mod ledger;
pub mod matches;
pub mod money;
pub mod period;
pub mod series;
pub mod transaction;

pub use ledger::{CommitError, LedgerWriter};
pub use matches::{CategoryMatch, ConfidenceTier, PayeeMatch, PayeeMatchedBy, RecurringMatch};
pub use money::Money;
pub use period::{month_name, TimeWindow};
pub use series::{RecurringSeries, SeriesId};
pub use transaction::{
    LedgerEntry, LedgerError, NewLedgerEntry, TransactionCandidate, TransactionKind,
    REFERENCE_MAX_CHARS,
};
