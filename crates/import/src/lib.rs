#[macro_use]
mod util;

pub mod categorizer;
pub mod config;
pub mod fingerprint;
pub mod matching;
pub mod message;
pub mod orchestrator;
pub mod review;
pub mod spending;
pub mod statement;

pub use categorizer::{CategoryRule, Categorizer, MatchType};
pub use config::{
    ConfigError, ImportConfig, KindPolicy, MatchingConfig, MessageConfig, Modality, StatementConfig,
};
pub use matching::{
    HistoryPayeeMatcher, PayeeMatcher, RecurringMatcher, RecurringQuery, SeriesMatcher,
};
pub use message::{MessageParser, ParseError};
pub use orchestrator::{
    resolve_entry, CommitSummary, ImportError, ImportOutcome, Importer, ParseFailures, RawInput,
    ValidationError,
};
pub use review::{
    ReviewCounts, ReviewError, ReviewRow, ReviewState, RowId, RowOverrides, RowStatus,
};
pub use spending::SpendingSummary;
pub use statement::{LedgerLine, LineStatus, StatementParse, StatementParser};
