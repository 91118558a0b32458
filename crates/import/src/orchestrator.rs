use std::collections::hash_map::Entry;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tally_core::{
    CommitError, LedgerEntry, LedgerError, LedgerWriter, NewLedgerEntry, RecurringSeries,
    TransactionCandidate,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::categorizer::Categorizer;
use crate::config::{ImportConfig, KindPolicy, Modality};
use crate::fingerprint::fingerprint;
use crate::matching::{
    HistoryPayeeMatcher, PayeeMatcher, RecurringMatcher, RecurringQuery, SeriesMatcher,
};
use crate::message::{split_messages, MessageParser};
use crate::review::{ReviewRow, ReviewState, RowId};
use crate::statement::{LineStatus, StatementParser};

const FAILURE_SAMPLE_LIMIT: usize = 3;
const FAILURE_SAMPLE_CHARS: usize = 80;

#[derive(Debug, Clone, Copy)]
pub enum RawInput<'a> {
    /// Notification texts separated by blank lines.
    Messages(&'a str),
    /// Text extracted from a statement document.
    Statement(&'a str),
}

impl RawInput<'_> {
    pub fn modality(&self) -> Modality {
        match self {
            RawInput::Messages(_) => Modality::Messages,
            RawInput::Statement(_) => Modality::Statement,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Could not read any transactions from the input ({failed} segments were unrecognised)")]
    NoParseableSegments { failed: usize },
    #[error(
        "No importable transactions found: {parsed} parsed, {filtered_out} excluded by type, \
         {status_skipped} skipped for their status"
    )]
    NothingImportable {
        parsed: usize,
        filtered_out: usize,
        status_skipped: usize,
    },
    #[error("Row {id} repeats the transaction of row {first} in this batch")]
    RepeatedSource { id: RowId, first: RowId },
    #[error("No accepted or edited transactions to save")]
    NothingToCommit,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImportError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error("{matcher} returned {got} results for {expected} candidates")]
    MatcherMismatch {
        matcher: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Unrecognised segments: how many, plus a few truncated examples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailures {
    pub count: usize,
    pub samples: Vec<String>,
}

impl ParseFailures {
    fn record(&mut self, segment: &str) {
        self.count += 1;
        if self.samples.len() < FAILURE_SAMPLE_LIMIT {
            self.samples
                .push(segment.trim().chars().take(FAILURE_SAMPLE_CHARS).collect());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub review: ReviewState,
    pub failures: ParseFailures,
    /// Parsed candidates dropped by the kind policy.
    pub filtered_out: usize,
    /// Statement lines skipped for their status (failed, or pending when
    /// pending lines are excluded).
    pub status_skipped: usize,
    /// Rows whose source is already in the ledger history.
    pub duplicates: usize,
    /// Rows repeating an earlier row of the same batch.
    pub repeated: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub entry_ids: Vec<i64>,
    pub rejected: usize,
    pub left_pending: usize,
}

impl CommitSummary {
    pub fn written(&self) -> usize {
        self.entry_ids.len()
    }
}

pub struct Importer<P = HistoryPayeeMatcher, R = SeriesMatcher> {
    message_parser: MessageParser,
    statement_parser: StatementParser,
    categorizer: Categorizer,
    payee_matcher: P,
    recurring_matcher: R,
    policy: KindPolicy,
    include_pending: bool,
}

impl Default for Importer {
    fn default() -> Self {
        Importer::new(&ImportConfig::default())
    }
}

impl Importer {
    pub fn new(config: &ImportConfig) -> Self {
        Importer::with_matchers(
            config,
            config.matching.payee_matcher(),
            config.matching.series_matcher(),
        )
    }
}

impl<P: PayeeMatcher, R: RecurringMatcher> Importer<P, R> {
    pub fn with_matchers(config: &ImportConfig, payee_matcher: P, recurring_matcher: R) -> Self {
        Importer {
            message_parser: config.messages.parser(),
            statement_parser: config.statement.parser(),
            categorizer: config.categorizer(),
            payee_matcher,
            recurring_matcher,
            policy: config.policy.clone(),
            include_pending: config.statement.include_pending,
        }
    }

    pub fn categorizer(&self) -> &Categorizer {
        &self.categorizer
    }

    /// Parses, filters, categorizes and matches `input` into a pending review
    /// batch. Unrecognised segments are reported in the outcome, not raised.
    pub fn build_review_batch(
        &self,
        input: RawInput<'_>,
        history: &[LedgerEntry],
        series: &[RecurringSeries],
    ) -> Result<ImportOutcome, ImportError> {
        let modality = input.modality();
        let mut failures = ParseFailures::default();
        let mut status_skipped = 0;

        let candidates = match input {
            RawInput::Messages(text) => self.parse_messages(text, &mut failures),
            RawInput::Statement(text) => {
                self.parse_statement(text, &mut failures, &mut status_skipped)
            }
        };

        let parsed = candidates.len();
        if parsed == 0 && status_skipped == 0 {
            warn!(?modality, failed = failures.count, "no parseable segments");
            return Err(ValidationError::NoParseableSegments {
                failed: failures.count,
            }
            .into());
        }

        let kept: Vec<TransactionCandidate> = candidates
            .into_iter()
            .filter(|c| self.policy.allows(modality, c.kind()))
            .collect();
        let filtered_out = parsed - kept.len();
        if kept.is_empty() {
            warn!(?modality, parsed, filtered_out, status_skipped, "nothing importable");
            return Err(ValidationError::NothingImportable {
                parsed: parsed + status_skipped,
                filtered_out,
                status_skipped,
            }
            .into());
        }

        let categories: Vec<_> = kept
            .iter()
            .map(|c| self.categorizer.categorize_candidate(c))
            .collect();

        let payees = self.payee_matcher.batch_match_payees(&kept, history);
        check_len("payee matcher", kept.len(), payees.len())?;

        let queries: Vec<RecurringQuery<'_>> = kept
            .iter()
            .zip(&payees)
            .zip(&categories)
            .map(|((candidate, payee), category)| RecurringQuery {
                candidate,
                payee_name: payee.suggested_name.as_deref(),
                category: payee
                    .suggested_category
                    .as_deref()
                    .or(category.category.as_deref()),
            })
            .collect();
        let recurring = self.recurring_matcher.batch_match_recurring(&queries, series);
        check_len("recurring matcher", kept.len(), recurring.len())?;

        let mut duplicates = 0;
        let mut repeated = 0;
        let mut first_by_fingerprint: HashMap<String, RowId> = HashMap::new();
        let rows: Vec<ReviewRow> = kept
            .into_iter()
            .zip(categories)
            .zip(payees)
            .zip(recurring)
            .map(|(((candidate, category), payee), recurring)| {
                let fp = fingerprint(&candidate);
                let duplicate_of = history
                    .iter()
                    .find(|e| e.source_hash.as_deref() == Some(fp.as_str()))
                    .map(|e| e.id);
                if duplicate_of.is_some() {
                    duplicates += 1;
                }
                let row = ReviewRow::new(candidate, category, payee, recurring, fp)
                    .with_duplicate_of(duplicate_of);
                let repeat_of = match first_by_fingerprint.entry(row.fingerprint.clone()) {
                    Entry::Occupied(first) => {
                        repeated += 1;
                        Some(*first.get())
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(row.id);
                        None
                    }
                };
                row.with_repeat_of(repeat_of)
            })
            .collect();

        info!(
            ?modality,
            parsed,
            rows = rows.len(),
            filtered_out,
            failed = failures.count,
            duplicates,
            repeated,
            "review batch built"
        );

        Ok(ImportOutcome {
            review: ReviewState::from_rows(rows),
            failures,
            filtered_out,
            status_skipped,
            duplicates,
            repeated,
        })
    }

    fn parse_messages(&self, text: &str, failures: &mut ParseFailures) -> Vec<TransactionCandidate> {
        split_messages(text)
            .into_iter()
            .filter_map(|segment| match self.message_parser.parse(segment) {
                Ok(candidate) => Some(candidate),
                Err(e) => {
                    debug!(error = %e, "skipping unparseable message");
                    failures.record(segment);
                    None
                }
            })
            .collect()
    }

    fn parse_statement(
        &self,
        text: &str,
        failures: &mut ParseFailures,
        status_skipped: &mut usize,
    ) -> Vec<TransactionCandidate> {
        let parse = self.statement_parser.parse_detailed(text);
        failures.count += parse.unmatched;
        failures.samples.extend(
            parse
                .unmatched_samples
                .into_iter()
                .take(FAILURE_SAMPLE_LIMIT),
        );

        let mut candidates = Vec::with_capacity(parse.lines.len());
        for line in parse.lines {
            let admitted = match line.status {
                LineStatus::Completed => true,
                LineStatus::Pending => self.include_pending,
                LineStatus::Failed => false,
            };
            if !admitted {
                debug!(receipt = %line.receipt, status = ?line.status, "skipping statement line");
                *status_skipped += 1;
                continue;
            }
            match line.to_candidate() {
                Some(candidate) => candidates.push(candidate),
                None => failures.record(&line.receipt),
            }
        }
        candidates
    }

    /// Writes every accepted or edited row in one atomic batch. On error the
    /// review state is left as it was so the user can retry.
    pub async fn commit<W: LedgerWriter>(
        &self,
        review: &ReviewState,
        writer: &W,
    ) -> Result<CommitSummary, ImportError> {
        let rows = review.commit_candidates();
        if rows.is_empty() {
            return Err(ValidationError::NothingToCommit.into());
        }

        let mut seen: HashMap<&str, RowId> = HashMap::new();
        for row in &rows {
            if let Some(first) = seen.insert(row.fingerprint.as_str(), row.id) {
                warn!(row = %row.id, first = %first, "commit refused: repeated source");
                return Err(ValidationError::RepeatedSource { id: row.id, first }.into());
            }
        }

        let entries = rows
            .iter()
            .map(|row| resolve_entry(row).validate())
            .collect::<Result<Vec<NewLedgerEntry>, LedgerError>>()
            .map_err(CommitError::from)?;

        let entry_ids = match writer.write_entries(&entries).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, rows = entries.len(), "commit failed; batch left unchanged");
                return Err(e.into());
            }
        };

        let counts = review.global_counts();
        info!(written = entry_ids.len(), rejected = counts.rejected, "review batch committed");
        Ok(CommitSummary {
            entry_ids,
            rejected: counts.rejected,
            left_pending: counts.pending,
        })
    }
}

fn check_len(matcher: &'static str, expected: usize, got: usize) -> Result<(), ImportError> {
    if expected != got {
        return Err(ImportError::MatcherMismatch {
            matcher,
            expected,
            got,
        });
    }
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Final values for a reviewed row, field by field: the user's override,
/// then matcher suggestions, then what was parsed.
pub fn resolve_entry(row: &ReviewRow) -> NewLedgerEntry {
    let overrides = row.overrides.as_ref();
    let candidate = &row.candidate;

    let payee = non_blank(overrides.and_then(|o| o.counterparty.as_deref()))
        .or_else(|| non_blank(row.payee_match.suggested_name.as_deref()))
        .or_else(|| non_blank(row.recurring_match.suggested_name.as_deref()))
        .or_else(|| non_blank(candidate.counterparty_raw()));

    let category = non_blank(overrides.and_then(|o| o.category.as_deref()))
        .or_else(|| non_blank(row.payee_match.suggested_category.as_deref()))
        .or_else(|| non_blank(row.recurring_match.suggested_category.as_deref()))
        .or_else(|| non_blank(row.category_match.category.as_deref()));

    NewLedgerEntry {
        occurred_at: candidate.timestamp(),
        amount: overrides
            .and_then(|o| o.amount)
            .unwrap_or_else(|| candidate.amount()),
        kind: candidate.kind(),
        payee,
        phone_number: candidate.phone_number().map(String::from),
        category,
        series_id: overrides
            .and_then(|o| o.series_id)
            .or(row.recurring_match.series_id),
        reference: candidate.reference().to_string(),
        source_hash: row.fingerprint.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{RowId, RowOverrides, RowStatus};
    use chrono::NaiveDate;
    use std::sync::Mutex;
    use tally_core::{
        CategoryMatch, ConfidenceTier, Money, PayeeMatch, PayeeMatchedBy, RecurringMatch,
        SeriesId, TransactionKind,
    };

    const FIVE_SENDS: &str = "\
TL2PNBUD8H Confirmed. Ksh6,800.00 sent to DANIEL EXAMPLE 0712345678 on 4/12/25 at 12:25 PM New M-PESA balance is Ksh1,045.00.

TL3ABCD123 Confirmed. Ksh150.00 paid to JAVA HOUSE ABC PLACE. on 5/1/2025 at 8:05 AM.New M-PESA balance is Ksh895.00.

QWE1234567 Confirmed. Ksh99.00 sent to SAFARICOM DATA BUNDLES on 1/2/25 at 11:59 PM.

Ksh2,500.00 sent to JANE WANJIKU 0722000111 on 14/3/25 at 7:10 AM. New M-PESA balance is Ksh10,000.00.

You bought goods worth Ksh450.00 from NAIVAS SUPERMARKET on 8/12/25 at 6:30 PM. New M-PESA balance is Ksh1,095.00.";

    const RECEIVE_ONLY: &str = "\
TL6RCV0001 Confirmed.You have received Ksh500.00 from PETER OTIENO 0733123456 on 7/12/25 at 9:41 AM New M-PESA balance is Ksh1,545.00.";

    #[derive(Default)]
    struct MemoryLedger {
        entries: Mutex<Vec<NewLedgerEntry>>,
    }

    impl LedgerWriter for MemoryLedger {
        async fn write_entries(&self, entries: &[NewLedgerEntry]) -> Result<Vec<i64>, CommitError> {
            let mut stored = self.entries.lock().unwrap();
            let first = stored.len() as i64 + 1;
            stored.extend_from_slice(entries);
            Ok((first..first + entries.len() as i64).collect())
        }
    }

    struct FailingLedger;

    impl LedgerWriter for FailingLedger {
        async fn write_entries(&self, _: &[NewLedgerEntry]) -> Result<Vec<i64>, CommitError> {
            Err(CommitError::Storage("database is locked".to_string()))
        }
    }

    struct SilentPayees;

    impl PayeeMatcher for SilentPayees {
        fn batch_match_payees(&self, _: &[TransactionCandidate], _: &[LedgerEntry]) -> Vec<PayeeMatch> {
            Vec::new()
        }
    }

    fn build(input: RawInput<'_>) -> ImportOutcome {
        Importer::default().build_review_batch(input, &[], &[]).unwrap()
    }

    fn history_entry(id: i64, payee: &str, phone: &str, category: &str) -> LedgerEntry {
        LedgerEntry {
            id,
            occurred_at: NaiveDate::from_ymd_opt(2025, 11, 1)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            amount: Money::from_cents(100_00),
            kind: TransactionKind::Send,
            payee: Some(payee.to_string()),
            phone_number: Some(phone.to_string()),
            category: Some(category.to_string()),
            series_id: None,
            reference: String::new(),
            source_hash: None,
        }
    }

    fn row_ids(state: &ReviewState) -> Vec<RowId> {
        state.rows().iter().map(|r| r.id).collect()
    }

    // ── Building ─────────────────────────────────────────────────────────────

    #[test]
    fn messages_become_pending_rows_in_order() {
        let outcome = build(RawInput::Messages(FIVE_SENDS));
        let rows = outcome.review.rows();
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| r.status == RowStatus::Pending));
        assert_eq!(rows[0].candidate.amount(), Money::from_cents(6_800_00));
        assert_eq!(rows[4].candidate.kind(), TransactionKind::Buy);
        assert_eq!(rows[4].category_match.category.as_deref(), Some("Food & Drinks"));
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.filtered_out, 0);
    }

    #[test]
    fn unparseable_segments_are_counted_not_fatal() {
        let text = format!("{FIVE_SENDS}\n\nHello, your data bundle expires soon\n\nCall me back please");
        let outcome = build(RawInput::Messages(&text));
        assert_eq!(outcome.review.rows().len(), 5);
        assert_eq!(outcome.failures.count, 2);
        assert_eq!(outcome.failures.samples[0], "Hello, your data bundle expires soon");
    }

    #[test]
    fn non_expense_kinds_are_filtered() {
        let text = format!("{FIVE_SENDS}\n\n{RECEIVE_ONLY}");
        let outcome = build(RawInput::Messages(&text));
        assert_eq!(outcome.review.rows().len(), 5);
        assert_eq!(outcome.filtered_out, 1);
    }

    #[test]
    fn nothing_parsed_is_distinct_from_nothing_importable() {
        let importer = Importer::default();
        let none = importer
            .build_review_batch(RawInput::Messages("just chatting\n\nsee you"), &[], &[])
            .unwrap_err();
        assert_eq!(
            none,
            ImportError::Validation(ValidationError::NoParseableSegments { failed: 2 })
        );

        let filtered = importer
            .build_review_batch(RawInput::Messages(RECEIVE_ONLY), &[], &[])
            .unwrap_err();
        assert_eq!(
            filtered,
            ImportError::Validation(ValidationError::NothingImportable {
                parsed: 1,
                filtered_out: 1,
                status_skipped: 0,
            })
        );
        assert_ne!(none.to_string(), filtered.to_string());
    }

    #[test]
    fn matcher_length_mismatch_is_fatal() {
        let importer = Importer::with_matchers(&ImportConfig::default(), SilentPayees, SeriesMatcher::default());
        let err = importer
            .build_review_batch(RawInput::Messages(FIVE_SENDS), &[], &[])
            .unwrap_err();
        assert_eq!(
            err,
            ImportError::MatcherMismatch {
                matcher: "payee matcher",
                expected: 5,
                got: 0
            }
        );
    }

    #[test]
    fn history_feeds_payee_and_recurring_suggestions() {
        let history = vec![history_entry(11, "Jane (House help)", "0722000111", "Housing")];
        let series = vec![RecurringSeries::new(4, "Jane (House help)")
            .with_category("Housing")
            .with_amount(Money::from_cents(2_500_00))
            .with_phone("0722000111")];
        let outcome = Importer::default()
            .build_review_batch(RawInput::Messages(FIVE_SENDS), &history, &series)
            .unwrap();
        let jane = &outcome.review.rows()[3];
        assert_eq!(jane.payee_match.matched_by, PayeeMatchedBy::PhoneExact);
        assert_eq!(jane.recurring_match.series_id, Some(SeriesId(4)));
        assert_eq!(jane.recurring_match.confidence, ConfidenceTier::High);

        let entry = resolve_entry(jane);
        assert_eq!(entry.payee.as_deref(), Some("Jane (House help)"));
        assert_eq!(entry.category.as_deref(), Some("Housing"));
        assert_eq!(entry.series_id, Some(SeriesId(4)));
    }

    #[test]
    fn reimported_source_is_flagged_as_duplicate() {
        let first = build(RawInput::Messages(FIVE_SENDS));
        let mut seen = history_entry(99, "Daniel", "0700000000", "Other");
        seen.source_hash = Some(first.review.rows()[0].fingerprint.clone());

        let again = Importer::default()
            .build_review_batch(RawInput::Messages(FIVE_SENDS), &[seen], &[])
            .unwrap();
        assert_eq!(again.duplicates, 1);
        assert_eq!(again.review.rows()[0].duplicate_of, Some(99));
        assert_eq!(again.review.rows()[1].duplicate_of, None);
    }

    #[test]
    fn statement_input_keeps_completed_lines() {
        let statement = "\
MPESA FULL STATEMENT
Receipt No. Completion Time Details Transaction Status Paid In Withdrawn Balance
TL4ABC1234 2025-12-04 12:25:31 Customer Transfer to 0712***678 - DANIEL EXAMPLE Completed 0.00 -6,800.00 1,045.00
TL4ABC1235 2025-12-04 12:25:31 Customer Transfer of Funds Charge Completed 0.00 -13.00 1,032.00
TL4ABC1236 2025-12-05 08:10:02 Merchant Payment to 123456 - NAIVAS NAIROBI Completed 0.00 -450.00 582.00
TL4ABC1238 2025-12-06 10:15:00 Pay Bill Online to 888880 - KPLC PREPAID Acc. 5512 Failed 0.00 -1,000.00 582.00
";
        let outcome = build(RawInput::Statement(statement));
        let rows = outcome.review.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(outcome.status_skipped, 1);
        assert_eq!(rows[0].candidate.counterparty_raw(), Some("DANIEL EXAMPLE"));
        assert_eq!(rows[1].category_match.category.as_deref(), Some("Food & Drinks"));
    }

    #[test]
    fn status_skipped_lines_count_as_parsed() {
        let statement = "\
Receipt No. Completion Time Details Transaction Status Paid In Withdrawn Balance
TL4ABC1238 2025-12-06 10:15:00 Pay Bill Online to 888880 - KPLC PREPAID Acc. 5512 Failed 0.00 -1,000.00 582.00
";
        let err = Importer::default()
            .build_review_batch(RawInput::Statement(statement), &[], &[])
            .unwrap_err();
        assert_eq!(
            err,
            ImportError::Validation(ValidationError::NothingImportable {
                parsed: 1,
                filtered_out: 0,
                status_skipped: 1,
            })
        );
        assert!(err.to_string().contains("1 skipped for their status"));
    }

    #[test]
    fn repeated_message_in_one_batch_is_flagged() {
        let text = format!("{RECEIVE_ONLY}\n\n{FIVE_SENDS}\n\n{}", FIVE_SENDS.split("\n\n").next().unwrap());
        let outcome = build(RawInput::Messages(&text));
        let rows = outcome.review.rows();
        assert_eq!(rows.len(), 6);
        assert_eq!(outcome.repeated, 1);
        assert_eq!(outcome.duplicates, 0);
        assert_eq!(rows[5].fingerprint, rows[0].fingerprint);
        assert_eq!(rows[5].repeat_of, Some(rows[0].id));
        assert!(rows[..5].iter().all(|r| r.repeat_of.is_none()));
    }

    #[test]
    fn fallback_follows_config() {
        let text = format!("{FIVE_SENDS}\n\nDear customer, Ksh1,200.00 has been debited for your order");
        let lenient = build(RawInput::Messages(&text));
        assert_eq!(lenient.review.rows().len(), 6);

        let strict = Importer::new(&ImportConfig::from_toml("[messages]\nallow_fallback = false").unwrap())
            .build_review_batch(RawInput::Messages(&text), &[], &[])
            .unwrap();
        assert_eq!(strict.review.rows().len(), 5);
        assert_eq!(strict.failures.count, 1);
    }

    // ── Resolution ───────────────────────────────────────────────────────────

    fn bare_row(cents: i64, counterparty: Option<&str>) -> ReviewRow {
        let candidate = TransactionCandidate::new(
            Money::from_cents(cents),
            TransactionKind::Send,
            NaiveDate::from_ymd_opt(2025, 12, 4).unwrap().and_hms_opt(9, 0, 0).unwrap(),
            "fixture message",
        )
        .unwrap()
        .with_counterparty(counterparty.map(String::from));
        ReviewRow::new(
            candidate,
            CategoryMatch::none(),
            PayeeMatch::none(),
            RecurringMatch::none(),
            "abc".to_string(),
        )
    }

    #[test]
    fn resolve_falls_back_field_by_field() {
        let mut row = bare_row(100_00, Some("RAW NAME"));
        row.category_match = CategoryMatch::scored("Shopping".into(), 12.0, 22.0, None, vec![]);
        row.recurring_match = RecurringMatch {
            confidence: ConfidenceTier::Medium,
            series_id: Some(SeriesId(3)),
            suggested_name: Some("Series Name".into()),
            suggested_category: None,
            match_score: 70,
        };
        let entry = resolve_entry(&row);
        assert_eq!(entry.payee.as_deref(), Some("Series Name"));
        assert_eq!(entry.category.as_deref(), Some("Shopping"));
        assert_eq!(entry.series_id, Some(SeriesId(3)));
        assert_eq!(entry.amount, Money::from_cents(100_00));
        assert_eq!(entry.source_hash, "abc");

        row.overrides = Some(RowOverrides {
            counterparty: Some("  ".into()),
            category: Some("Gifts".into()),
            amount: None,
            series_id: Some(SeriesId(8)),
        });
        let entry = resolve_entry(&row);
        assert_eq!(entry.payee.as_deref(), Some("Series Name"));
        assert_eq!(entry.category.as_deref(), Some("Gifts"));
        assert_eq!(entry.series_id, Some(SeriesId(8)));
    }

    #[test]
    fn resolve_uses_parsed_values_when_nothing_else() {
        let entry = resolve_entry(&bare_row(42_00, Some("RAW NAME")));
        assert_eq!(entry.payee.as_deref(), Some("RAW NAME"));
        assert_eq!(entry.category, None);
        assert_eq!(entry.series_id, None);
    }

    // ── Commit ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn commit_writes_only_accepted_rows() {
        let importer = Importer::default();
        let mut review = importer
            .build_review_batch(RawInput::Messages(FIVE_SENDS), &[], &[])
            .unwrap()
            .review;
        let ids = row_ids(&review);
        review.accept_many(&ids[..3]);
        review.reject_many(&ids[3..]);

        let ledger = MemoryLedger::default();
        let summary = importer.commit(&review, &ledger).await.unwrap();
        assert_eq!(summary.written(), 3);
        assert_eq!(summary.entry_ids, vec![1, 2, 3]);
        assert_eq!(summary.rejected, 2);

        let stored = ledger.entries.lock().unwrap();
        assert_eq!(stored.len(), 3);
        let rejected: Vec<&str> = review.rows()[3..].iter().map(|r| r.candidate.reference()).collect();
        assert!(stored.iter().all(|e| !rejected.contains(&e.reference.as_str())));
    }

    #[tokio::test]
    async fn accepting_both_copies_of_a_repeat_is_refused() {
        let first = FIVE_SENDS.split("\n\n").next().unwrap();
        let text = format!("{first}\n\n{first}");
        let importer = Importer::default();
        let mut review = importer
            .build_review_batch(RawInput::Messages(&text), &[], &[])
            .unwrap()
            .review;
        let ids = row_ids(&review);
        review.accept_many(&ids);

        let ledger = MemoryLedger::default();
        let err = importer.commit(&review, &ledger).await.unwrap_err();
        assert_eq!(
            err,
            ImportError::Validation(ValidationError::RepeatedSource { id: ids[1], first: ids[0] })
        );
        assert!(ledger.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn edited_amount_wins_at_commit() {
        let importer = Importer::default();
        let mut review = importer
            .build_review_batch(RawInput::Messages(FIVE_SENDS), &[], &[])
            .unwrap()
            .review;
        let id = row_ids(&review)[0];
        review
            .save_edit(
                id,
                RowOverrides {
                    amount: Some(Money::from_cents(500_00)),
                    ..Default::default()
                },
            )
            .unwrap();
        review.accept(id).unwrap();

        let ledger = MemoryLedger::default();
        importer.commit(&review, &ledger).await.unwrap();
        let stored = ledger.entries.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].amount, Money::from_cents(500_00));
    }

    #[tokio::test]
    async fn failed_commit_surfaces_error_and_keeps_state() {
        let importer = Importer::default();
        let mut review = importer
            .build_review_batch(RawInput::Messages(FIVE_SENDS), &[], &[])
            .unwrap()
            .review;
        let ids = row_ids(&review);
        review.accept(ids[0]).unwrap();
        let before = review.global_counts();

        let err = importer.commit(&review, &FailingLedger).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to save transactions: database is locked");
        assert_eq!(review.global_counts(), before);
        assert_eq!(review.row(ids[0]).unwrap().status, RowStatus::Accepted);

        // Retrying against a working ledger succeeds without re-parsing.
        let ledger = MemoryLedger::default();
        assert_eq!(importer.commit(&review, &ledger).await.unwrap().written(), 1);
    }

    #[tokio::test]
    async fn nothing_to_commit() {
        let importer = Importer::default();
        let review = importer
            .build_review_batch(RawInput::Messages(FIVE_SENDS), &[], &[])
            .unwrap()
            .review;
        let err = importer.commit(&review, &MemoryLedger::default()).await.unwrap_err();
        assert_eq!(err, ImportError::Validation(ValidationError::NothingToCommit));
    }
}
