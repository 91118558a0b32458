use std::cmp::Ordering;

use rust_decimal::prelude::ToPrimitive;
use tally_core::{
    ConfidenceTier, LedgerEntry, PayeeMatch, PayeeMatchedBy, RecurringMatch, RecurringSeries,
    TransactionCandidate,
};

use crate::util::name_similarity;

/// Suggests a payee for each candidate from the ledger history.
///
/// Implementations return exactly one result per candidate, in input order.
pub trait PayeeMatcher {
    fn batch_match_payees(
        &self,
        candidates: &[TransactionCandidate],
        history: &[LedgerEntry],
    ) -> Vec<PayeeMatch>;
}

/// Links candidates to known recurring series.
///
/// Implementations return exactly one result per query, in input order.
pub trait RecurringMatcher {
    fn batch_match_recurring(
        &self,
        queries: &[RecurringQuery<'_>],
        series: &[RecurringSeries],
    ) -> Vec<RecurringMatch>;
}

/// A candidate plus whatever the earlier stages already suggested for it.
#[derive(Debug, Clone, Copy)]
pub struct RecurringQuery<'a> {
    pub candidate: &'a TransactionCandidate,
    pub payee_name: Option<&'a str>,
    pub category: Option<&'a str>,
}

// ── Payees ───────────────────────────────────────────────────────────────────

pub struct HistoryPayeeMatcher {
    /// Minimum normalized name similarity for a fuzzy match.
    pub name_threshold: f32,
}

impl Default for HistoryPayeeMatcher {
    fn default() -> Self {
        Self { name_threshold: 0.8 }
    }
}

impl HistoryPayeeMatcher {
    pub fn new(name_threshold: f32) -> Self {
        Self { name_threshold }
    }

    fn match_one(&self, candidate: &TransactionCandidate, history: &[LedgerEntry]) -> PayeeMatch {
        if let Some(phone) = candidate.phone_number().and_then(Phone::parse) {
            let exact = most_recent(history.iter().filter(|e| {
                entry_phone(e).is_some_and(|p| p.matches_exactly(&phone))
            }));
            if let Some(entry) = exact {
                return suggestion(entry, ConfidenceTier::High, PayeeMatchedBy::PhoneExact);
            }

            let partial = most_recent(history.iter().filter(|e| {
                entry_phone(e).is_some_and(|p| p.matches_partially(&phone))
            }));
            if let Some(entry) = partial {
                return suggestion(entry, ConfidenceTier::Medium, PayeeMatchedBy::PhonePartial);
            }
        }

        let Some(name) = candidate.counterparty_raw() else {
            return PayeeMatch::none();
        };

        let best = history
            .iter()
            .filter_map(|e| {
                let similarity = name_similarity(name, e.payee.as_deref()?);
                (similarity >= self.name_threshold).then_some((e, similarity))
            })
            .max_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(Ordering::Equal)
                    .then(a.0.occurred_at.cmp(&b.0.occurred_at))
            });

        match best {
            Some((entry, similarity)) => {
                let tier = if similarity >= 0.9 {
                    ConfidenceTier::Medium
                } else {
                    ConfidenceTier::Low
                };
                suggestion(entry, tier, PayeeMatchedBy::NameFuzzy)
            }
            None => PayeeMatch::none(),
        }
    }
}

impl PayeeMatcher for HistoryPayeeMatcher {
    fn batch_match_payees(
        &self,
        candidates: &[TransactionCandidate],
        history: &[LedgerEntry],
    ) -> Vec<PayeeMatch> {
        candidates.iter().map(|c| self.match_one(c, history)).collect()
    }
}

fn entry_phone(entry: &LedgerEntry) -> Option<Phone> {
    entry.phone_number.as_deref().and_then(Phone::parse)
}

fn most_recent<'a>(entries: impl Iterator<Item = &'a LedgerEntry>) -> Option<&'a LedgerEntry> {
    entries.max_by_key(|e| e.occurred_at)
}

fn suggestion(entry: &LedgerEntry, confidence: ConfidenceTier, by: PayeeMatchedBy) -> PayeeMatch {
    PayeeMatch {
        confidence,
        suggested_name: entry.payee.clone(),
        suggested_category: entry.category.clone(),
        matched_by: by,
        matched_entry: Some(entry.id),
    }
}

/// Kenyan mobile number in local `07…`/`01…` form. Masked digits (`*`) are
/// kept so statement numbers like `0712***678` can still match partially.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Phone(String);

impl Phone {
    fn parse(raw: &str) -> Option<Phone> {
        let kept: String = raw
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '*')
            .collect();
        let local = match kept.strip_prefix("254") {
            Some(rest) => format!("0{rest}"),
            None => kept,
        };
        (local.len() >= 7 && local.starts_with('0')).then_some(Phone(local))
    }

    fn is_masked(&self) -> bool {
        self.0.contains('*')
    }

    fn matches_exactly(&self, other: &Phone) -> bool {
        !self.is_masked() && self == other
    }

    /// Unmasked four-digit prefix and last three digits.
    fn ends(&self) -> Option<(&str, &str)> {
        let prefix = self.0.get(..4)?;
        let suffix = self.0.get(self.0.len().checked_sub(3)?..)?;
        (!prefix.contains('*') && !suffix.contains('*')).then_some((prefix, suffix))
    }

    fn matches_partially(&self, other: &Phone) -> bool {
        matches!((self.ends(), other.ends()), (Some(a), Some(b)) if a == b)
    }
}

/// True when two phone strings refer to the same number, allowing masked
/// digits on either side.
pub fn phones_match(a: &str, b: &str) -> bool {
    match (Phone::parse(a), Phone::parse(b)) {
        (Some(a), Some(b)) => a.matches_exactly(&b) || a.matches_partially(&b),
        _ => false,
    }
}

// ── Recurring series ─────────────────────────────────────────────────────────

const NAME_POINTS: f32 = 50.0;
const PHONE_POINTS: u8 = 25;
const AMOUNT_POINTS: f64 = 15.0;
const CATEGORY_POINTS: u8 = 10;

pub struct SeriesMatcher {
    /// Minimum score (0–100) for a series to be linked.
    pub min_score: u8,
    /// Relative amount tolerance, e.g. `0.1` for ±10 %.
    pub amount_tolerance: f64,
}

impl Default for SeriesMatcher {
    fn default() -> Self {
        Self {
            min_score: 60,
            amount_tolerance: 0.1,
        }
    }
}

impl SeriesMatcher {
    pub fn new(min_score: u8, amount_tolerance: f64) -> Self {
        Self {
            min_score,
            amount_tolerance,
        }
    }

    /// Score in `0..=100` of `query` against one series.
    pub fn score(&self, query: &RecurringQuery<'_>, series: &RecurringSeries) -> u8 {
        let names = [query.payee_name, query.candidate.counterparty_raw()];
        let similarity = names
            .iter()
            .flatten()
            .map(|n| name_similarity(n, &series.name))
            .fold(0.0f32, f32::max);
        let mut score = (similarity * NAME_POINTS).round() as u8;

        let phone_hit = matches!(
            (query.candidate.phone_number(), series.payee_phone.as_deref()),
            (Some(a), Some(b)) if phones_match(a, b)
        );
        if phone_hit {
            score += PHONE_POINTS;
        }

        score += self.amount_points(query.candidate, series);

        let category_hit = matches!(
            (query.category, series.category.as_deref()),
            (Some(a), Some(b)) if a.eq_ignore_ascii_case(b)
        );
        if category_hit {
            score += CATEGORY_POINTS;
        }

        score.min(100)
    }

    /// 15 for an exact amount, tapering to 5 at the edge of the tolerance.
    fn amount_points(&self, candidate: &TransactionCandidate, series: &RecurringSeries) -> u8 {
        let Some(expected) = series.expected_amount.filter(|a| a.is_positive()) else {
            return 0;
        };
        let diff = (candidate.amount() - expected).abs().as_decimal();
        let Some(ratio) = diff.checked_div(expected.as_decimal()).and_then(|r| r.to_f64()) else {
            return 0;
        };
        if ratio > self.amount_tolerance {
            return 0;
        }
        if self.amount_tolerance <= 0.0 {
            return AMOUNT_POINTS as u8;
        }
        (AMOUNT_POINTS - 10.0 * ratio / self.amount_tolerance).round() as u8
    }

    fn match_one(&self, query: &RecurringQuery<'_>, series: &[RecurringSeries]) -> RecurringMatch {
        // First declared series wins ties.
        let mut best: Option<(&RecurringSeries, u8)> = None;
        for s in series {
            let score = self.score(query, s);
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((s, score));
            }
        }

        match best {
            Some((s, score)) if score >= self.min_score && score > 0 => RecurringMatch {
                confidence: score_tier(score),
                series_id: Some(s.id),
                suggested_name: Some(s.name.clone()),
                suggested_category: s.category.clone(),
                match_score: score,
            },
            _ => RecurringMatch::none(),
        }
    }
}

fn score_tier(score: u8) -> ConfidenceTier {
    if score >= 80 {
        ConfidenceTier::High
    } else if score >= 60 {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    }
}

impl RecurringMatcher for SeriesMatcher {
    fn batch_match_recurring(
        &self,
        queries: &[RecurringQuery<'_>],
        series: &[RecurringSeries],
    ) -> Vec<RecurringMatch> {
        queries.iter().map(|q| self.match_one(q, series)).collect()
    }
}
