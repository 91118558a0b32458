use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tally_core::{Money, TransactionCandidate};
use tracing::debug;

use crate::categorizer::Categorizer;
use crate::message::{split_messages, MessageParser};
use crate::statement::{LineStatus, StatementParser};

pub const UNCATEGORIZED: &str = "Uncategorized";
const TOP_PAYEES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: Money,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthTotal {
    pub year: i32,
    pub month: u32,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayeeTotal {
    pub payee: String,
    pub total: Money,
    pub count: usize,
}

/// Aggregates over a pile of messages or a whole statement, without review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingSummary {
    /// Sends, purchases and withdrawals.
    pub total_spent: Money,
    /// Receipts and deposits.
    pub total_received: Money,
    /// Spend per category, largest first.
    pub by_category: Vec<CategoryTotal>,
    /// Spend per calendar month, oldest first.
    pub by_month: Vec<MonthTotal>,
    /// Largest counterparties by spend.
    pub top_payees: Vec<PayeeTotal>,
    pub parsed: usize,
    pub unparsed: usize,
}

impl SpendingSummary {
    pub fn from_messages(parser: &MessageParser, categorizer: &Categorizer, text: &str) -> Self {
        let mut unparsed = 0;
        let candidates: Vec<TransactionCandidate> = split_messages(text)
            .into_iter()
            .filter_map(|segment| {
                let parsed = parser.parse(segment).ok();
                if parsed.is_none() {
                    unparsed += 1;
                }
                parsed
            })
            .collect();
        Self::from_candidates(categorizer, &candidates, unparsed)
    }

    /// Completed statement lines are rewritten as messages and sent through
    /// the message parser, so both sources share one categorization path.
    pub fn from_statement(
        statement_parser: &StatementParser,
        parser: &MessageParser,
        categorizer: &Categorizer,
        text: &str,
    ) -> Self {
        let parse = statement_parser.parse_detailed(text);
        let mut unparsed = parse.unmatched;
        let candidates: Vec<TransactionCandidate> = parse
            .lines
            .iter()
            .filter(|line| line.status == LineStatus::Completed)
            .filter_map(|line| {
                let candidate = line.to_message().and_then(|m| parser.parse(&m).ok());
                if candidate.is_none() {
                    debug!(receipt = %line.receipt, "statement line did not round-trip");
                    unparsed += 1;
                }
                candidate
            })
            .collect();
        Self::from_candidates(categorizer, &candidates, unparsed)
    }

    pub fn from_candidates(
        categorizer: &Categorizer,
        candidates: &[TransactionCandidate],
        unparsed: usize,
    ) -> Self {
        let mut total_spent = Money::zero();
        let mut total_received = Money::zero();
        let mut categories: BTreeMap<String, (Money, usize)> = BTreeMap::new();
        let mut months: BTreeMap<(i32, u32), Money> = BTreeMap::new();
        let mut payees: BTreeMap<String, (Money, usize)> = BTreeMap::new();

        for candidate in candidates {
            let amount = candidate.amount();
            if !candidate.kind().is_outflow() {
                total_received = total_received + amount;
                continue;
            }
            total_spent = total_spent + amount;

            let category = categorizer
                .categorize_candidate(candidate)
                .category
                .unwrap_or_else(|| UNCATEGORIZED.to_string());
            let slot = categories.entry(category).or_insert((Money::zero(), 0));
            slot.0 = slot.0 + amount;
            slot.1 += 1;

            let month = months
                .entry((candidate.year(), candidate.month()))
                .or_insert_with(Money::zero);
            *month = *month + amount;

            if let Some(payee) = candidate.counterparty_raw() {
                let slot = payees.entry(payee.to_string()).or_insert((Money::zero(), 0));
                slot.0 = slot.0 + amount;
                slot.1 += 1;
            }
        }

        let mut by_category: Vec<CategoryTotal> = categories
            .into_iter()
            .map(|(category, (total, count))| CategoryTotal { category, total, count })
            .collect();
        // Stable sort keeps name order among equal totals.
        by_category.sort_by(|a, b| b.total.cmp(&a.total));

        let mut top_payees: Vec<PayeeTotal> = payees
            .into_iter()
            .map(|(payee, (total, count))| PayeeTotal { payee, total, count })
            .collect();
        top_payees.sort_by(|a, b| b.total.cmp(&a.total));
        top_payees.truncate(TOP_PAYEES);

        SpendingSummary {
            total_spent,
            total_received,
            by_category,
            by_month: months
                .into_iter()
                .map(|((year, month), total)| MonthTotal { year, month, total })
                .collect(),
            top_payees,
            parsed: candidates.len(),
            unparsed,
        }
    }
}
