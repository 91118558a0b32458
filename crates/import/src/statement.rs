use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tally_core::{Money, TransactionCandidate, TransactionKind};
use tracing::debug;

use crate::message::{clean_counterparty, extract_phone};

const DEFAULT_MIN_SEGMENT_LEN: usize = 30;
const UNMATCHED_SAMPLE_LIMIT: usize = 3;

re!(re_page_marker, r"(?i)^\s*page\s+\d+\s+of\s+\d+\s*$");
re!(re_table_header, r"(?i)^\s*receipt\s+no\.?\s+completion\s+time\b");
re!(re_disclaimer,
    r"(?i)^\s*(?:disclaimer\b|this\s+(?:statement|record)\s+is\b|verification\s+code\b|for\s+self[\s-]+help\b)");
re!(re_segment_start, r"(?m)^[A-Z0-9]{10}\s+\d{4}-\d{2}-\d{2}\b");
re!(re_line,
    r"^(?P<receipt>[A-Z0-9]{10})\s+(?P<time>\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2})\s+(?P<details>.+?)\s+(?P<status>(?i:completed|failed|pending))\s+(?P<paid_in>-?[\d,]+\.\d{2})\s+(?P<withdrawn>-?[\d,]+\.\d{2})\s+(?P<balance>-?[\d,]+\.\d{2})$");
re!(re_fee_details, r"(?i)(?:\bcharge|\bfee|\btransaction\s+cost)s?\s*$");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Completed,
    Failed,
    Pending,
}

impl LineStatus {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "completed" => Some(LineStatus::Completed),
            "failed" => Some(LineStatus::Failed),
            "pending" => Some(LineStatus::Pending),
            _ => None,
        }
    }
}

/// One completed row of a statement table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerLine {
    pub receipt: String,
    pub completed_at: NaiveDateTime,
    pub details: String,
    pub status: LineStatus,
    pub paid_in: Money,
    /// Stored as an absolute value even when the statement prints it negative.
    pub withdrawn: Money,
    pub balance: Money,
}

impl LedgerLine {
    fn kind(&self) -> Option<TransactionKind> {
        if self.withdrawn.is_positive() {
            Some(TransactionKind::Send)
        } else if self.paid_in.is_positive() {
            Some(TransactionKind::Receive)
        } else {
            None
        }
    }

    /// Rewrites the line in the notification dialect the message parser
    /// understands, so statement rows can share the message pipeline.
    /// `None` for lines that move no money.
    pub fn to_message(&self) -> Option<String> {
        let date = self.completed_at.format("%-d/%-m/%y");
        let time = self.completed_at.format("%-I:%M %p");
        let balance = self.balance.abs();
        match self.kind()? {
            TransactionKind::Send => Some(format!(
                "Ksh{} sent to {} on {date} at {time}. New M-PESA balance is Ksh{balance}.",
                self.withdrawn, self.details
            )),
            _ => Some(format!(
                "{} Confirmed. You have received Ksh{} from {} on {date} at {time}. New M-PESA balance is Ksh{balance}.",
                self.receipt, self.paid_in, self.details
            )),
        }
    }

    /// Builds a candidate directly, keeping the statement's full-precision
    /// completion time.
    pub fn to_candidate(&self) -> Option<TransactionCandidate> {
        let kind = self.kind()?;
        let amount = match kind {
            TransactionKind::Send => self.withdrawn,
            _ => self.paid_in,
        };
        let source = format!("{} {}", self.receipt, self.details);
        Some(
            TransactionCandidate::new(amount, kind, self.completed_at, &source)?
                .with_counterparty(counterparty_from_details(&self.details))
                .with_balance(Some(self.balance))
                .with_phone(extract_phone(&self.details)),
        )
    }
}

/// `Customer Transfer to 0712***678 - DANIEL EXAMPLE` → `DANIEL EXAMPLE`.
fn counterparty_from_details(details: &str) -> Option<String> {
    match details.split_once(" - ") {
        Some((_, rest)) => clean_counterparty(rest),
        None => clean_counterparty(details),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementParse {
    pub lines: Vec<LedgerLine>,
    /// Segments long enough to be a transaction that failed the line grammar.
    pub unmatched: usize,
    pub unmatched_samples: Vec<String>,
    pub fee_lines_dropped: usize,
}

/// Parser for plain text extracted from a statement document.
#[derive(Debug, Clone)]
pub struct StatementParser {
    pub min_segment_len: usize,
}

impl Default for StatementParser {
    fn default() -> Self {
        Self { min_segment_len: DEFAULT_MIN_SEGMENT_LEN }
    }
}

impl StatementParser {
    pub fn parse(&self, text: &str) -> Vec<LedgerLine> {
        self.parse_detailed(text).lines
    }

    pub fn parse_detailed(&self, text: &str) -> StatementParse {
        let cleaned = strip_boilerplate(text);
        let mut out = StatementParse::default();

        for segment in split_segments(&cleaned) {
            if segment.len() < self.min_segment_len {
                debug!(segment = %segment, "Skipping short statement segment");
                continue;
            }

            let Some(line) = parse_segment(&segment) else {
                debug!(segment = %segment, "Statement segment did not match line grammar");
                out.unmatched += 1;
                if out.unmatched_samples.len() < UNMATCHED_SAMPLE_LIMIT {
                    out.unmatched_samples.push(segment);
                }
                continue;
            };

            // A principal transfer and its service charge are listed as two
            // rows; only the principal is kept.
            if re_fee_details().is_match(&line.details) {
                debug!(receipt = %line.receipt, details = %line.details, "Dropping fee line");
                out.fee_lines_dropped += 1;
                continue;
            }

            out.lines.push(line);
        }

        out
    }
}

/// Removes page markers, repeated table headers and disclaimer footers. A
/// footer runs until the next transaction row.
fn strip_boilerplate(text: &str) -> String {
    let mut kept = Vec::new();
    let mut in_footer = false;

    for line in text.lines() {
        if re_segment_start().is_match(line) {
            in_footer = false;
        } else if re_disclaimer().is_match(line) {
            in_footer = true;
        }
        if in_footer || re_page_marker().is_match(line) || re_table_header().is_match(line) {
            continue;
        }
        kept.push(line);
    }

    kept.join("\n")
}

/// Splits at every row start, so a transaction wrapped across several
/// physical lines stays one segment. Text before the first row is dropped.
fn split_segments(text: &str) -> Vec<String> {
    let starts: Vec<usize> = re_segment_start().find_iter(text).map(|m| m.start()).collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            text[start..end].split_whitespace().collect::<Vec<_>>().join(" ")
        })
        .collect()
}

fn parse_segment(segment: &str) -> Option<LedgerLine> {
    let c = re_line().captures(segment)?;
    Some(LedgerLine {
        receipt: c["receipt"].to_string(),
        completed_at: NaiveDateTime::parse_from_str(&c["time"], "%Y-%m-%d %H:%M:%S").ok()?,
        details: c["details"].trim().to_string(),
        status: LineStatus::parse(&c["status"])?,
        paid_in: Money::parse(&c["paid_in"])?.abs(),
        withdrawn: Money::parse(&c["withdrawn"])?.abs(),
        balance: Money::parse(&c["balance"])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageParser;
    use chrono::NaiveDate;

    const STATEMENT: &str = "\
MPESA FULL STATEMENT
Customer Name: DANIEL EXAMPLE
Page 1 of 2
Receipt No. Completion Time Details Transaction Status Paid In Withdrawn Balance
TL4ABC1234 2025-12-04 12:25:31 Customer Transfer to 0712***678 - DANIEL EXAMPLE Completed 0.00 -6,800.00 1,045.00
TL4ABC1235 2025-12-04 12:25:31 Customer Transfer of Funds Charge Completed 0.00 -13.00 1,032.00
TL4ABC1236 2025-12-05 08:10:02 Merchant Payment to 123456 - NAIVAS
NAIROBI Completed 0.00 -450.00 582.00
Disclaimer: This record is produced for your information only
and does not constitute a legal document.
Page 2 of 2
Receipt No. Completion Time Details Transaction Status Paid In Withdrawn Balance
TL4ABC1237 2025-12-06 09:00:00 Funds received from 0722***111 - JANE WANJIKU Completed 2,000.00 0.00 2,582.00
TL4ABC1238 2025-12-06 10:15:00 Pay Bill Online to 888880 - KPLC PREPAID Acc. 5512 Failed 0.00 -1,000.00 2,582.00
";

    fn lines() -> Vec<LedgerLine> {
        StatementParser::default().parse(STATEMENT)
    }

    #[test]
    fn parses_rows_and_drops_boilerplate() {
        let lines = lines();
        let receipts: Vec<&str> = lines.iter().map(|l| l.receipt.as_str()).collect();
        assert_eq!(receipts, vec!["TL4ABC1234", "TL4ABC1236", "TL4ABC1237", "TL4ABC1238"]);
    }

    #[test]
    fn normalizes_amounts() {
        let first = &lines()[0];
        assert_eq!(first.withdrawn, Money::from_cents(680_000));
        assert_eq!(first.paid_in, Money::zero());
        assert_eq!(first.balance, Money::from_cents(104_500));
        assert_eq!(
            first.completed_at,
            NaiveDate::from_ymd_opt(2025, 12, 4).unwrap().and_hms_opt(12, 25, 31).unwrap()
        );
    }

    #[test]
    fn joins_wrapped_rows() {
        let naivas = &lines()[1];
        assert_eq!(naivas.details, "Merchant Payment to 123456 - NAIVAS NAIROBI");
        assert_eq!(naivas.withdrawn, Money::from_cents(45_000));
    }

    #[test]
    fn fee_lines_never_surface() {
        let parsed = StatementParser::default().parse_detailed(STATEMENT);
        assert_eq!(parsed.fee_lines_dropped, 1);
        assert!(parsed.lines.iter().all(|l| !l.details.contains("Charge")));
    }

    #[test]
    fn status_keyword_is_captured() {
        let lines = lines();
        assert_eq!(lines[2].status, LineStatus::Completed);
        assert_eq!(lines[3].status, LineStatus::Failed);
    }

    #[test]
    fn short_segments_are_noise_and_malformed_ones_are_counted() {
        let text = "TL4ABC1239 2025-12-07\nTL4ABC1240 2025-12-07 11:00:00 Something without the amount columns at all";
        let parsed = StatementParser::default().parse_detailed(text);
        assert!(parsed.lines.is_empty());
        assert_eq!(parsed.unmatched, 1);
        assert_eq!(parsed.unmatched_samples.len(), 1);
    }

    #[test]
    fn message_roundtrip_keeps_amount_and_kind() {
        let parser = MessageParser::default();
        for line in lines() {
            let message = line.to_message().unwrap();
            let candidate = parser.parse(&message).unwrap();
            if line.withdrawn.is_positive() {
                assert_eq!(candidate.kind(), TransactionKind::Send, "{message}");
                assert_eq!(candidate.amount(), line.withdrawn);
            } else {
                assert_eq!(candidate.kind(), TransactionKind::Receive, "{message}");
                assert_eq!(candidate.amount(), line.paid_in);
            }
        }
    }

    #[test]
    fn roundtrip_message_keeps_minute_precision_time() {
        let message = lines()[0].to_message().unwrap();
        assert!(message.contains("on 4/12/25 at 12:25 PM"), "{message}");
    }

    #[test]
    fn candidate_from_line() {
        let c = lines()[0].to_candidate().unwrap();
        assert_eq!(c.kind(), TransactionKind::Send);
        assert_eq!(c.amount(), Money::from_cents(680_000));
        assert_eq!(c.counterparty_raw(), Some("DANIEL EXAMPLE"));
        assert_eq!(c.phone_number(), Some("0712***678"));
        assert_eq!(c.balance_after(), Some(Money::from_cents(104_500)));
        assert!(c.reference().starts_with("TL4ABC1234"));
    }

    #[test]
    fn line_without_movement_has_no_message() {
        let mut line = lines()[0].clone();
        line.withdrawn = Money::zero();
        assert!(line.to_message().is_none());
        assert!(line.to_candidate().is_none());
    }
}
