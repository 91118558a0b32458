use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Captures;
use tally_core::{Money, TransactionCandidate, TransactionKind};
use thiserror::Error;
use tracing::{debug, warn};

/// Counterparty label used for transfers out of the linked savings account.
pub const SAVINGS_COUNTERPARTY: &str = "M-Shwari";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("message is empty")]
    Empty,
    #[error("no positive amount found in message")]
    NoAmount,
}

// ── Compiled regex cache ─────────────────────────────────────────────────────

re!(re_sent,
    r"(?i)^(?:Ksh\.?\s?)?([\d,]+(?:\.\d+)?)\s+sent\s+to\s+(.+?)\.?\s+on\s+(\d{1,2}/\d{1,2}/\d{2,4})\s+at\s+(\d{1,2}:\d{2}\s*[AP]M)\.?\s*New\s+M-PESA\s+balance\s+is\s+(?:Ksh\.?\s?)?([\d,]+(?:\.\d+)?)");
re!(re_confirmed,
    r"(?i)^([A-Z0-9]{6,12})\s+Confirmed\.?\s*(?:Ksh\.?\s?)?([\d,]+(?:\.\d+)?)\s+(sent|paid)\s+to\s+(.+?)\.?\s+on\s+(\d{1,2}/\d{1,2}/\d{2,4})\s+at\s+(\d{1,2}:\d{2}\s*[AP]M)\.?(?:\s*New\s+M-PESA\s+balance\s+is\s+(?:Ksh\.?\s?)?([\d,]+(?:\.\d+)?))?");
re!(re_savings,
    r"(?i)(?:Ksh\.?\s?)?([\d,]+(?:\.\d+)?)\s+transferred\s+from\s+(?:M-?Shwari|savings)\s+account\s+on\s+(\d{1,2}/\d{1,2}/\d{2,4})\s+at\s+(\d{1,2}:\d{2}\s*[AP]M)");
re!(re_received,
    r"(?i)received\s+(?:Ksh\.?\s?)?([\d,]+(?:\.\d+)?)\s+from\s+(.+?)\.?\s+on\s+(\d{1,2}/\d{1,2}/\d{2,4})\s+at\s+(\d{1,2}:\d{2}\s*[AP]M)");
re!(re_bought,
    r"(?i)bought\s+goods\s+worth\s+(?:Ksh\.?\s?)?([\d,]+(?:\.\d+)?)\s+(?:from|at)\s+(.+?)(?:\.?\s+on\s+\d|\.?\s*New\s|\.\s+(?:Your|M-PESA|Transaction)|\.?$)");
re!(re_withdrew,
    r"(?i)withdr(?:ew|aw)\s+(?:Ksh\.?\s?)?([\d,]+(?:\.\d+)?)\s+from\s+(.+?)(?:\.?\s+on\s+\d|\.?\s*New\s|\.\s+(?:Your|M-PESA|Transaction)|\.?$)");
re!(re_deposited,
    r"(?i)(?:Ksh\.?\s?)?([\d,]+(?:\.\d+)?)\s+deposited\s+at\s+(.+?)(?:\.?\s+on\s+\d|\.?\s*New\s|\.\s+(?:Your|M-PESA|Transaction)|\.?$)");

re!(re_on_date_time,
    r"(?i)\bon\s+(\d{1,2}/\d{1,2}/\d{2,4})\s+at\s+(\d{1,2}:\d{2}\s*[AP]M)");
re!(re_balance,
    r"(?i)M-PESA\s+balance\s+is\s+(?:Ksh\.?\s?)?([\d,]+(?:\.\d+)?)");
re!(re_currency_amount,
    r"(?i)\b(?:Ksh|KES)\.?\s?([\d,]+(?:\.\d+)?)");
re!(re_plain_amount,
    r"\b(\d[\d,]*\.\d{2})\b");
re!(re_phone,
    r"(\+?254[17]\d{8}|0[17]\d{8}|0[17]\d{1,2}\*+\d{2,3}|254[17]\d{0,2}\*+\d{2,3})");
re!(re_message_break,
    r"\r?\n[ \t]*\r?\n\s*");

// ── Grammar ladder ───────────────────────────────────────────────────────────

/// One recognised message dialect.
pub struct Grammar {
    pub name: &'static str,
    matcher: fn(&str) -> Option<TransactionCandidate>,
}

impl Grammar {
    pub fn try_parse(&self, message: &str) -> Option<TransactionCandidate> {
        (self.matcher)(message)
    }
}

const GRAMMARS: &[Grammar] = &[
    Grammar { name: "sent", matcher: match_sent },
    Grammar { name: "confirmed", matcher: match_confirmed },
    Grammar { name: "savings_transfer", matcher: match_savings_transfer },
    Grammar { name: "received", matcher: match_received },
    Grammar { name: "bought", matcher: match_bought },
    Grammar { name: "withdrew", matcher: match_withdrew },
    Grammar { name: "deposited", matcher: match_deposited },
];

fn match_sent(message: &str) -> Option<TransactionCandidate> {
    let c = re_sent().captures(message)?;
    build(
        message,
        "sent",
        Fields {
            amount: c.get(1)?.as_str(),
            kind: TransactionKind::Send,
            counterparty: cap(&c, 2),
            balance: cap(&c, 5),
            when: Some((c.get(3)?.as_str(), c.get(4)?.as_str())),
        },
    )
}

fn match_confirmed(message: &str) -> Option<TransactionCandidate> {
    let c = re_confirmed().captures(message)?;
    let kind = if c.get(3)?.as_str().eq_ignore_ascii_case("paid") {
        TransactionKind::Buy
    } else {
        TransactionKind::Send
    };
    build(
        message,
        "confirmed",
        Fields {
            amount: c.get(2)?.as_str(),
            kind,
            counterparty: cap(&c, 4),
            balance: cap(&c, 7),
            when: Some((c.get(5)?.as_str(), c.get(6)?.as_str())),
        },
    )
}

fn match_savings_transfer(message: &str) -> Option<TransactionCandidate> {
    let c = re_savings().captures(message)?;
    build(
        message,
        "savings_transfer",
        Fields {
            amount: c.get(1)?.as_str(),
            kind: TransactionKind::Receive,
            counterparty: Some(SAVINGS_COUNTERPARTY),
            balance: balance_clause(message),
            when: Some((c.get(2)?.as_str(), c.get(3)?.as_str())),
        },
    )
}

fn match_received(message: &str) -> Option<TransactionCandidate> {
    let c = re_received().captures(message)?;
    build(
        message,
        "received",
        Fields {
            amount: c.get(1)?.as_str(),
            kind: TransactionKind::Receive,
            counterparty: cap(&c, 2),
            balance: balance_clause(message),
            when: Some((c.get(3)?.as_str(), c.get(4)?.as_str())),
        },
    )
}

fn match_bought(message: &str) -> Option<TransactionCandidate> {
    let c = re_bought().captures(message)?;
    build(
        message,
        "bought",
        Fields {
            amount: c.get(1)?.as_str(),
            kind: TransactionKind::Buy,
            counterparty: cap(&c, 2),
            balance: balance_clause(message),
            when: date_time_clause(message),
        },
    )
}

fn match_withdrew(message: &str) -> Option<TransactionCandidate> {
    let c = re_withdrew().captures(message)?;
    build(
        message,
        "withdrew",
        Fields {
            amount: c.get(1)?.as_str(),
            kind: TransactionKind::Withdraw,
            counterparty: cap(&c, 2),
            balance: balance_clause(message),
            when: date_time_clause(message),
        },
    )
}

fn match_deposited(message: &str) -> Option<TransactionCandidate> {
    let c = re_deposited().captures(message)?;
    build(
        message,
        "deposited",
        Fields {
            amount: c.get(1)?.as_str(),
            kind: TransactionKind::Deposit,
            counterparty: cap(&c, 2),
            balance: balance_clause(message),
            when: date_time_clause(message),
        },
    )
}

// ── Public parsing API ───────────────────────────────────────────────────────

/// Parser for mobile-money notification texts. Grammars are tried in
/// declaration order and the first one that yields a candidate wins.
#[derive(Debug, Clone)]
pub struct MessageParser {
    /// Whether an unrecognised message may still yield a degraded candidate
    /// from the first amount found in it.
    pub allow_fallback: bool,
}

impl Default for MessageParser {
    fn default() -> Self {
        Self { allow_fallback: true }
    }
}

impl MessageParser {
    pub fn new(allow_fallback: bool) -> Self {
        Self { allow_fallback }
    }

    pub fn grammars() -> &'static [Grammar] {
        GRAMMARS
    }

    pub fn parse(&self, message: &str) -> Result<TransactionCandidate, ParseError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ParseError::Empty);
        }

        for grammar in GRAMMARS {
            if let Some(candidate) = grammar.try_parse(message) {
                debug!(grammar = grammar.name, kind = %candidate.kind(), "Parsed message");
                return Ok(candidate);
            }
        }

        if !self.allow_fallback {
            return Err(ParseError::NoAmount);
        }

        let candidate = fallback(message).ok_or(ParseError::NoAmount)?;
        warn!(amount = %candidate.amount(), "No grammar matched message, using first amount found");
        Ok(candidate)
    }

    /// Parses bulk text where messages are separated by one or more blank
    /// lines. Results keep input order.
    pub fn parse_batch(&self, text: &str) -> Vec<Result<TransactionCandidate, ParseError>> {
        split_messages(text).into_iter().map(|m| self.parse(m)).collect()
    }
}

/// Splits bulk text on runs of blank lines, dropping empty segments.
pub fn split_messages(text: &str) -> Vec<&str> {
    re_message_break()
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn fallback(message: &str) -> Option<TransactionCandidate> {
    let amount = re_currency_amount()
        .captures_iter(message)
        .chain(re_plain_amount().captures_iter(message))
        .filter_map(|c| Money::parse(c.get(1)?.as_str()))
        .find(|m| m.is_positive())?;
    TransactionCandidate::new(amount, TransactionKind::Send, now(), message)
}

// ── Candidate assembly ───────────────────────────────────────────────────────

struct Fields<'a> {
    amount: &'a str,
    kind: TransactionKind,
    counterparty: Option<&'a str>,
    balance: Option<&'a str>,
    when: Option<(&'a str, &'a str)>,
}

fn build(source: &str, grammar: &str, fields: Fields<'_>) -> Option<TransactionCandidate> {
    let Some(amount) = Money::parse(fields.amount).filter(|m| m.is_positive()) else {
        debug!(grammar, amount = fields.amount, "Grammar matched but amount is not positive");
        return None;
    };

    let timestamp = match fields.when {
        Some((date, time)) => parse_timestamp(date, time).unwrap_or_else(|| {
            warn!(grammar, date, time, "Unparseable date/time, using current time");
            now()
        }),
        None => {
            warn!(grammar, "No date/time in message, using current time");
            now()
        }
    };

    let counterparty = fields.counterparty.and_then(clean_counterparty);
    let phone = counterparty.as_deref().and_then(extract_phone);

    Some(
        TransactionCandidate::new(amount, fields.kind, timestamp, source)?
            .with_counterparty(counterparty)
            .with_balance(fields.balance.and_then(Money::parse))
            .with_phone(phone),
    )
}

fn cap<'a>(c: &Captures<'a>, i: usize) -> Option<&'a str> {
    c.get(i).map(|m| m.as_str())
}

fn balance_clause(message: &str) -> Option<&str> {
    re_balance()
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn date_time_clause(message: &str) -> Option<(&str, &str)> {
    let c = re_on_date_time().captures(message)?;
    Some((c.get(1)?.as_str(), c.get(2)?.as_str()))
}

/// Trims whitespace and trailing punctuation; an empty result is unset.
pub fn clean_counterparty(raw: &str) -> Option<String> {
    let cleaned = raw
        .trim()
        .trim_end_matches(|c: char| (c.is_ascii_punctuation() && c != ')') || c.is_whitespace())
        .trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

/// Pulls a Kenyan mobile number (full or statement-masked) out of free text.
pub fn extract_phone(text: &str) -> Option<String> {
    re_phone().find(text).map(|m| m.as_str().to_string())
}

// ── Date/time ────────────────────────────────────────────────────────────────

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Parses `d/m/yy` (or `d/m/yyyy`) plus a 12-hour `h:mm AM` time. Returns
/// `None` when any field is out of range.
pub fn parse_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    Some(NaiveDateTime::new(parse_date(date)?, parse_time(time)?))
}

fn parse_date(date: &str) -> Option<NaiveDate> {
    let mut parts = date.trim().split('/');
    let day: u32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let year_str = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let year: i32 = match year_str.len() {
        2 => 2000 + year_str.parse::<i32>().ok()?,
        4 => year_str.parse().ok()?,
        _ => return None,
    };

    if !(1..=31).contains(&day) || !(1..=12).contains(&month) || !(2000..=2100).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_time(time: &str) -> Option<NaiveTime> {
    let time = time.trim();
    let split = time.len().checked_sub(2)?;
    let (clock, meridiem) = (time.get(..split)?, time.get(split..)?);
    let (hour, minute) = clock.trim().split_once(':')?;
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;

    if !(1..=12).contains(&hour) || minute > 59 {
        return None;
    }
    let hour = match meridiem.to_ascii_uppercase().as_str() {
        "AM" => hour % 12,
        "PM" => hour % 12 + 12,
        _ => return None,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
