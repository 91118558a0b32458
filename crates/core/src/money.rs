use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, 2))
    }

    /// `None` when the amount has no `i64` cent value.
    pub fn to_cents(self) -> Option<i64> {
        self.0.checked_mul(Decimal::ONE_HUNDRED)?.round().to_i64()
    }

    /// Largest magnitude `parse` accepts: the last amount whose cents fit in
    /// an `i64`.
    pub fn max_value() -> Self {
        Money(Decimal::new(i64::MAX, 2))
    }

    pub fn is_within_limit(self) -> bool {
        self.0.abs() <= Self::max_value().0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    /// Parses a statement or message amount such as `Ksh6,800.00`, `1,045.00`
    /// or `-250`. Thousands separators and a `Ksh`/`KES` prefix are stripped;
    /// the sign is preserved. Amounts beyond [`Money::max_value`] are refused.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();
        let s = strip_currency(s);
        let cleaned: String = s.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
        if cleaned.is_empty() {
            return None;
        }
        Decimal::from_str(&cleaned)
            .ok()
            .map(Money::from_decimal)
            .filter(|m| m.is_within_limit())
    }
}

fn strip_currency(s: &str) -> &str {
    for prefix in ["KSH", "KES", "Ksh", "Kes", "ksh", "kes"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return rest.trim_start_matches('.').trim_start();
        }
    }
    s
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |a, b| a + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_thousands_separators() {
        assert_eq!(Money::parse("6,800.00"), Some(Money::from_cents(680_000)));
        assert_eq!(Money::parse("1,234,567.89"), Some(Money::from_cents(123_456_789)));
    }

    #[test]
    fn parse_strips_currency_prefix() {
        assert_eq!(Money::parse("Ksh1,045.00"), Some(Money::from_cents(104_500)));
        assert_eq!(Money::parse("KES 50"), Some(Money::from_cents(5_000)));
        assert_eq!(Money::parse("Ksh. 20.50"), Some(Money::from_cents(2_050)));
    }

    #[test]
    fn parse_keeps_sign() {
        let m = Money::parse("-6,800.00").unwrap();
        assert!(!m.is_positive());
        assert_eq!(m.abs(), Money::from_cents(680_000));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(Money::parse(""), None);
        assert_eq!(Money::parse("Ksh"), None);
        assert_eq!(Money::parse("abc"), None);
    }

    #[test]
    fn display_two_decimals() {
        assert_eq!(Money::from_cents(104_500).to_string(), "1045.00");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
    }

    #[test]
    fn sum_of_amounts() {
        let total: Money = [100, 250, 5].iter().map(|c| Money::from_cents(*c)).sum();
        assert_eq!(total.to_cents(), Some(355));
    }

    #[test]
    fn parse_refuses_amounts_without_a_cent_value() {
        assert_eq!(Money::parse("92,233,720,368,547,758.07"), Some(Money::max_value()));
        assert_eq!(Money::parse("92,233,720,368,547,758.08"), None);
        assert_eq!(Money::parse("Ksh100,000,000,000,000,000.00"), None);
        assert_eq!(Money::parse("-100000000000000000"), None);
    }

    #[test]
    fn to_cents_does_not_saturate() {
        assert_eq!(Money::max_value().to_cents(), Some(i64::MAX));
        let beyond = Money::from_decimal(Decimal::from(i64::MAX));
        assert_eq!(beyond.to_cents(), None);
        assert!(!beyond.is_within_limit());
    }

    #[test]
    fn checked_add_reports_overflow() {
        let huge = Money::from_decimal(Decimal::MAX);
        assert_eq!(huge.checked_add(huge), None);
        assert_eq!(
            Money::from_cents(150).checked_add(Money::from_cents(50)),
            Some(Money::from_cents(200))
        );
    }
}
