use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesId(pub i64);

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A previously established repeating obligation (rent, a subscription, a
/// standing school fee) that new transactions may belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringSeries {
    pub id: SeriesId,
    pub name: String,
    pub category: Option<String>,
    pub expected_amount: Option<Money>,
    pub payee_phone: Option<String>,
}

impl RecurringSeries {
    pub fn new(id: i64, name: &str) -> Self {
        RecurringSeries {
            id: SeriesId(id),
            name: name.to_string(),
            category: None,
            expected_amount: None,
            payee_phone: None,
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.expected_amount = Some(amount);
        self
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.payee_phone = Some(phone.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_id_display() {
        assert_eq!(SeriesId(42).to_string(), "42");
    }

    #[test]
    fn builder_sets_optional_fields() {
        let s = RecurringSeries::new(7, "Rent")
            .with_category("Housing")
            .with_amount(Money::from_cents(2_500_000))
            .with_phone("0712345678");
        assert_eq!(s.id, SeriesId(7));
        assert_eq!(s.category.as_deref(), Some("Housing"));
        assert_eq!(s.expected_amount, Some(Money::from_cents(2_500_000)));
        assert_eq!(s.payee_phone.as_deref(), Some("0712345678"));
    }
}
