use serde::{Deserialize, Serialize};
use std::fmt;

use super::series::SeriesId;

/// Coarse bucket used to triage review rows by how trustworthy an automatic
/// suggestion is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    /// Buckets a confidence in `[0, 1]`.
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence >= 0.75 {
            ConfidenceTier::High
        } else if confidence >= 0.4 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceTier::Low => write!(f, "low"),
            ConfidenceTier::Medium => write!(f, "medium"),
            ConfidenceTier::High => write!(f, "high"),
        }
    }
}

/// Output of the merchant categorizer. `matched_pattern` and `tokens_matched`
/// exist so a suggestion can be explained to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMatch {
    pub category: Option<String>,
    pub score: f32,
    pub confidence: f32,
    pub matched_pattern: Option<String>,
    pub tokens_matched: Vec<String>,
}

impl CategoryMatch {
    pub fn none() -> Self {
        CategoryMatch {
            category: None,
            score: 0.0,
            confidence: 0.0,
            matched_pattern: None,
            tokens_matched: Vec::new(),
        }
    }

    /// `confidence = min(1, score / denominator)`.
    pub fn scored(
        category: String,
        score: f32,
        denominator: f32,
        matched_pattern: Option<String>,
        tokens_matched: Vec<String>,
    ) -> Self {
        let score = score.max(0.0);
        CategoryMatch {
            category: Some(category),
            score,
            confidence: (score / denominator).min(1.0),
            matched_pattern,
            tokens_matched,
        }
    }

    pub fn tier(&self) -> ConfidenceTier {
        ConfidenceTier::from_confidence(self.confidence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayeeMatchedBy {
    PhoneExact,
    PhonePartial,
    NameFuzzy,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayeeMatch {
    pub confidence: ConfidenceTier,
    pub suggested_name: Option<String>,
    pub suggested_category: Option<String>,
    pub matched_by: PayeeMatchedBy,
    /// History entry the suggestion was taken from.
    pub matched_entry: Option<i64>,
}

impl PayeeMatch {
    pub fn none() -> Self {
        PayeeMatch {
            confidence: ConfidenceTier::Low,
            suggested_name: None,
            suggested_category: None,
            matched_by: PayeeMatchedBy::None,
            matched_entry: None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.matched_by != PayeeMatchedBy::None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringMatch {
    pub confidence: ConfidenceTier,
    pub series_id: Option<SeriesId>,
    pub suggested_name: Option<String>,
    pub suggested_category: Option<String>,
    /// 0–100.
    pub match_score: u8,
}

impl RecurringMatch {
    pub fn none() -> Self {
        RecurringMatch {
            confidence: ConfidenceTier::Low,
            series_id: None,
            suggested_name: None,
            suggested_category: None,
            match_score: 0,
        }
    }
}
