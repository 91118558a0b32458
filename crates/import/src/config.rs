use std::path::Path;

use serde::{Deserialize, Serialize};
use tally_core::TransactionKind;
use thiserror::Error;

use crate::categorizer::{CategoryRule, Categorizer};
use crate::matching::{HistoryPayeeMatcher, SeriesMatcher};
use crate::message::MessageParser;
use crate::statement::StatementParser;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Rule #{index} is invalid: {reason}")]
    InvalidRule { index: usize, reason: String },
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Where a batch of raw text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Messages,
    Statement,
}

/// Import settings, normally read from a TOML file:
///
/// ```toml
/// [policy]
/// sms_kinds = ["send", "buy"]
/// statement_kinds = ["send", "buy", "withdraw"]
///
/// [[rules]]
/// category = "Pets"
/// patterns = ["vet", "pet shop"]
/// match_type = "contains"
///
/// [matching]
/// payee_name_threshold = 0.8
/// recurring_min_score = 60
/// recurring_amount_tolerance = 0.1
///
/// [messages]
/// allow_fallback = true
///
/// [statement]
/// include_pending = false
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub policy: KindPolicy,
    pub rules: Vec<CategoryRule>,
    pub matching: MatchingConfig,
    pub messages: MessageConfig,
    pub statement: StatementConfig,
}

/// Transaction kinds admitted into a review batch, per modality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindPolicy {
    pub sms_kinds: Vec<TransactionKind>,
    pub statement_kinds: Vec<TransactionKind>,
}

impl Default for KindPolicy {
    fn default() -> Self {
        let outflows = vec![TransactionKind::Send, TransactionKind::Buy];
        KindPolicy {
            sms_kinds: outflows.clone(),
            statement_kinds: outflows,
        }
    }
}

impl KindPolicy {
    pub fn allows(&self, modality: Modality, kind: TransactionKind) -> bool {
        match modality {
            Modality::Messages => self.sms_kinds.contains(&kind),
            Modality::Statement => self.statement_kinds.contains(&kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub payee_name_threshold: f32,
    pub recurring_min_score: u8,
    pub recurring_amount_tolerance: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        MatchingConfig {
            payee_name_threshold: 0.8,
            recurring_min_score: 60,
            recurring_amount_tolerance: 0.1,
        }
    }
}

impl MatchingConfig {
    pub fn payee_matcher(&self) -> HistoryPayeeMatcher {
        HistoryPayeeMatcher::new(self.payee_name_threshold)
    }

    pub fn series_matcher(&self) -> SeriesMatcher {
        SeriesMatcher::new(self.recurring_min_score, self.recurring_amount_tolerance)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    /// Keep unrecognised messages as degraded candidates built from their
    /// first amount.
    pub allow_fallback: bool,
}

impl Default for MessageConfig {
    fn default() -> Self {
        MessageConfig { allow_fallback: true }
    }
}

impl MessageConfig {
    pub fn parser(&self) -> MessageParser {
        MessageParser::new(self.allow_fallback)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatementConfig {
    /// Let `Pending` statement lines through alongside `Completed` ones.
    pub include_pending: bool,
    /// Segments shorter than this are treated as noise.
    pub min_segment_len: usize,
}

impl Default for StatementConfig {
    fn default() -> Self {
        StatementConfig {
            include_pending: false,
            min_segment_len: 30,
        }
    }
}

impl StatementConfig {
    pub fn parser(&self) -> StatementParser {
        StatementParser {
            min_segment_len: self.min_segment_len,
        }
    }
}

impl ImportConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: ImportConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.category.trim().is_empty() {
                return Err(ConfigError::InvalidRule {
                    index,
                    reason: "category is empty".to_string(),
                });
            }
            if rule.patterns.iter().all(|p| p.trim().is_empty()) {
                return Err(ConfigError::InvalidRule {
                    index,
                    reason: format!("'{}' has no patterns", rule.category),
                });
            }
        }

        let threshold = self.matching.payee_name_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidValue {
                field: "matching.payee_name_threshold",
                reason: format!("{threshold} is outside 0..=1"),
            });
        }
        if self.matching.recurring_min_score > 100 {
            return Err(ConfigError::InvalidValue {
                field: "matching.recurring_min_score",
                reason: format!("{} is above 100", self.matching.recurring_min_score),
            });
        }
        let tolerance = self.matching.recurring_amount_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "matching.recurring_amount_tolerance",
                reason: format!("{tolerance} must be a non-negative number"),
            });
        }
        Ok(())
    }

    /// Built-in categories followed by the configured extra rules.
    pub fn categorizer(&self) -> Categorizer {
        Categorizer::default().with_rules(self.rules.clone())
    }
}
