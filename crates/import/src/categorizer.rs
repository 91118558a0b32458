use regex::Regex;
use serde::{Deserialize, Serialize};
use tally_core::{CategoryMatch, TransactionCandidate};

/// Score that counts as "a solid double match".
pub const CONFIDENCE_DENOMINATOR: f32 = 22.0;

const WORD_SCORE: f32 = 12.0;
const CONTAINS_SCORE: f32 = 8.0;
const TOKEN_OVERLAP_SCORE: f32 = 3.0;
const CANONICAL_MERCHANT_BOOST: f32 = 7.5;
const PAYBILL_BOOST: f32 = 6.0;
const PAYBILL_CATEGORIES: &[&str] = &["Utilities", "Finance", "Work"];

re!(re_paybill_reference,
    r"(?:\b(?:paybill|pay bill|till|account|acc)\b\.?\s*(?:no\.?|number)?\s*)?\b\d{5,6}\b");

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Literal substring of the normalized text.
    #[default]
    Contains,
    /// Whole-word match.
    Word,
}

impl std::str::FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" => Ok(MatchType::Contains),
            "word" => Ok(MatchType::Word),
            other => Err(format!("Unknown match type: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryRule {
    pub category: String,
    pub patterns: Vec<String>,
    #[serde(default)]
    pub match_type: MatchType,
}

impl CategoryRule {
    pub fn new(category: &str, match_type: MatchType, patterns: &[&str]) -> Self {
        CategoryRule {
            category: category.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            match_type,
        }
    }
}

/// Built-in rule set, in declaration order (which is also tie-break order).
pub fn default_rules() -> Vec<CategoryRule> {
    use MatchType::{Contains, Word};
    vec![
        CategoryRule::new("Food & Drinks", Contains, &[
            "naivas", "carrefour", "quickmart", "chandarana", "cleanshelf", "supermarket",
            "java house", "artcaffe", "kfc", "pizza inn", "chicken inn", "restaurant", "cafe",
            "butchery", "grocer", "glovo", "bakery",
        ]),
        CategoryRule::new("Food & Drinks", Word, &["food", "eatery", "bar", "mama mboga", "hotel"]),
        CategoryRule::new("Transport", Contains, &[
            "uber", "bolt", "little cab", "matatu", "rubis", "petrol", "fuel", "parking",
            "easy coach", "total energies",
        ]),
        CategoryRule::new("Transport", Word, &["taxi", "bus", "fare", "sgr", "shell", "ntsa"]),
        CategoryRule::new("Utilities", Contains, &[
            "kplc", "kenya power", "nairobi water", "zuku", "tokens", "prepaid", "postpaid",
            "faiba", "safaricom home",
        ]),
        CategoryRule::new("Utilities", Word, &["water", "electricity", "internet", "wifi", "gas"]),
        CategoryRule::new("Shopping", Contains, &[
            "jumia", "kilimall", "boutique", "clothing", "electronics", "hardware",
        ]),
        CategoryRule::new("Shopping", Word, &["shop", "store", "mall"]),
        CategoryRule::new("Health", Contains, &[
            "pharmacy", "chemist", "hospital", "clinic", "medical", "nhif", "dental",
        ]),
        CategoryRule::new("Health", Word, &["doctor", "lab", "sha"]),
        CategoryRule::new("Entertainment", Contains, &[
            "netflix", "showmax", "dstv", "gotv", "spotify", "cinema", "sportpesa", "betika",
        ]),
        CategoryRule::new("Entertainment", Word, &["movie", "club", "game", "betting"]),
        CategoryRule::new("Education", Contains, &[
            "school", "academy", "university", "college", "tuition",
        ]),
        CategoryRule::new("Education", Word, &["fees", "helb", "books"]),
        CategoryRule::new("Housing", Contains, &["landlord", "apartment", "caretaker"]),
        CategoryRule::new("Housing", Word, &["rent", "house", "housing", "estate"]),
        CategoryRule::new("Finance", Contains, &[
            "bank", "sacco", "m-shwari", "mshwari", "fuliza", "loan", "insurance", "okoa",
        ]),
        CategoryRule::new("Finance", Word, &["kcb", "equity", "savings", "invest"]),
        CategoryRule::new("Work", Contains, &["office", "printing", "cyber", "stationery", "coworking"]),
        CategoryRule::new("Work", Word, &["business", "supplies", "client"]),
        CategoryRule::new("Family & Friends", Word, &[
            "mum", "mom", "dad", "family", "sister", "brother", "friend", "gift",
        ]),
    ]
}

/// Known merchant aliases; presence of any of them raises confidence in the
/// winning category once.
const CANONICAL_MERCHANTS: &[&str] = &[
    "naivas", "carrefour", "quickmart", "chandarana", "java house", "artcaffe", "kfc",
    "uber", "bolt", "kplc", "kenya power", "zuku", "nairobi water", "safaricom",
    "netflix", "showmax", "dstv", "jumia", "glovo", "m-shwari",
];

struct CompiledPattern {
    text: String,
    match_type: MatchType,
    word_regex: Option<Regex>,
}

struct CompiledCategory {
    name: String,
    patterns: Vec<CompiledPattern>,
}

/// Scores a text against every category; the best total wins. Scores are
/// explainable through `matched_pattern` and `tokens_matched`.
pub struct Categorizer {
    categories: Vec<CompiledCategory>,
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl Categorizer {
    /// Rules naming the same category are merged; category order is the
    /// order of first appearance.
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        let mut categorizer = Categorizer { categories: Vec::new() };
        categorizer.extend(rules);
        categorizer
    }

    /// Appends rules after the existing ones.
    pub fn with_rules(mut self, rules: Vec<CategoryRule>) -> Self {
        self.extend(rules);
        self
    }

    fn extend(&mut self, rules: Vec<CategoryRule>) {
        for rule in rules {
            let patterns = rule
                .patterns
                .iter()
                .map(|p| normalize(p))
                .filter(|p| !p.is_empty())
                .map(|text| CompiledPattern {
                    word_regex: match rule.match_type {
                        MatchType::Word => {
                            Regex::new(&format!(r"\b{}\b", regex::escape(&text))).ok()
                        }
                        MatchType::Contains => None,
                    },
                    text,
                    match_type: rule.match_type,
                });

            match self.categories.iter_mut().find(|c| c.name == rule.category) {
                Some(existing) => existing.patterns.extend(patterns),
                None => self.categories.push(CompiledCategory {
                    name: rule.category.clone(),
                    patterns: patterns.collect(),
                }),
            }
        }
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    pub fn categorize(&self, merchant: &str, description: Option<&str>) -> CategoryMatch {
        let text = match description {
            Some(d) if !d.trim().is_empty() => normalize(&format!("{merchant} {d}")),
            _ => normalize(merchant),
        };
        if text.is_empty() {
            return CategoryMatch::none();
        }
        let tokens = tokenize(&text);
        let paybill = re_paybill_reference().is_match(&text);

        let mut best: Option<Scored> = None;
        for category in &self.categories {
            let mut scored = score_category(category, &text, &tokens);
            if paybill && PAYBILL_CATEGORIES.contains(&category.name.as_str()) {
                scored.score += PAYBILL_BOOST;
            }
            // Strictly greater: the first declared category wins ties.
            if scored.score > 0.0 && best.as_ref().map_or(true, |b| scored.score > b.score) {
                best = Some(scored);
            }
        }

        let Some(mut best) = best else {
            return CategoryMatch::none();
        };
        if CANONICAL_MERCHANTS.iter().any(|alias| text.contains(alias)) {
            best.score += CANONICAL_MERCHANT_BOOST;
        }

        CategoryMatch::scored(
            best.name.to_string(),
            best.score,
            CONFIDENCE_DENOMINATOR,
            best.matched_pattern,
            best.tokens_matched,
        )
    }

    /// Categorizes by counterparty; the audit reference is used only when the
    /// candidate has no counterparty.
    pub fn categorize_candidate(&self, candidate: &TransactionCandidate) -> CategoryMatch {
        match candidate.counterparty_raw() {
            Some(counterparty) => self.categorize(counterparty, None),
            None => self.categorize("", Some(candidate.reference())),
        }
    }
}

struct Scored<'a> {
    name: &'a str,
    score: f32,
    matched_pattern: Option<String>,
    tokens_matched: Vec<String>,
}

fn score_category<'a>(category: &'a CompiledCategory, text: &str, tokens: &[&str]) -> Scored<'a> {
    let mut scored = Scored {
        name: &category.name,
        score: 0.0,
        matched_pattern: None,
        tokens_matched: Vec::new(),
    };
    let mut best_contribution = 0.0f32;

    for pattern in &category.patterns {
        let contribution = match pattern.match_type {
            MatchType::Word => {
                if pattern.word_regex.as_ref().is_some_and(|re| re.is_match(text)) {
                    push_overlaps(&mut scored.tokens_matched, tokens, &pattern.text);
                    WORD_SCORE
                } else {
                    0.0
                }
            }
            MatchType::Contains => {
                if text.contains(&pattern.text) {
                    let overlaps = push_overlaps(&mut scored.tokens_matched, tokens, &pattern.text);
                    CONTAINS_SCORE + TOKEN_OVERLAP_SCORE * overlaps as f32
                } else {
                    0.0
                }
            }
        };

        if contribution > best_contribution {
            best_contribution = contribution;
            scored.matched_pattern = Some(pattern.text.clone());
        }
        scored.score += contribution;
    }

    scored
}

/// Records tokens overlapping `pattern` (either contains the other) and
/// returns how many tokens overlapped.
fn push_overlaps(matched: &mut Vec<String>, tokens: &[&str], pattern: &str) -> usize {
    let mut count = 0;
    for token in tokens {
        if token.contains(pattern) || pattern.contains(token) {
            count += 1;
            if !matched.iter().any(|m| m == token) {
                matched.push(token.to_string());
            }
        }
    }
    count
}

/// Lowercase; punctuation other than `@ . -` becomes whitespace; whitespace
/// is collapsed.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || matches!(c, '@' | '.' | '-') {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Words of at least two characters that are not pure digits.
pub fn tokenize(normalized: &str) -> Vec<&str> {
    normalized
        .split_whitespace()
        .filter(|w| w.chars().count() >= 2 && !w.chars().all(|c| c.is_ascii_digit()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{ConfidenceTier, Money, TransactionKind};

    fn categorize(text: &str) -> CategoryMatch {
        Categorizer::default().categorize(text, None)
    }

    #[test]
    fn supermarket_till_is_food() {
        let m = categorize("NAIVAS NAIROBI TILL 2345");
        assert_eq!(m.category.as_deref(), Some("Food & Drinks"));
        assert!(m.confidence > 0.3, "confidence was {}", m.confidence);
        assert_eq!(m.matched_pattern.as_deref(), Some("naivas"));
        assert_eq!(m.tokens_matched, vec!["naivas".to_string()]);
    }

    #[test]
    fn contains_score_includes_token_overlap_and_merchant_boost() {
        // "naivas": +8 literal, +3 for the overlapping token, +7.5 canonical.
        let m = categorize("NAIVAS");
        assert!((m.score - 18.5).abs() < 1e-4, "score was {}", m.score);
        assert!((m.confidence - 18.5 / 22.0).abs() < 1e-4);
    }

    #[test]
    fn word_pattern_requires_whole_word() {
        assert_eq!(categorize("RENT DECEMBER").category.as_deref(), Some("Housing"));
        assert_ne!(categorize("PARENTS EVENING").category.as_deref(), Some("Housing"));
    }

    #[test]
    fn paybill_reference_boosts_utilities() {
        let m = categorize("PAYBILL 888880");
        assert_eq!(m.category.as_deref(), Some("Utilities"));
        assert!((m.score - PAYBILL_BOOST).abs() < 1e-4);
        assert_eq!(m.tier(), ConfidenceTier::Low);
    }

    #[test]
    fn kplc_tokens_are_high_confidence_utilities() {
        let m = categorize("Pay Bill Online to 888880 - KPLC PREPAID Acc. 5512");
        assert_eq!(m.category.as_deref(), Some("Utilities"));
        assert_eq!(m.confidence, 1.0);
    }

    #[test]
    fn no_match_is_null_category() {
        let m = categorize("JOHN DOE 0712345678");
        assert_eq!(m.category, None);
        assert_eq!(m.score, 0.0);
        assert_eq!(m.confidence, 0.0);
    }

    #[test]
    fn empty_text_is_null_category() {
        assert_eq!(categorize("  ...  ").category, None);
    }

    #[test]
    fn ties_go_to_first_declared_category() {
        let engine = Categorizer::new(vec![
            CategoryRule::new("Alpha", MatchType::Word, &["acme"]),
            CategoryRule::new("Beta", MatchType::Word, &["acme"]),
        ]);
        assert_eq!(engine.categorize("ACME LTD", None).category.as_deref(), Some("Alpha"));
    }

    #[test]
    fn scores_accumulate_across_patterns() {
        let engine = Categorizer::new(vec![
            CategoryRule::new("Alpha", MatchType::Word, &["acme"]),
            CategoryRule::new("Beta", MatchType::Word, &["acme", "widgets"]),
        ]);
        let m = engine.categorize("ACME WIDGETS", None);
        assert_eq!(m.category.as_deref(), Some("Beta"));
        assert!((m.score - 24.0).abs() < 1e-4);
        assert_eq!(m.confidence, 1.0);
    }

    #[test]
    fn description_contributes_to_score() {
        let m = Categorizer::default().categorize("JOHN DOE", Some("house rent"));
        assert_eq!(m.category.as_deref(), Some("Housing"));
    }

    #[test]
    fn extra_rules_are_appended() {
        let engine = Categorizer::default()
            .with_rules(vec![CategoryRule::new("Pets", MatchType::Contains, &["vet"])]);
        assert!(engine.categories().any(|c| c == "Pets"));
        assert_eq!(engine.categorize("KAREN VET CENTRE", None).category.as_deref(), Some("Pets"));
    }

    #[test]
    fn categorizing_twice_is_identical() {
        let engine = Categorizer::default();
        let a = engine.categorize("Java House Junction", None);
        let b = engine.categorize("Java House Junction", None);
        assert_eq!(a, b);
    }

    #[test]
    fn candidate_without_counterparty_uses_reference() {
        let when = chrono::NaiveDate::from_ymd_opt(2025, 12, 4)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let c = TransactionCandidate::new(
            Money::from_cents(5_000),
            TransactionKind::Send,
            when,
            "Ksh50.00 debited for NETFLIX subscription",
        )
        .unwrap();
        let m = Categorizer::default().categorize_candidate(&c);
        assert_eq!(m.category.as_deref(), Some("Entertainment"));
    }

    #[test]
    fn normalize_keeps_at_dot_dash() {
        assert_eq!(normalize("  M-Shwari  (Lock)  pay@me.ke!! "), "m-shwari lock pay@me.ke");
    }

    #[test]
    fn tokenize_drops_short_and_numeric_words() {
        assert_eq!(tokenize("a naivas 2345 till x2"), vec!["naivas", "till", "x2"]);
    }

    #[test]
    fn match_type_from_str() {
        use std::str::FromStr;
        assert_eq!(MatchType::from_str("WORD").unwrap(), MatchType::Word);
        assert_eq!(MatchType::from_str("contains").unwrap(), MatchType::Contains);
        assert!(MatchType::from_str("regex").is_err());
    }
}
