//! Shared detection patterns for quality scorers.
//!
//! Claim extraction, brand conformance and toxicity detection all key off
//! the same vocabulary; it lives here so each scorer only holds its logic.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    // =========================================================================
    // CLAIM PATTERNS
    // =========================================================================

    /// Numerals, including decimals, thousands separators and percentages
    pub static ref NUMERAL_PATTERN: Regex = Regex::new(
        r"\d+(?:[.,]\d+)*%?"
    ).unwrap();

    /// Verbs that state something as fact
    pub static ref DEFINITIVE_PATTERN: Regex = Regex::new(
        r"(?i)\b(is|are|was|were|has|have|had|will|won|increased|decreased|grew|fell|rose|reached|costs?|contains?|includes?|launched|founded|released|announced|reported|shows?|showed|proves?|proved|confirmed|located|born|died|built|created|owns?)\b"
    ).unwrap();

    /// Hedged or opinion language; sentences containing it are not claims
    pub static ref HEDGE_PATTERN: Regex = Regex::new(
        r"(?i)\b(might|may|could|perhaps|possibly|probably|likely|seems?|appears?|suggests?|maybe|arguably|i think|i believe|we believe|i feel|in my opinion|in our view)\b"
    ).unwrap();

    // =========================================================================
    // TONE PATTERNS
    // =========================================================================

    /// All-caps words of four or more letters
    pub static ref SHOUTING_PATTERN: Regex = Regex::new(
        r"\b[A-Z]{4,}\b"
    ).unwrap();

    /// Casual register that does not belong in client copy
    pub static ref SLANG_PATTERN: Regex = Regex::new(
        r"(?i)\b(gonna|wanna|gotta|lol|omg|btw|tbh|idk|kinda|sorta|dude|awesome sauce)\b"
    ).unwrap();

    // =========================================================================
    // TOXICITY PATTERNS
    // =========================================================================

    /// (category, severity, pattern); severities sum and clamp at 1.0
    pub static ref TOXICITY_PATTERNS: Vec<(&'static str, f64, Regex)> = vec![
        ("insult", 0.4, Regex::new(r"(?i)\b(idiot|idiotic|stupid|moron|dumb|pathetic|worthless|loser|incompetent)\b").unwrap()),
        ("hostility", 0.4, Regex::new(r"(?i)\b(i hate you|shut up|get lost|go away|nobody cares|screw you)\b").unwrap()),
        ("threat", 1.0, Regex::new(r"(?i)\b(kill you|hurt you|destroy you|you will regret|watch your back)\b").unwrap()),
        ("profanity", 0.2, Regex::new(r"(?i)\b(damn|crap|fuck\w*|shit\w*|bastard|bitch)\b").unwrap()),
    ];

    static ref STOPWORDS: HashSet<&'static str> = [
        "about", "above", "after", "again", "also", "been", "before", "being", "below",
        "between", "both", "could", "does", "doing", "down", "during", "each", "from",
        "further", "have", "having", "here", "into", "itself", "just", "more", "most",
        "must", "other", "ought", "over", "please", "same", "should", "some", "such",
        "than", "that", "their", "theirs", "them", "then", "there", "these", "they",
        "this", "those", "through", "under", "until", "very", "were", "what", "when",
        "where", "which", "while", "whom", "will", "with", "would", "your", "yours",
        "write", "make", "give", "tell", "need", "want", "like", "using",
    ]
    .into_iter()
    .collect();
}

/// Lowercased content words (four or more characters, not stopwords).
pub fn content_terms(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 4 && !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// All numerals in `text`, with trailing separators stripped.
pub fn numerals(text: &str) -> Vec<String> {
    NUMERAL_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().replace(',', ""))
        .collect()
}

/// Check if content contains hedged or opinion language.
pub fn is_hedged(content: &str) -> bool {
    HEDGE_PATTERN.is_match(content)
}

/// Check if content states something as fact.
pub fn has_definitive_verb(content: &str) -> bool {
    DEFINITIVE_PATTERN.is_match(content)
}

/// Number of shouted (all-caps) words.
pub fn shouting_count(content: &str) -> usize {
    SHOUTING_PATTERN.find_iter(content).count()
}

/// Check if content uses casual slang.
pub fn contains_slang(content: &str) -> bool {
    SLANG_PATTERN.is_match(content)
}
