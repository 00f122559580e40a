//! Claim extraction for grounding checks.
//!
//! A claim is a sentence that states something checkable: it contains a
//! numeral or a definitive verb, and is neither hedged nor a question.
//! Claims carry byte offsets into the output so findings can point back at
//! the exact text.

use serde::{Deserialize, Serialize};

use super::patterns::{content_terms, has_definitive_verb, is_hedged, numerals, NUMERAL_PATTERN};

/// Sentences shorter than this many words are never claims.
const MIN_CLAIM_WORDS: usize = 3;

/// Share of a claim's content terms that must appear in the context for the
/// lexical check to accept it.
const LEXICAL_SUPPORT_RATIO: f64 = 0.6;

/// A checkable factual statement in an output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// The sentence text
    pub text: String,

    /// Byte offset where the claim starts
    pub start: usize,

    /// Byte offset where the claim ends
    pub end: usize,
}

impl Claim {
    /// Pointer of the form `output[start:end]`.
    pub fn pointer(&self) -> String {
        format!("output[{}:{}]", self.start, self.end)
    }
}

/// Split text into trimmed sentences with their byte spans.
///
/// Sentences end at a newline, or at `.`, `!` or `?` followed by whitespace
/// or the end of the text (so `3.5` stays whole).
pub fn split_sentences(text: &str) -> Vec<(&str, usize, usize)> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '\n' => Some(i),
            '.' | '!' | '?' => match chars.peek() {
                None => Some(i + c.len_utf8()),
                Some((_, next)) if next.is_whitespace() => Some(i + c.len_utf8()),
                _ => None,
            },
            _ => None,
        };

        if let Some(end) = boundary {
            push_trimmed(text, start, end, &mut sentences);
            start = end;
        }
    }
    push_trimmed(text, start, text.len(), &mut sentences);

    sentences
}

fn push_trimmed<'a>(text: &'a str, start: usize, end: usize, out: &mut Vec<(&'a str, usize, usize)>) {
    let raw = &text[start..end];
    let leading = raw.len() - raw.trim_start().len();
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        let s = start + leading;
        out.push((trimmed, s, s + trimmed.len()));
    }
}

/// Extract up to `max` claims from an output, in order of appearance.
pub fn extract_claims(text: &str, max: usize) -> Vec<Claim> {
    split_sentences(text)
        .into_iter()
        .filter(|(sentence, _, _)| is_claim(sentence))
        .take(max)
        .map(|(sentence, start, end)| Claim {
            text: sentence.to_string(),
            start,
            end,
        })
        .collect()
}

fn is_claim(sentence: &str) -> bool {
    if sentence.ends_with('?') || sentence.split_whitespace().count() < MIN_CLAIM_WORDS {
        return false;
    }
    if is_hedged(sentence) {
        return false;
    }
    NUMERAL_PATTERN.is_match(sentence) || has_definitive_verb(sentence)
}

/// Deterministic support check: every numeral in the claim must appear in
/// the context, and most of its content words must too.
pub fn is_supported_lexically(claim: &str, context: &[String]) -> bool {
    let joined = context.join("\n");
    let context_numerals = numerals(&joined);
    let claim_numerals = numerals(claim);

    if !claim_numerals
        .iter()
        .all(|n| context_numerals.iter().any(|c| c == n))
    {
        return false;
    }

    let claim_terms = content_terms(claim);
    if claim_terms.is_empty() {
        return true;
    }
    let context_terms = content_terms(&joined);
    let found = claim_terms
        .iter()
        .filter(|t| context_terms.contains(*t))
        .count();

    found as f64 / claim_terms.len() as f64 >= LEXICAL_SUPPORT_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keeps_decimals() {
        let sentences = split_sentences("Revenue was 3.5 million. Costs fell!\nNext line");
        let texts: Vec<&str> = sentences.iter().map(|(s, _, _)| *s).collect();
        assert_eq!(texts, vec!["Revenue was 3.5 million.", "Costs fell!", "Next line"]);
    }

    #[test]
    fn test_spans_point_at_text() {
        let text = "  Intro here.  The firm was founded in 1998.";
        for (sentence, start, end) in split_sentences(text) {
            assert_eq!(&text[start..end], sentence);
        }
    }

    #[test]
    fn test_extract_claims_filters() {
        let text = "The studio was founded in 2009. It might be the best studio. \
                    What does it cost? Lovely colors everywhere. Revenue reached 40% growth.";
        let claims = extract_claims(text, 8);
        let texts: Vec<&str> = claims.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["The studio was founded in 2009.", "Revenue reached 40% growth."]
        );
        assert_eq!(&text[claims[0].start..claims[0].end], claims[0].text);
        assert!(claims[0].pointer().starts_with("output[0:"));
    }

    #[test]
    fn test_extract_claims_respects_max() {
        let text = "Sales were 1 unit. Sales were 2 units. Sales were 3 units.";
        assert_eq!(extract_claims(text, 2).len(), 2);
    }

    #[test]
    fn test_no_claims_in_opinion() {
        assert!(extract_claims("I think this design could work nicely.", 8).is_empty());
    }

    #[test]
    fn test_lexical_support() {
        let context = vec!["The studio was founded in 2009 in Lisbon by two designers.".to_string()];
        assert!(is_supported_lexically("The studio was founded in 2009.", &context));
        assert!(!is_supported_lexically("The studio was founded in 2011.", &context));
        assert!(!is_supported_lexically(
            "The bakery company employs hundreds of engineers.",
            &context
        ));
    }
}
