//! Token normalization and filtering — spec §4.A steps 2–4.
//!
//! The original system lemmatizes purely-alphabetic tokens with NLTK's
//! WordNet lemmatizer and leaves everything else (CJK, alphanumeric like
//! "covid-19") untouched. A full WordNet lookup table isn't available as a
//! lightweight Rust crate, so purely-alphabetic tokens are run through the
//! Snowball/Porter stemmer from `rust-stemmers` instead — morphologically
//! the same family of operation (reduce inflected forms to a shared root),
//! just suffix-stripping rather than dictionary lookup. See DESIGN.md.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};

static STEMMER: Lazy<Stemmer> = Lazy::new(|| Stemmer::create(Algorithm::English));
static FOOTNOTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[\d+\]$").unwrap());

const MAX_TOKEN_LEN: usize = 24;
const MAX_DIGIT_LEN: usize = 4;

/// Applies the filter-then-normalize pipeline to one segmented token.
/// Returns `None` if the token should be dropped entirely.
fn process_token(raw: &str) -> Option<String> {
    let token = raw.to_lowercase();

    if token.is_empty() || token.chars().all(char::is_whitespace) {
        return None;
    }

    // Pure punctuation (ASCII or CJK).
    if !token.chars().any(|c| c.is_alphanumeric()) {
        return None;
    }

    if token.chars().count() > MAX_TOKEN_LEN {
        return None;
    }

    if FOOTNOTE_RE.is_match(&token) {
        return None;
    }

    if token.chars().all(|c| c.is_ascii_digit()) && token.len() > MAX_DIGIT_LEN {
        return None;
    }

    // Single ASCII letters are contraction/possessive detritus ("s", "t").
    if token.chars().count() == 1 && token.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    if token.chars().all(char::is_alphabetic) {
        Some(STEMMER.stem(&token).into_owned())
    } else {
        // Alphanumeric (e.g. "covid-19", "3d") or CJK: keep verbatim.
        Some(token)
    }
}

/// Filters and normalizes a full stream of segmented tokens (spec §4.A
/// steps 2–4). Order is preserved; dropped tokens leave no gap markers.
pub fn lemmatize_tokens(tokens: &[String]) -> Vec<String> {
    tokens.iter().filter_map(|t| process_token(t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_single_ascii_letters() {
        assert_eq!(process_token("s"), None);
        assert_eq!(process_token("t"), None);
    }

    #[test]
    fn drops_long_digit_runs_but_keeps_short_ones() {
        assert_eq!(process_token("12345"), None);
        assert_eq!(process_token("1945"), Some("1945".to_string()));
    }

    #[test]
    fn drops_footnote_markers() {
        assert_eq!(process_token("[18]"), None);
    }

    #[test]
    fn keeps_alphanumeric_verbatim() {
        assert_eq!(process_token("covid-19"), Some("covid-19".to_string()));
    }

    #[test]
    fn keeps_cjk_verbatim() {
        assert_eq!(process_token("南洋"), Some("南洋".to_string()));
    }

    #[test]
    fn drops_pure_punctuation() {
        assert_eq!(process_token("..."), None);
        assert_eq!(process_token("。"), None);
    }

    #[test]
    fn drops_urls_longer_than_24_chars() {
        let long = "a".repeat(25);
        assert_eq!(process_token(&long), None);
    }
}
