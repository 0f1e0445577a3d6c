//! Text Processor (spec §4.A) — segmentation, lemmatization, stopword-aware
//! bigram generation.
//!
//! The pipeline is intentionally asymmetric between unigrams and bigrams:
//! unigrams survive into the token stream even if they are stopwords (BM25's
//! own IDF weighting pushes common words down), but a bigram is dropped if
//! *either* component is a stopword, since stopword-anchored bigrams like
//! "the_king" add index bloat without discriminating power.

mod lemmatize;
mod segment;
mod stopwords;

use std::collections::HashSet;
use std::path::Path;

pub use stopwords::load_stopwords;

/// Owns the stopword set and exposes the two entry points the rest of the
/// system calls: [`TextProcessor::process_text`] for documents being
/// indexed and [`TextProcessor::process_query`] for search queries (spec
/// §4.A — both share one pipeline, matching the original's
/// `process_query` delegating straight to `process_text`).
#[derive(Debug, Clone, Default)]
pub struct TextProcessor {
    stopwords: HashSet<String>,
}

impl TextProcessor {
    pub fn new(stopwords: HashSet<String>) -> Self {
        Self { stopwords }
    }

    /// Loads stopwords from `dir` at construction time (spec §4.A step 4).
    pub fn from_dir(dir: &Path) -> Self {
        Self::new(load_stopwords(dir))
    }

    /// Exposed for display-time filtering (spec §4.A step 5, §4.E.2 step 4:
    /// "top matching words" excludes stopword-containing terms).
    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    /// Segments, filters, lemmatizes, and generates n-grams for `text`.
    /// `ngram_range` mirrors the original's `(min_n, max_n)` contract; this
    /// system only ever calls it with `(1, 2)`, but both ends are honored
    /// so unigram-only callers (e.g. a future admin diagnostic) aren't
    /// forced through the bigram path.
    pub fn process_text(&self, text: &str, ngram_range: (usize, usize)) -> Vec<String> {
        let segmented = segment::segment(text);
        let unigrams = lemmatize::lemmatize_tokens(&segmented);

        let mut out = Vec::new();
        if ngram_range.0 <= 1 {
            out.extend(unigrams.iter().cloned());
        }
        if ngram_range.1 >= 2 {
            out.extend(self.generate_bigrams(&unigrams));
        }
        out
    }

    /// Query-side alias of [`Self::process_text`] (spec §4.A: query
    /// tokenization shares the document pipeline exactly).
    pub fn process_query(&self, query: &str, ngram_range: (usize, usize)) -> Vec<String> {
        self.process_text(query, ngram_range)
    }

    /// Builds bigrams from adjacent normalized tokens, dropping any pair
    /// where either component is a stopword.
    fn generate_bigrams(&self, tokens: &[String]) -> Vec<String> {
        tokens
            .windows(2)
            .filter(|pair| !self.is_stopword(&pair[0]) && !self.is_stopword(&pair[1]))
            .map(|pair| format!("{}_{}", pair[0], pair[1]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor_with(stopwords: &[&str]) -> TextProcessor {
        TextProcessor::new(stopwords.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn unigrams_keep_stopwords() {
        let proc = processor_with(&["the"]);
        let tokens = proc.process_text("the king", (1, 1));
        assert!(tokens.iter().any(|t| t == "the"));
    }

    #[test]
    fn bigrams_drop_stopword_anchored_pairs() {
        let proc = processor_with(&["the"]);
        let tokens = proc.process_text("the king rules wisely", (2, 2));
        assert!(!tokens.iter().any(|t| t == "the_king"));
        assert!(tokens.iter().any(|t| t.contains('_')));
    }

    #[test]
    fn process_query_matches_process_text() {
        let proc = processor_with(&[]);
        assert_eq!(
            proc.process_query("Zheng He sailed", (1, 2)),
            proc.process_text("Zheng He sailed", (1, 2))
        );
    }

    #[test]
    fn empty_text_yields_empty_tokens() {
        let proc = processor_with(&[]);
        assert!(proc.process_text("", (1, 2)).is_empty());
    }
}
