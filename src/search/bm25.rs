//! Okapi BM25, matching Python `rank_bm25.BM25Okapi`'s defaults and
//! epsilon-smoothed IDF exactly, so token-for-token this index scores the
//! same way the original system's derived cache did (spec §4.E).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

const K1: f32 = 1.5;
const B: f32 = 0.75;
const EPSILON: f32 = 0.25;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Index {
    k1: f32,
    b: f32,
    doc_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<usize>,
    avg_doc_len: f32,
    idf: HashMap<String, f32>,
}

impl Bm25Index {
    /// Builds an index over `documents` (already-tokenized token lists),
    /// matching `rank_bm25.BM25Okapi.__init__`: per-term document
    /// frequency, average document length, then IDF with epsilon-smoothed
    /// floor for terms whose raw IDF would be negative (very common
    /// terms appearing in more than half the corpus).
    pub fn build(documents: &[Vec<String>]) -> Self {
        let n = documents.len();
        let mut doc_freqs = Vec::with_capacity(n);
        let mut doc_lens = Vec::with_capacity(n);
        let mut containing: HashMap<String, u32> = HashMap::new();

        for doc in documents {
            doc_lens.push(doc.len());
            let mut freqs: HashMap<String, u32> = HashMap::new();
            for term in doc {
                *freqs.entry(term.clone()).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *containing.entry(term.clone()).or_insert(0) += 1;
            }
            doc_freqs.push(freqs);
        }

        let avg_doc_len = if n == 0 {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f32 / n as f32
        };

        let mut idf = HashMap::new();
        let mut idf_sum = 0.0f32;
        let mut negative_idfs = Vec::new();
        for (term, freq) in &containing {
            let raw = ((n as f32 - *freq as f32 + 0.5) / (*freq as f32 + 0.5)).ln();
            idf.insert(term.clone(), raw);
            idf_sum += raw;
            if raw < 0.0 {
                negative_idfs.push(term.clone());
            }
        }
        let average_idf = if containing.is_empty() { 0.0 } else { idf_sum / containing.len() as f32 };
        let eps = EPSILON * average_idf;
        for term in negative_idfs {
            idf.insert(term, eps);
        }

        Self { k1: K1, b: B, doc_freqs, doc_lens, avg_doc_len, idf }
    }

    pub fn is_empty(&self) -> bool {
        self.doc_freqs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.doc_freqs.len()
    }

    fn idf(&self, term: &str) -> f32 {
        self.idf.get(term).copied().unwrap_or(0.0)
    }

    fn term_score(&self, term: &str, doc_index: usize) -> f32 {
        let tf = *self.doc_freqs[doc_index].get(term).unwrap_or(&0) as f32;
        if tf == 0.0 {
            return 0.0;
        }
        let doc_len = self.doc_lens[doc_index] as f32;
        let denom = tf + self.k1 * (1.0 - self.b + self.b * doc_len / self.avg_doc_len.max(1e-9));
        self.idf(term) * tf * (self.k1 + 1.0) / denom
    }

    /// Scores every document against `query_tokens` (spec §4.E.2 step 4,
    /// `get_scores`).
    pub fn scores(&self, query_tokens: &[String]) -> Vec<f32> {
        (0..self.doc_freqs.len())
            .map(|i| query_tokens.iter().map(|t| self.term_score(t, i)).sum())
            .collect()
    }

    /// Per-term BM25 contribution for one document, used to compute
    /// `top_matching_words` (spec §4.E.2 step 4).
    pub fn term_contributions(&self, query_tokens: &[String], doc_index: usize) -> Vec<(String, f32)> {
        query_tokens
            .iter()
            .map(|t| (t.clone(), self.term_score(t, doc_index)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn scores_documents_containing_query_term_higher() {
        let docs = vec![
            toks(&["napoleon", "emperor", "france"]),
            toks(&["cat", "sat", "mat"]),
        ];
        let index = Bm25Index::build(&docs);
        let scores = index.scores(&toks(&["napoleon"]));
        assert!(scores[0] > scores[1]);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn empty_corpus_has_no_crash() {
        let index = Bm25Index::build(&[]);
        assert!(index.is_empty());
        assert!(index.scores(&toks(&["x"])).is_empty());
    }

    #[test]
    fn term_contributions_are_nonzero_for_matching_terms() {
        let docs = vec![toks(&["zheng", "he", "sailed", "南洋"])];
        let index = Bm25Index::build(&docs);
        let contributions = index.term_contributions(&toks(&["zheng", "he", "南洋"]), 0);
        assert!(contributions.iter().all(|(_, score)| *score > 0.0));
    }
}
