//! Embedding Provider (spec §4.C) — turns text into dense vectors, with a
//! local (on-box model) and an external (HTTP API) backend behind one
//! trait so the rest of the system never branches on which is active.

pub mod external;
pub mod local;

use crate::error::CoreResult;

/// Asymmetric encode surface: documents and queries sometimes need
/// different treatment at the same embedding model (e.g. a `"query: "`
/// instruction prefix some retrieval-tuned models expect — spec §4.C).
pub trait EmbeddingProvider: Send + Sync {
    fn encode_document(&self, text: &str) -> CoreResult<Vec<f32>>;
    fn encode_query(&self, text: &str) -> CoreResult<Vec<f32>>;

    fn encode_documents(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.encode_document(t)).collect()
    }
}

/// L2-normalizes `v` in place; a no-op if `v` is already unit-length or
/// all-zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-9 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity between two equal-length, ideally unit-normalized
/// vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a < 1e-9 || norm_b < 1e-9 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm = (v[0] * v[0] + v[1] * v[1]).sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let a = vec![0.6, 0.8];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
