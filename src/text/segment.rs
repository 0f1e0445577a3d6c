//! Mixed-language segmentation — CJK and Latin runs in the same pass.
//!
//! Wraps `jieba-rs`'s dictionary segmenter, which already tokenizes Latin
//! text on whitespace/punctuation while segmenting CJK runs against its
//! built-in dictionary (spec §4.A step 1: "Jieba-style dictionary
//! segmentation handling both CJK and Latin runs").

use jieba_rs::Jieba;
use once_cell::sync::Lazy;

static JIEBA: Lazy<Jieba> = Lazy::new(Jieba::new);

/// Segments `text`, trims each token, and drops empty/whitespace-only
/// tokens (spec §4.A step 1).
pub fn segment(text: &str) -> Vec<String> {
    JIEBA
        .cut(text, false)
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_mixed_cjk_latin() {
        let tokens = segment("Zheng He sailed to 南洋 in 1405.");
        assert!(tokens.iter().any(|t| t == "Zheng"));
        assert!(tokens.iter().any(|t| t.contains('南') || t.contains('洋')));
    }

    #[test]
    fn drops_whitespace_tokens() {
        let tokens = segment("hello   world");
        assert!(tokens.iter().all(|t| !t.trim().is_empty()));
    }
}
