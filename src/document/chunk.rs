//! Boundary-aware chunking with overlap (spec §4.B step 2).
//!
//! Splits text into `max_chars`-ish windows, preferring to break on
//! sentence/clause punctuation within a fixed lookback window rather than
//! mid-word, and re-starts each chunk a little before the previous one ended
//! so that context isn't lost across the seam. A forward-progress guarantee
//! keeps the loop from stalling when a run of text has no break characters
//! at all.

use serde::{Deserialize, Serialize};

/// Characters considered valid chunk-boundary break points (CJK and Latin
/// sentence/clause punctuation, plus plain whitespace).
const BREAK_CHARS: &[char] = &['。', '！', '？', '；', '.', '!', '?', ';', '\n', ' '];
const LOOKBACK: usize = 50;
const LOOKAHEAD: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub index: usize,
    pub total_chunks: usize,
    pub start_char: usize,
    pub end_char: usize,
}

/// Collapses runs of whitespace to single spaces and trims the ends, then
/// splits into overlapping chunks of at most `max_chars` characters.
///
/// Mirrors the original char-offset algorithm: scan forward by
/// `max_chars`, search backward up to [`LOOKBACK`] characters for a break
/// character, emit `[start, best_break)`, then search forward from
/// `best_break - overlap` for a break character to find the next chunk's
/// start. If that computed start wouldn't advance past the previous
/// chunk's start, fall back to starting the next chunk exactly at
/// `best_break` instead, guaranteeing forward progress.
pub fn chunk_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    let collapsed = collapse_whitespace(text);
    let chars: Vec<char> = collapsed.chars().collect();
    let len = chars.len();

    if len == 0 {
        return Vec::new();
    }

    if len <= max_chars {
        return vec![Chunk {
            text: collapsed,
            index: 0,
            total_chunks: 1,
            start_char: 0,
            end_char: len,
        }];
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut start_pos = 0usize;

    loop {
        let end_pos = start_pos + max_chars;

        if end_pos >= len {
            chunks.push(Chunk {
                text: chars[start_pos..len].iter().collect(),
                index: chunks.len(),
                total_chunks: 0,
                start_char: start_pos,
                end_char: len,
            });
            break;
        }

        let search_start = start_pos.max(end_pos.saturating_sub(LOOKBACK));
        let best_break = (search_start..end_pos)
            .rev()
            .find(|&i| BREAK_CHARS.contains(&chars[i]))
            .map(|i| i + 1)
            .unwrap_or(end_pos);

        chunks.push(Chunk {
            text: chars[start_pos..best_break].iter().collect(),
            index: chunks.len(),
            total_chunks: 0,
            start_char: start_pos,
            end_char: best_break,
        });

        let target_overlap_start = best_break.saturating_sub(overlap_chars);
        let forward_limit = (target_overlap_start + LOOKAHEAD).min(best_break);
        let overlap_start = (target_overlap_start..forward_limit)
            .find(|&i| BREAK_CHARS.contains(&chars[i]))
            .map(|i| i + 1)
            .unwrap_or(target_overlap_start);

        let prev_start = chunks.last().map(|c| c.start_char).unwrap_or(0);
        start_pos = if overlap_start <= prev_start {
            best_break
        } else {
            overlap_start
        };
    }

    let total = chunks.len();
    for c in &mut chunks {
        c.total_chunks = total;
    }
    chunks
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("hello world", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].total_chunks, 1);
        assert_eq!(chunks[0].text, "hello world");
    }

    #[test]
    fn long_text_splits_on_sentence_boundaries() {
        let sentence = "The quick brown fox jumps over the lazy dog. ";
        let text = sentence.repeat(40);
        let chunks = chunk_text(&text, 200, 40);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert_eq!(c.total_chunks, chunks.len());
        }
    }

    #[test]
    fn chunks_always_make_forward_progress() {
        let text = "a".repeat(5000);
        let chunks = chunk_text(&text, 200, 190);
        let mut last_start = None;
        for c in &chunks {
            if let Some(prev) = last_start {
                assert!(c.start_char > prev, "chunking stalled at {}", c.start_char);
            }
            last_start = Some(c.start_char);
        }
    }

    #[test]
    fn whitespace_is_collapsed() {
        let chunks = chunk_text("hello    \n\n  world", 1000, 200);
        assert_eq!(chunks[0].text, "hello world");
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 1000, 200).is_empty());
    }
}
