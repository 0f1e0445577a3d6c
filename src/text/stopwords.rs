//! Stopword loading — one token per line, across every `.txt` file in a
//! configured directory.
//!
//! A missing directory degrades bigram quality (spec §4.A) but must not fail
//! startup, so this returns an empty set with a `tracing::warn!` rather than
//! an error.

use std::collections::HashSet;
use std::path::Path;

/// Loads stopwords from every `*.txt` file directly under `dir`.
///
/// Each line is trimmed and lower-cased; blank lines are skipped. Files that
/// fail to read are skipped individually (one bad file shouldn't blank out
/// the rest of the set).
pub fn load_stopwords(dir: &Path) -> HashSet<String> {
    let mut stopwords = HashSet::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "stopwords directory not found, starting with an empty set");
            return stopwords;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                for line in contents.lines() {
                    let word = line.trim();
                    if !word.is_empty() {
                        stopwords.insert(word.to_lowercase());
                    }
                }
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "failed to read stopword file");
            }
        }
    }

    tracing::info!(count = stopwords.len(), "loaded stopwords");
    stopwords
}
