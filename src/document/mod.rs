//! Document Processor (spec §4.B) — format-aware extraction followed by
//! boundary-aware chunking.

pub mod chunk;
pub mod extract;

use serde::{Deserialize, Serialize};

pub use chunk::Chunk;
pub use extract::FileType;

use crate::error::CoreResult;

/// Metadata carried alongside a processed file's chunks, independent of
/// any one chunk (spec §4.B: `base_metadata`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    pub file_type: String,
    pub file_size: u64,
    pub text_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub metadata: FileMetadata,
    pub chunks: Vec<Chunk>,
}

/// Extracts and chunks one uploaded file end to end (spec §4.B
/// `process_file`). Returns an error if the extension is unsupported or
/// the extracted text is empty.
pub fn process_file(
    filename: &str,
    bytes: &[u8],
    max_chunk_chars: usize,
    overlap_chars: usize,
) -> CoreResult<ProcessedFile> {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    let file_type = FileType::from_extension(ext)
        .ok_or_else(|| crate::error::CoreError::decode(format!("unsupported file type: {ext:?}")))?;

    let text = extract::extract_text(bytes, file_type)?;
    let chunks = chunk::chunk_text(&text, max_chunk_chars, overlap_chars);

    Ok(ProcessedFile {
        metadata: FileMetadata {
            filename: filename.to_string(),
            file_type: ext.to_lowercase(),
            file_size: bytes.len() as u64,
            text_length: text.chars().count(),
        },
        chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_extension() {
        let err = process_file("notes.exe", b"binary", 1000, 200).unwrap_err();
        assert!(matches!(err, crate::error::CoreError::Decode(_)));
    }

    #[test]
    fn processes_plain_text_file() {
        let result = process_file("notes.txt", b"hello world", 1000, 200).unwrap();
        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.metadata.file_type, "txt");
        assert_eq!(result.metadata.text_length, 11);
    }
}
