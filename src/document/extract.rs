//! Text extraction per source format (spec §4.B step 1).

use unicode_normalization::UnicodeNormalization;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    Txt,
    Docx,
    Md,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Txt),
            "docx" => Some(Self::Docx),
            "md" => Some(Self::Md),
            _ => None,
        }
    }
}

/// Extracts raw text from `bytes`, dispatching on `file_type`, then applies
/// NFC normalization (mirrors the PDF-pipeline's Unicode cleanup, now
/// applied uniformly ahead of chunking regardless of source format).
pub fn extract_text(bytes: &[u8], file_type: FileType) -> CoreResult<String> {
    let raw = match file_type {
        FileType::Pdf => extract_pdf(bytes)?,
        FileType::Txt | FileType::Md => extract_txt(bytes),
        FileType::Docx => extract_docx(bytes)?,
    };

    let normalized: String = raw.nfc().collect();
    if normalized.trim().is_empty() {
        return Err(CoreError::decode("extracted text is empty"));
    }
    Ok(normalized)
}

fn extract_pdf(bytes: &[u8]) -> CoreResult<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| CoreError::decode(format!("failed to extract PDF text: {e}")))
}

/// Tries a chain of encodings in order, matching the original's
/// utf-8 → utf-16 → latin-1 → cp1252 → (utf-8, lossy) fallback chain.
/// `encoding_rs` has no standalone `iso-8859-1` codec (the Encoding
/// Standard maps that label onto `windows-1252`), so the latin-1 and
/// cp1252 steps both resolve to `WINDOWS_1252` here.
fn extract_txt(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    for encoding in [
        encoding_rs::UTF_16LE,
        encoding_rs::UTF_16BE,
        encoding_rs::WINDOWS_1252, // latin-1
        encoding_rs::WINDOWS_1252, // cp1252
    ] {
        let (decoded, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return decoded.into_owned();
        }
    }

    let (decoded, _, _) = encoding_rs::UTF_8.decode(bytes);
    decoded.into_owned()
}

/// Extracts paragraph text followed by table cell text, row by row, joined
/// the way the original does: cells with spaces, rows with newlines.
fn extract_docx(bytes: &[u8]) -> CoreResult<String> {
    let docx = docx_rs::read_docx(bytes)
        .map_err(|e| CoreError::decode(format!("failed to parse DOCX: {e}")))?;

    let mut paragraphs = Vec::new();
    let mut tables = Vec::new();

    for child in &docx.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(p) => {
                let text = paragraph_text(p);
                if !text.is_empty() {
                    paragraphs.push(text);
                }
            }
            docx_rs::DocumentChild::Table(t) => {
                tables.push(table_text(t));
            }
            _ => {}
        }
    }

    let mut out = paragraphs.join("\n");
    for table in tables {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&table);
    }
    Ok(out)
}

fn paragraph_text(p: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &p.children {
        if let docx_rs::ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                if let docx_rs::RunChild::Text(t) = run_child {
                    text.push_str(&t.text);
                }
            }
        }
    }
    text
}

fn table_text(t: &docx_rs::Table) -> String {
    let mut rows = Vec::new();
    for row in &t.rows {
        let docx_rs::TableChild::TableRow(row) = row;
        let mut cells = Vec::new();
        for cell in &row.cells {
            let docx_rs::TableRowChild::TableCell(cell) = cell;
            let mut cell_text = Vec::new();
            for content in &cell.children {
                if let docx_rs::TableCellContent::Paragraph(p) = content {
                    let text = paragraph_text(p);
                    if !text.is_empty() {
                        cell_text.push(text);
                    }
                }
            }
            cells.push(cell_text.join(" "));
        }
        rows.push(cells.join(" "));
    }
    rows.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_supported_extensions() {
        assert_eq!(FileType::from_extension("PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_extension("txt"), Some(FileType::Txt));
        assert_eq!(FileType::from_extension("docx"), Some(FileType::Docx));
        assert_eq!(FileType::from_extension("md"), Some(FileType::Md));
        assert_eq!(FileType::from_extension("exe"), None);
    }

    #[test]
    fn plain_utf8_txt_round_trips() {
        let text = extract_txt("hello world".as_bytes());
        assert_eq!(text, "hello world");
    }

    #[test]
    fn empty_extraction_is_an_error() {
        let err = extract_text(b"", FileType::Txt).unwrap_err();
        assert!(matches!(err, CoreError::Decode(_)));
    }
}
