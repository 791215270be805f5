//! ============================================================================
//! Intake - Helpers for upload collaborators
//! ============================================================================
//! Text extraction itself happens outside the core. These helpers classify
//! the raw upload and tidy extracted page text. The roast pipeline never calls
//! them; it roasts exactly the text it is given.
//! ============================================================================

use crate::types::FileType;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Classify an upload.
///
/// Order: `%PDF-` signature, then the declared type, then valid UTF-8 (txt).
pub fn detect_file_type(bytes: &[u8], declared: Option<&str>) -> FileType {
    if bytes.starts_with(PDF_MAGIC) {
        return FileType::Pdf;
    }

    if let Some(declared) = declared {
        let kind = FileType::from_declared(declared);
        if kind != FileType::Unknown {
            return kind;
        }
    }

    if std::str::from_utf8(bytes).is_ok() {
        FileType::Txt
    } else {
        FileType::Unknown
    }
}

impl FileType {
    pub fn detect(bytes: &[u8], declared: Option<&str>) -> Self {
        detect_file_type(bytes, declared)
    }
}

/// Collapse runs of whitespace inside each page to single spaces and join
/// pages with a blank line. Empty pages are kept so page breaks stay visible.
pub fn normalize_whitespace<S: AsRef<str>>(pages: &[S]) -> String {
    pages
        .iter()
        .map(|page| page.as_ref().split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n\n")
}
