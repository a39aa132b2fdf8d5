//! Text extraction from local files (PDF, DOCX, Markdown, plain text).
//!
//! Files are read fully into memory and dispatched on extension; binary
//! formats go through pdf-extract (PDF) or zip + quick-xml (DOCX). The
//! shared [`build_document`] gate normalizes whitespace and rejects
//! sources whose extracted text is too short to be worth ingesting —
//! extraction failures are the only hard failures in the pipeline.

use std::io::Read;
use std::path::Path;

use docq_core::models::SourceDocument;

/// Maximum decompressed bytes read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction failure. The only error in the pipeline that propagates
/// to the caller as a hard failure: without content there is nothing
/// to ingest.
#[derive(Debug)]
pub enum ExtractError {
    /// Source could not be fetched or read.
    Unreachable(String),
    /// Response carried a content type the pipeline does not consume.
    ContentType(String),
    /// Extracted text is shorter than the configured minimum.
    TooShort { len: usize, min: usize },
    /// The bytes could not be parsed as the claimed format.
    Parse(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Unreachable(e) => write!(f, "source unreachable: {}", e),
            ExtractError::ContentType(ct) => write!(f, "unsupported content type: {}", ct),
            ExtractError::TooShort { len, min } => write!(
                f,
                "extracted text too short: {} chars (minimum {})",
                len, min
            ),
            ExtractError::Parse(e) => write!(f, "extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extract a [`SourceDocument`] from a local file.
///
/// Dispatch is by extension: `pdf` and `docx` get format-specific
/// extraction, everything else is read as UTF-8 text (lossy). The file
/// stem becomes the document title.
pub fn extract_file(path: &Path, min_content_len: usize) -> Result<SourceDocument, ExtractError> {
    let bytes = std::fs::read(path)
        .map_err(|e| ExtractError::Unreachable(format!("{}: {}", path.display(), e)))?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let text = match ext.as_str() {
        "pdf" => extract_pdf(&bytes)?,
        "docx" => extract_docx(&bytes)?,
        _ => String::from_utf8_lossy(&bytes).into_owned(),
    };

    let title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string());

    build_document(title, &text, min_content_len)
}

/// Extract plain text from a PDF held in memory.
pub fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Parse(e.to_string()))
}

/// Extract plain text from a DOCX held in memory.
///
/// Reads `word/document.xml` from the OOXML container and concatenates
/// the `<w:t>` text runs, inserting newlines at paragraph ends so the
/// sentence splitter sees structure.
pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Parse(e.to_string()))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| ExtractError::Parse("word/document.xml not found".to_string()))?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| ExtractError::Parse(e.to_string()))?;
        if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err(ExtractError::Parse(
                "word/document.xml exceeds size limit".to_string(),
            ));
        }
    }

    extract_text_runs(&doc_xml)
}

/// Pull `<w:t>` runs out of WordprocessingML, paragraph-separated.
fn extract_text_runs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_run = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text_run => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                // Paragraph end: break the line so sentence splitting
                // sees the boundary.
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Parse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

/// Normalize extracted text and gate it on the minimum viable length.
///
/// Shared by the file and web extraction paths so the too-short rule is
/// applied uniformly. Empty titles collapse to `None`.
pub fn build_document(
    title: Option<String>,
    text: &str,
    min_content_len: usize,
) -> Result<SourceDocument, ExtractError> {
    let normalized = normalize_text(text);
    let len = normalized.chars().count();
    if len < min_content_len {
        return Err(ExtractError::TooShort {
            len,
            min: min_content_len,
        });
    }

    let title = title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    Ok(SourceDocument::new(title, normalized))
}

/// Collapse horizontal whitespace runs and drop blank lines.
///
/// Line structure is preserved (single `\n` between lines) because the
/// chunker treats newlines as sentence boundaries.
pub fn normalize_text(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            lines.push(collapsed);
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pdf_is_parse_error() {
        let err = extract_pdf(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[test]
    fn test_invalid_docx_is_parse_error() {
        let err = extract_docx(b"not a zip").unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_unreachable() {
        let err = extract_file(Path::new("/no/such/file.txt"), 50).unwrap_err();
        assert!(matches!(err, ExtractError::Unreachable(_)));
    }

    #[test]
    fn test_too_short_content_rejected() {
        let err = build_document(None, "tiny", 50).unwrap_err();
        match err {
            ExtractError::TooShort { len, min } => {
                assert_eq!(len, 4);
                assert_eq!(min, 50);
            }
            other => panic!("expected TooShort, got {}", other),
        }
    }

    #[test]
    fn test_build_document_normalizes_and_titles() {
        let doc = build_document(
            Some("  Report  ".to_string()),
            "Line   with    gaps here today\n\n\nAnother line of enough text",
            10,
        )
        .unwrap();
        assert_eq!(doc.title.as_deref(), Some("Report"));
        assert_eq!(
            doc.text,
            "Line with gaps here today\nAnother line of enough text"
        );
    }

    #[test]
    fn test_blank_title_becomes_none() {
        let doc = build_document(Some("   ".to_string()), &"x".repeat(60), 50).unwrap();
        assert!(doc.title.is_none());
    }

    #[test]
    fn test_length_measured_after_normalization() {
        // 60 spaces collapse to one; what remains is below the floor.
        let padded = format!("ok{}ok", " ".repeat(60));
        let err = build_document(None, &padded, 50).unwrap_err();
        assert!(matches!(err, ExtractError::TooShort { .. }));
    }
}
