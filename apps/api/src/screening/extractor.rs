//! Text Extractor: turns an uploaded resume into plain text.
//!
//! PDFs are decoded page by page with `pdf-extract` and joined with a newline
//! between pages. Plain-text uploads are decoded as UTF-8. A PDF without a text
//! layer (e.g. a scanned image) yields an empty string, not an error, so the
//! pipeline can still score it.

use std::panic::{catch_unwind, AssertUnwindSafe};

use thiserror::Error;
use tracing::debug;

use crate::screening::models::ResumeDocument;

const PDF_SIGNATURE: &[u8] = b"%PDF-";
const PAGE_SEPARATOR: &str = "\n";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("document is empty")]
    Empty,

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("malformed or encrypted PDF: {0}")]
    Malformed(String),

    #[error("text document is not valid UTF-8")]
    InvalidUtf8,
}

/// Extracts plain text from a document. Must be a pure function of the document.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, document: &ResumeDocument) -> Result<String, ExtractionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    Pdf,
    PlainText,
}

/// Production extractor: PDF and plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentExtractor;

impl TextExtractor for DocumentExtractor {
    fn extract(&self, document: &ResumeDocument) -> Result<String, ExtractionError> {
        if document.content.is_empty() {
            return Err(ExtractionError::Empty);
        }

        match detect_format(document)? {
            DocumentFormat::Pdf => extract_pdf_text(&document.content),
            DocumentFormat::PlainText => decode_plain_text(&document.content),
        }
    }
}

fn detect_format(document: &ResumeDocument) -> Result<DocumentFormat, ExtractionError> {
    let name = document.name.to_lowercase();
    let content_type = document
        .content_type
        .as_deref()
        .map(|ct| ct.to_lowercase())
        .unwrap_or_default();

    if document.content.starts_with(PDF_SIGNATURE)
        || name.ends_with(".pdf")
        || content_type == "application/pdf"
    {
        return Ok(DocumentFormat::Pdf);
    }

    if name.ends_with(".txt") || name.ends_with(".md") || content_type.starts_with("text/plain") {
        return Ok(DocumentFormat::PlainText);
    }

    let described = if content_type.is_empty() {
        document.name.clone()
    } else {
        format!("{} ({content_type})", document.name)
    };
    Err(ExtractionError::UnsupportedFormat(described))
}

/// Concatenates page texts in document order. `pdf-extract` can panic on some
/// malformed inputs; that is reported as `Malformed` like any other decode failure.
fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let pages = catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }))
    .map_err(|_| ExtractionError::Malformed("PDF decoder panicked".to_string()))?
    .map_err(|e| ExtractionError::Malformed(e.to_string()))?;

    debug!("Extracted {} PDF page(s)", pages.len());

    let text = pages.join(PAGE_SEPARATOR);
    if text.trim().is_empty() {
        // No text layer.
        return Ok(String::new());
    }
    Ok(text)
}

fn decode_plain_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8(bytes.to_vec()).map_err(|_| ExtractionError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    use super::*;

    /// Builds a minimal PDF with one page per entry; an empty entry produces a page
    /// with an empty content stream.
    fn build_pdf(page_texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in page_texts {
            let operations = if text.is_empty() {
                vec![]
            } else {
                vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ]
            };
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let page_count = kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_pdf_pages_extracted_in_order() {
        let pdf = build_pdf(&["Python", "Django"]);
        let doc = ResumeDocument::new("jane.pdf", pdf);

        let text = DocumentExtractor.extract(&doc).unwrap();
        let python = text.find("Python").expect("first page text missing");
        let django = text.find("Django").expect("second page text missing");
        assert!(python < django, "pages out of order: {text:?}");
    }

    #[test]
    fn test_pdf_detected_by_signature_without_extension() {
        let pdf = build_pdf(&["Kubernetes"]);
        let doc = ResumeDocument::new("upload", pdf);

        let text = DocumentExtractor.extract(&doc).unwrap();
        assert!(text.contains("Kubernetes"));
    }

    #[test]
    fn test_pdf_without_text_layer_is_empty_not_error() {
        let pdf = build_pdf(&[""]);
        let doc = ResumeDocument::new("scan.pdf", pdf);

        let text = DocumentExtractor.extract(&doc).unwrap();
        assert_eq!(text, "");
    }

    #[test]
    fn test_corrupted_pdf_is_malformed() {
        let doc = ResumeDocument::new("broken.pdf", b"%PDF-1.7\nthis is not a pdf body".to_vec());
        let err = DocumentExtractor.extract(&doc).unwrap_err();
        assert!(matches!(err, ExtractionError::Malformed(_)), "{err:?}");
    }

    #[test]
    fn test_plain_text_passthrough() {
        let doc = ResumeDocument::new("notes.txt", "Senior engineer\nRust, Go".as_bytes().to_vec());
        assert_eq!(
            DocumentExtractor.extract(&doc).unwrap(),
            "Senior engineer\nRust, Go"
        );
    }

    #[test]
    fn test_plain_text_by_content_type_strips_bom() {
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend_from_slice(b"hello");
        let doc = ResumeDocument::new("resume", bytes).with_content_type("text/plain; charset=utf-8");
        assert_eq!(DocumentExtractor.extract(&doc).unwrap(), "hello");
    }

    #[test]
    fn test_invalid_utf8_text_fails() {
        let doc = ResumeDocument::new("bad.txt", vec![0xff, 0xfe, 0xfd]);
        assert!(matches!(
            DocumentExtractor.extract(&doc),
            Err(ExtractionError::InvalidUtf8)
        ));
    }

    #[test]
    fn test_unsupported_format() {
        let doc = ResumeDocument::new("photo.png", vec![0x89, b'P', b'N', b'G']);
        let err = DocumentExtractor.extract(&doc).unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedFormat(ref n) if n == "photo.png"));
    }

    #[test]
    fn test_empty_document() {
        let doc = ResumeDocument::new("empty.pdf", Vec::new());
        assert!(matches!(
            DocumentExtractor.extract(&doc),
            Err(ExtractionError::Empty)
        ));
    }
}
