//! PDF text extraction module
//!
//! Extracts per-page text content from PDF bytes using lopdf.

use crate::errors::IngestionError;
use tracing::{debug, warn};

/// Extracted text of one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfPage {
    /// 1-based page number
    pub number: u32,
    pub text: String,
}

/// Extract per-page text from PDF bytes.
///
/// Pages whose content streams cannot be read are kept with empty text so
/// page numbering stays stable. When no per-page text is recoverable at all,
/// falls back to a single page holding whatever text the document's content
/// streams contain.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<PdfPage>, IngestionError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| IngestionError::Parse(format!("Failed to load PDF: {}", e)))?;

    let pages = doc.get_pages();

    debug!(page_count = pages.len(), "Extracting text from PDF");

    let mut result = Vec::with_capacity(pages.len());

    for (page_num, page_id) in pages.iter() {
        match doc.get_page_content(*page_id) {
            Ok(content) => {
                let text = extract_text_from_content(&content);
                result.push(PdfPage {
                    number: *page_num,
                    text: clean_text(&text),
                });
            }
            Err(e) => {
                warn!(page = page_num, error = %e, "Failed to read page content, keeping empty page");
                result.push(PdfPage {
                    number: *page_num,
                    text: String::new(),
                });
            }
        }
    }

    if result.iter().all(|p| p.text.trim().is_empty()) {
        // No page boundaries yielded text; fall back to one page with
        // everything the document's streams contain.
        let mut all_text = String::new();
        for object in doc.objects.values() {
            if let Ok(stream) = object.as_stream() {
                if let Ok(content) = stream.decompressed_content() {
                    all_text.push_str(&extract_text_from_content(&content));
                    all_text.push(' ');
                }
            }
        }

        let cleaned = clean_text(&all_text);
        if !cleaned.is_empty() {
            debug!("Recovered text via single-page fallback");
            return Ok(vec![PdfPage { number: 1, text: cleaned }]);
        }
    }

    Ok(result)
}

/// Extract text from a PDF content stream
///
/// Walks text blocks between BT and ET operators and collects the arguments
/// of the text-showing operators.
fn extract_text_from_content(content: &[u8]) -> String {
    let content_str = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut in_text_block = false;
    let mut current_text = String::new();

    for line in content_str.lines() {
        let trimmed = line.trim();

        if trimmed == "BT" {
            in_text_block = true;
            continue;
        }

        if trimmed == "ET" {
            in_text_block = false;
            if !current_text.is_empty() {
                text.push_str(&current_text);
                text.push(' ');
                current_text.clear();
            }
            continue;
        }

        if in_text_block {
            // Look for text showing operators: Tj, TJ, ', "
            if let Some(text_content) = extract_text_from_operator(trimmed) {
                current_text.push_str(&text_content);
            }
        }
    }

    text
}

/// Extract text from a PDF text operator
fn extract_text_from_operator(line: &str) -> Option<String> {
    // Handle (text) Tj operator
    if line.ends_with("Tj") || line.ends_with("'") || line.ends_with("\"") {
        if let Some(start) = line.find('(') {
            if let Some(end) = line.rfind(')') {
                let text = &line[start + 1..end];
                return Some(decode_pdf_string(text));
            }
        }
    }

    // Handle [(text) num (text) num] TJ operator (array of text)
    if line.ends_with("TJ") {
        let mut result = String::new();
        let mut in_paren = false;
        let mut current = String::new();

        for ch in line.chars() {
            match ch {
                '(' => {
                    in_paren = true;
                }
                ')' => {
                    in_paren = false;
                    result.push_str(&decode_pdf_string(&current));
                    current.clear();
                }
                _ if in_paren => {
                    current.push(ch);
                }
                _ => {}
            }
        }

        if !result.is_empty() {
            return Some(result);
        }
    }

    None
}

/// Decode PDF string escapes
fn decode_pdf_string(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('\\') => result.push('\\'),
                Some('(') => result.push('('),
                Some(')') => result.push(')'),
                Some(c) => result.push(c),
                None => {}
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Clean extracted text
fn clean_text(text: &str) -> String {
    text
        // Replace multiple whitespace with single space
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        // Remove BOM artifacts
        .replace('\u{FEFF}', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        let input = "Hello   World\n\nTest";
        assert_eq!(clean_text(input), "Hello World Test");
    }

    #[test]
    fn test_decode_pdf_string() {
        assert_eq!(decode_pdf_string("Hello\\nWorld"), "Hello\nWorld");
        assert_eq!(decode_pdf_string("Test\\(paren\\)"), "Test(paren)");
    }

    #[test]
    fn test_extract_tj_operator() {
        assert_eq!(
            extract_text_from_operator("(Hello World) Tj").as_deref(),
            Some("Hello World")
        );
        assert_eq!(
            extract_text_from_operator("[(Hel) -20 (lo)] TJ").as_deref(),
            Some("Hello")
        );
        assert_eq!(extract_text_from_operator("1 0 0 1 72 720 Tm"), None);
    }

    #[test]
    fn test_extract_text_blocks() {
        let content = b"BT\n(First) Tj\nET\nBT\n(Second) Tj\nET\n";
        let text = extract_text_from_content(content);
        assert!(text.contains("First"));
        assert!(text.contains("Second"));
    }

    #[test]
    fn test_garbage_bytes_fail_to_load() {
        let err = extract_pages(b"not a pdf").unwrap_err();
        assert!(matches!(err, IngestionError::Parse(_)));
    }
}
