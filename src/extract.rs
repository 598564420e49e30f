//! Text extraction for ingest.
//!
//! PDF text comes from `pdf-extract`; DOCX text is read from
//! `word/document.xml` with one blank line per paragraph so the chunker
//! sees paragraph boundaries. Anything else must be UTF-8 text.
//!
//! Line endings are normalised to `\n` before the text is hashed.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::events::Event;
use thiserror::Error;

use docshelf_core::path::normalize_text;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_TEXT: &str = "text/plain";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("file is not valid UTF-8 text")]
    Encoding,
}

/// A file read and converted to normalised text.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub text: String,
    pub content_type: &'static str,
    pub title: String,
    /// Original bytes, kept for PDFs so the outline tier can read them.
    pub raw: Option<Vec<u8>>,
}

/// Content type from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => MIME_PDF,
        Some("docx") => MIME_DOCX,
        Some("md") | Some("markdown") => MIME_MARKDOWN,
        _ => MIME_TEXT,
    }
}

/// Extract plain text from file bytes.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match content_type {
        MIME_PDF => pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string())),
        MIME_DOCX => extract_docx(bytes),
        _ => String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::Encoding),
    }
}

/// Read, extract, and normalise a file.
pub fn load_file(path: &Path) -> Result<Extracted> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let content_type = content_type_for(path);
    let text = extract_text(&bytes, content_type)
        .with_context(|| format!("Failed to extract text from {}", path.display()))?;
    let text = normalize_text(&text);
    let title = title_for(&text, path);
    let raw = (content_type == MIME_PDF).then_some(bytes);
    Ok(Extracted {
        text,
        content_type,
        title,
        raw,
    })
}

/// First markdown `#` heading, else the file stem.
pub fn title_for(text: &str, path: &Path) -> String {
    text.lines()
        .take(50)
        .map(str::trim)
        .find_map(|line| {
            line.strip_prefix("# ")
                .map(str::trim)
                .filter(|t| !t.is_empty())
        })
        .map(str::to_string)
        .unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("untitled")
                .to_string()
        })
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    docx_paragraphs(&doc_xml)
}

/// Concatenate `<w:t>` runs; every `<w:p>` ends a paragraph and `<w:tab>`
/// and `<w:br>` become whitespace.
fn docx_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let para = current.trim().to_string();
                    if !para.is_empty() {
                        paragraphs.push(para);
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ExtractError::Docx(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    let tail = current.trim();
    if !tail.is_empty() {
        paragraphs.push(tail.to_string());
    }
    Ok(paragraphs.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx(body: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_docx_paragraphs_become_blank_line_separated() {
        let bytes = docx(
            "<w:p><w:r><w:t>First </w:t></w:r><w:r><w:t>para</w:t></w:r></w:p>\
             <w:p><w:r><w:t>Second &amp; last</w:t></w:r></w:p>",
        );
        assert_eq!(extract_text(&bytes, MIME_DOCX).unwrap(), "First para\n\nSecond & last");
    }

    #[test]
    fn test_invalid_inputs_are_errors() {
        assert!(matches!(extract_text(b"not a pdf", MIME_PDF), Err(ExtractError::Pdf(_))));
        assert!(matches!(extract_text(b"not a zip", MIME_DOCX), Err(ExtractError::Docx(_))));
        assert!(matches!(extract_text(&[0xff, 0xfe, 0x00], MIME_TEXT), Err(ExtractError::Encoding)));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a/b.PDF")), MIME_PDF);
        assert_eq!(content_type_for(Path::new("notes.md")), MIME_MARKDOWN);
        assert_eq!(content_type_for(Path::new("report.docx")), MIME_DOCX);
        assert_eq!(content_type_for(Path::new("README")), MIME_TEXT);
    }

    #[test]
    fn test_title_for() {
        assert_eq!(title_for("intro\n# The Guide\n", Path::new("x.md")), "The Guide");
        assert_eq!(title_for("no heading", Path::new("dir/notes.txt")), "notes");
    }

    #[test]
    fn test_load_file_normalises_line_endings() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("crlf.txt");
        std::fs::write(&path, "a\r\nb\r\n").unwrap();
        let extracted = load_file(&path).unwrap();
        assert_eq!(extracted.text, "a\nb\n");
        assert_eq!(extracted.content_type, MIME_TEXT);
        assert!(extracted.raw.is_none());
    }
}
