//! Text extraction for uploaded documents.
//!
//! The pipeline treats extraction as a black box: given raw file bytes
//! and an extension tag, return decoded UTF-8 text or fail. Supported
//! types are `.pdf`, `.docx`, `.txt`, and `.md`.

use std::io::Read;

use crate::error::PipelineError;

/// File extensions accepted by [`extract_text`].
pub const SUPPORTED_FILE_TYPES: &[&str] = &[".pdf", ".docx", ".txt", ".md"];

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extract plain text from file bytes based on the extension tag.
///
/// # Errors
///
/// `UnsupportedFileType` for unknown extensions, `Extraction` when a
/// supported file cannot be decoded. Neither aborts a multi-file batch;
/// the caller skips the file and continues.
pub fn extract_text(bytes: &[u8], file_type: &str) -> Result<String, PipelineError> {
    match file_type {
        ".pdf" => extract_pdf(bytes),
        ".docx" => extract_docx(bytes),
        ".txt" | ".md" => Ok(extract_plain(bytes)),
        other => Err(PipelineError::UnsupportedFileType(other.to_string())),
    }
}

/// Lowercased dot-prefixed extension of a file name, e.g. `".pdf"`.
pub fn file_type_of(name: &str) -> Option<String> {
    let ext = name.rsplit('.').next()?;
    if ext == name {
        return None;
    }
    Some(format!(".{}", ext.to_lowercase()))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, PipelineError> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| PipelineError::Extraction(format!("pdf: {}", e)))
}

fn extract_plain(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        // Non-UTF-8 text files are decoded lossily rather than rejected.
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, PipelineError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| PipelineError::Extraction(format!("docx: {}", e)))?;
    let mut doc_xml = Vec::new();
    let mut found = false;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| PipelineError::Extraction(format!("docx: {}", e)))?;
        if entry.name() == "word/document.xml" {
            entry
                .take(MAX_XML_ENTRY_BYTES)
                .read_to_end(&mut doc_xml)
                .map_err(|e| PipelineError::Extraction(format!("docx: {}", e)))?;
            if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
                return Err(PipelineError::Extraction(
                    "word/document.xml exceeds size limit".to_string(),
                ));
            }
            found = true;
            break;
        }
    }
    if !found {
        return Err(PipelineError::Extraction(
            "word/document.xml not found".to_string(),
        ));
    }
    extract_w_t_elements(&doc_xml)
}

/// Walk `w:t` text runs in a DOCX document body, separating paragraphs
/// with newlines.
fn extract_w_t_elements(xml: &[u8]) -> Result<String, PipelineError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" && !out.ends_with('\n') && !out.is_empty() {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(PipelineError::Extraction(format!("docx: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
