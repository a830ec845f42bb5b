//! Document extraction adapter: one narrow capability (`bytes -> text`) with a
//! strategy per file format, selected by declared MIME type with a file-name
//! extension fallback.
//!
//! Output is all-or-nothing: any parse failure surfaces as `ExtractionError`
//! and the caller must not retain partial text. An empty extraction is still a
//! success (file-derived text has no minimum length).

use std::io::{Cursor, Read};

use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ExtractionError {
  #[error("unsupported document format: {0}")]
  UnsupportedFormat(String),
  #[error("PDF parsing failed: {0}")]
  Pdf(String),
  #[error("DOCX parsing failed: {0}")]
  Docx(String),
  #[error("PPTX parsing failed: {0}")]
  Pptx(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentFormat {
  PlainText,
  Pdf,
  Docx,
  Pptx,
}

impl DocumentFormat {
  /// Dispatch on the declared MIME type first, then the file extension.
  pub fn detect(mime: Option<&str>, file_name: &str) -> Result<Self, ExtractionError> {
    if let Some(mime) = mime {
      let mime = mime.split(';').next().unwrap_or(mime).trim();
      match mime {
        "application/pdf" => return Ok(DocumentFormat::Pdf),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
          return Ok(DocumentFormat::Docx)
        }
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
          return Ok(DocumentFormat::Pptx)
        }
        m if m.starts_with("text/") => return Ok(DocumentFormat::PlainText),
        _ => {}
      }
    }
    let lower = file_name.to_lowercase();
    let ext = lower.rsplit('.').next().unwrap_or("");
    match ext {
      "pdf" => Ok(DocumentFormat::Pdf),
      "docx" => Ok(DocumentFormat::Docx),
      "pptx" => Ok(DocumentFormat::Pptx),
      "txt" | "md" | "csv" | "log" => Ok(DocumentFormat::PlainText),
      _ => Err(ExtractionError::UnsupportedFormat(file_name.to_string())),
    }
  }
}

/// Convert an uploaded file into a single normalized text blob.
#[instrument(level = "info", skip(bytes), fields(size = bytes.len()))]
pub fn extract_text(format: DocumentFormat, bytes: &[u8]) -> Result<String, ExtractionError> {
  let text = match format {
    DocumentFormat::PlainText => String::from_utf8_lossy(bytes).into_owned(),
    DocumentFormat::Pdf => extract_pdf(bytes)?,
    DocumentFormat::Docx => extract_docx(bytes)?,
    DocumentFormat::Pptx => extract_pptx(bytes)?,
  };
  debug!(target: "sulva_backend", extracted_len = text.len(), "document extracted");
  Ok(text)
}

/// Page-text concatenation; pdf-extract inserts page breaks itself.
fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
  pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractionError::Pdf(e.to_string()))
}

/// Raw paragraph text from `word/document.xml` inside the OOXML container.
fn extract_docx(bytes: &[u8]) -> Result<String, ExtractionError> {
  let err = |e: &dyn std::fmt::Display| ExtractionError::Docx(e.to_string());
  let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| err(&e))?;
  let mut xml = String::new();
  archive
    .by_name("word/document.xml")
    .map_err(|e| err(&e))?
    .read_to_string(&mut xml)
    .map_err(|e| err(&e))?;
  let doc = roxmltree::Document::parse(&xml).map_err(|e| err(&e))?;

  let mut out = String::new();
  for para in doc.descendants().filter(|n| n.tag_name().name() == "p") {
    let mut line = String::new();
    for t in para.descendants().filter(|n| n.tag_name().name() == "t") {
      line.push_str(t.text().unwrap_or_default());
    }
    if !line.trim().is_empty() {
      out.push_str(line.trim());
      out.push('\n');
    }
  }
  Ok(out)
}

/// Slide-XML text-node concatenation, ordered by slide number, with the same
/// slide separators the web client produced.
fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractionError> {
  let err = |e: &dyn std::fmt::Display| ExtractionError::Pptx(e.to_string());
  let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| err(&e))?;

  let mut slides: Vec<(u32, String)> = archive
    .file_names()
    .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
    .map(|n| (slide_number(n), n.to_string()))
    .collect();
  slides.sort();

  let mut out = String::new();
  for (_, name) in slides {
    let mut xml = String::new();
    archive
      .by_name(&name)
      .map_err(|e| err(&e))?
      .read_to_string(&mut xml)
      .map_err(|e| err(&e))?;
    let doc = roxmltree::Document::parse(&xml).map_err(|e| err(&e))?;
    let mut slide_text = String::new();
    for t in doc.descendants().filter(|n| n.tag_name().name() == "t") {
      slide_text.push_str(t.text().unwrap_or_default());
      slide_text.push(' ');
    }
    let slide_text = slide_text.trim();
    if !slide_text.is_empty() {
      out.push_str("--- Slide ---\n");
      out.push_str(slide_text);
      out.push_str("\n\n");
    }
  }
  Ok(out)
}

fn slide_number(name: &str) -> u32 {
  name
    .chars()
    .filter(|c| c.is_ascii_digit())
    .collect::<String>()
    .parse()
    .unwrap_or(0)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;
  use zip::write::FileOptions;

  fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
      w.start_file(*name, FileOptions::default()).unwrap();
      w.write_all(content.as_bytes()).unwrap();
    }
    w.finish().unwrap().into_inner()
  }

  #[test]
  fn detect_prefers_mime_then_extension() {
    assert_eq!(
      DocumentFormat::detect(Some("application/pdf"), "x.bin").unwrap(),
      DocumentFormat::Pdf
    );
    assert_eq!(
      DocumentFormat::detect(Some("text/plain; charset=utf-8"), "notes").unwrap(),
      DocumentFormat::PlainText
    );
    assert_eq!(DocumentFormat::detect(None, "Deck.PPTX").unwrap(), DocumentFormat::Pptx);
    assert_eq!(DocumentFormat::detect(None, "essay.docx").unwrap(), DocumentFormat::Docx);
    assert!(matches!(
      DocumentFormat::detect(None, "archive.rar"),
      Err(ExtractionError::UnsupportedFormat(_))
    ));
  }

  #[test]
  fn plain_text_passes_through() {
    let text = extract_text(DocumentFormat::PlainText, "hello notes".as_bytes()).unwrap();
    assert_eq!(text, "hello notes");
  }

  #[test]
  fn docx_paragraph_text_is_extracted() {
    let document = r#"<?xml version="1.0"?>
      <w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
        <w:body>
          <w:p><w:r><w:t>First paragraph.</w:t></w:r></w:p>
          <w:p><w:r><w:t>Second </w:t></w:r><w:r><w:t>paragraph.</w:t></w:r></w:p>
        </w:body>
      </w:document>"#;
    let bytes = build_zip(&[("word/document.xml", document)]);
    let text = extract_text(DocumentFormat::Docx, &bytes).unwrap();
    assert_eq!(text, "First paragraph.\nSecond paragraph.\n");
  }

  #[test]
  fn pptx_slides_are_ordered_by_number() {
    let slide = |body: &str| {
      format!(
        r#"<?xml version="1.0"?>
        <p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
               xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">
          <p:txBody><a:p><a:r><a:t>{body}</a:t></a:r></a:p></p:txBody>
        </p:sld>"#
      )
    };
    // Insertion order deliberately shuffled; slide10 must sort after slide2.
    let bytes = build_zip(&[
      ("ppt/slides/slide10.xml", &slide("tenth")),
      ("ppt/slides/slide1.xml", &slide("first")),
      ("ppt/slides/slide2.xml", &slide("second")),
    ]);
    let text = extract_text(DocumentFormat::Pptx, &bytes).unwrap();
    assert_eq!(text, "--- Slide ---\nfirst\n\n--- Slide ---\nsecond\n\n--- Slide ---\ntenth\n\n");
  }

  #[test]
  fn empty_extraction_is_a_success() {
    let document = r#"<?xml version="1.0"?>
      <w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
        <w:body></w:body>
      </w:document>"#;
    let bytes = build_zip(&[("word/document.xml", document)]);
    assert_eq!(extract_text(DocumentFormat::Docx, &bytes).unwrap(), "");
  }

  #[test]
  fn garbage_bytes_fail_without_partial_output() {
    assert!(matches!(
      extract_text(DocumentFormat::Docx, b"not a zip"),
      Err(ExtractionError::Docx(_))
    ));
    assert!(matches!(
      extract_text(DocumentFormat::Pptx, b"not a zip"),
      Err(ExtractionError::Pptx(_))
    ));
    assert!(matches!(
      extract_text(DocumentFormat::Pdf, b"%PDF-not-really"),
      Err(ExtractionError::Pdf(_))
    ));
  }
}
