//! Document loading: PDF (per page), plain text, markdown and CSV rows

use pulldown_cmark::{Event, Parser, TagEnd};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::chunk::{PAGE_KEY, ROW_KEY, SOURCE_KEY};
use crate::types::ChunkMetadata;

/// Upper bound for whole-document PDF extraction
const PDF_EXTRACT_TIMEOUT: Duration = Duration::from_secs(60);

/// Supported source formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Pdf,
    Text,
    Markdown,
    Csv,
}

impl SourceFormat {
    /// Detect the format from a file name's extension
    pub fn from_filename(filename: &str) -> Option<Self> {
        let extension = filename.rsplit_once('.')?.1.to_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "text" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

/// A loaded unit of text before optional splitting
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Result of loading one source
#[derive(Debug, Clone)]
pub struct LoadedSource {
    /// File name recorded as `source` in metadata
    pub name: String,
    pub segments: Vec<Segment>,
    /// SHA-256 of the raw bytes (hex)
    pub content_hash: String,
}

/// Turns raw bytes into metadata-tagged segments
#[derive(Debug, Clone, Default)]
pub struct DocumentLoader {
    csv_content_column: Option<String>,
}

impl DocumentLoader {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            csv_content_column: config.csv_content_column.clone(),
        }
    }

    /// Load a source; fails on unsupported formats and on sources with no text
    pub fn load(&self, filename: &str, data: &[u8]) -> Result<LoadedSource> {
        let format = SourceFormat::from_filename(filename)
            .ok_or_else(|| Error::ingestion(filename, "unsupported file type"))?;

        let segments = match format {
            SourceFormat::Pdf => load_pdf(filename, data)?,
            SourceFormat::Text => single_segment(filename, &String::from_utf8_lossy(data)),
            SourceFormat::Markdown => {
                single_segment(filename, &markdown_to_text(&String::from_utf8_lossy(data)))
            }
            SourceFormat::Csv => self.load_csv(filename, data)?,
        };

        if segments.is_empty() {
            return Err(Error::ingestion(filename, "no text content could be extracted"));
        }

        tracing::debug!(
            "Loaded {} ({:?}): {} segments",
            filename,
            format,
            segments.len()
        );

        Ok(LoadedSource {
            name: filename.to_string(),
            segments,
            content_hash: hash_content(data),
        })
    }

    /// One segment per row
    ///
    /// With a content column configured, that column is the text and every
    /// other column becomes locator metadata. Otherwise the text is every
    /// `header: value` pair and all columns are metadata.
    fn load_csv(&self, filename: &str, data: &[u8]) -> Result<Vec<Segment>> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(data);

        let headers = reader
            .headers()
            .map_err(|e| Error::ingestion(filename, format!("invalid CSV header: {}", e)))?
            .clone();

        let content_idx = match &self.csv_content_column {
            Some(column) => Some(headers.iter().position(|h| h == column).ok_or_else(|| {
                Error::ingestion(filename, format!("CSV has no column '{}'", column))
            })?),
            None => None,
        };

        let mut segments = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record
                .map_err(|e| Error::ingestion(filename, format!("row {}: {}", row + 1, e)))?;

            let mut metadata = base_metadata(filename);
            metadata.insert(ROW_KEY.to_string(), Value::from(row));

            let mut lines = Vec::new();
            for (i, (header, field)) in headers.iter().zip(record.iter()).enumerate() {
                match content_idx {
                    Some(idx) if idx == i => lines.push(field.to_string()),
                    Some(_) => {
                        metadata.insert(header.to_string(), csv_value(field));
                    }
                    None => {
                        lines.push(format!("{}: {}", header, field));
                        metadata.insert(header.to_string(), csv_value(field));
                    }
                }
            }

            let text = normalize_text(&lines.join("\n"));
            if !text.is_empty() {
                segments.push(Segment { text, metadata });
            }
        }

        Ok(segments)
    }
}

fn base_metadata(filename: &str) -> ChunkMetadata {
    let mut metadata = ChunkMetadata::new();
    metadata.insert(SOURCE_KEY.to_string(), Value::from(filename));
    metadata
}

fn single_segment(filename: &str, text: &str) -> Vec<Segment> {
    let text = normalize_text(text);
    if text.is_empty() {
        return Vec::new();
    }
    vec![Segment {
        text,
        metadata: base_metadata(filename),
    }]
}

/// Integers and floats become JSON numbers so they join against numeric columns
fn csv_value(field: &str) -> Value {
    if let Ok(i) = field.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = field.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::from(field)
}

/// One segment per page (`page` is 0-based), falling back to whole-document
/// extraction when no page yields text
fn load_pdf(filename: &str, data: &[u8]) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();

    match lopdf::Document::load_mem(data) {
        Ok(doc) => {
            for (page_number, _) in doc.get_pages() {
                let text = match doc.extract_text(&[page_number]) {
                    Ok(text) => normalize_text(&clean_pdf_text(&text)),
                    Err(e) => {
                        tracing::debug!("{}: no text on page {}: {}", filename, page_number, e);
                        continue;
                    }
                };
                if text.is_empty() {
                    continue;
                }

                let mut metadata = base_metadata(filename);
                metadata.insert(
                    PAGE_KEY.to_string(),
                    Value::from(page_number.saturating_sub(1)),
                );
                segments.push(Segment { text, metadata });
            }
        }
        Err(e) => tracing::warn!("{}: lopdf could not parse document: {}", filename, e),
    }

    if segments.is_empty() {
        tracing::warn!("{}: per-page extraction found no text, trying full extraction", filename);
        segments = extract_pdf_whole(filename, data)?;
    }

    Ok(segments)
}

/// Whole-document extraction via pdf-extract on a helper thread
///
/// pdf-extract can stall on unusual fonts, so the wait is bounded. Pages are
/// recovered from form feeds when the extractor emits them.
fn extract_pdf_whole(filename: &str, data: &[u8]) -> Result<Vec<Segment>> {
    let bytes = data.to_vec();
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(pdf_extract::extract_text_from_mem(&bytes));
    });

    let text = match rx.recv_timeout(PDF_EXTRACT_TIMEOUT) {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            return Err(Error::ingestion(filename, format!("unreadable PDF: {}", e)));
        }
        Err(_) => {
            return Err(Error::ingestion(
                filename,
                format!("PDF extraction did not finish within {:?}", PDF_EXTRACT_TIMEOUT),
            ));
        }
    };

    Ok(text
        .split('\u{c}')
        .enumerate()
        .filter_map(|(page, raw)| {
            let text = normalize_text(&clean_pdf_text(raw));
            if text.is_empty() {
                return None;
            }
            let mut metadata = base_metadata(filename);
            metadata.insert(PAGE_KEY.to_string(), Value::from(page));
            Some(Segment { text, metadata })
        })
        .collect())
}

/// Replace ligatures and typographic spaces that PDF fonts commonly emit
fn clean_pdf_text(text: &str) -> String {
    text.replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .replace(['\u{00A0}', '\u{2002}', '\u{2003}', '\u{2009}'], " ")
}

/// Render markdown to plain text, one block per line
fn markdown_to_text(markdown: &str) -> String {
    let mut text = String::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak => text.push(' '),
            Event::HardBreak => text.push('\n'),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::CodeBlock
                | TagEnd::TableRow,
            ) => text.push('\n'),
            Event::End(TagEnd::TableCell) => text.push(' '),
            _ => {}
        }
    }
    text
}

/// Strip NULs, trim every line, drop blank lines
pub fn normalize_text(text: &str) -> String {
    text.replace('\0', "")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// SHA-256 of raw bytes, hex encoded
pub fn hash_content(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
