//! OOXML text-structure extraction from `.docx` packages.
//!
//! Reads `word/document.xml` and keeps only what the print template can
//! show: headings, body paragraphs, list items and table rows. Run
//! formatting, images, headers/footers and fields are dropped.

use crate::error::ConvertError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Refuse to inflate a `document.xml` larger than this.
const MAX_DOCUMENT_XML: u64 = 64 * 1024 * 1024;

/// Magic bytes of an OLE2 compound file (legacy binary `.doc`).
const OLE2_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// One unit of extracted content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// `level` is 1–6; `Title` maps to 1.
    Heading { level: u8, text: String },
    Paragraph(String),
    /// `level` is the zero-based list indent (`w:ilvl`).
    ListItem { level: u8, text: String },
    TableRow(Vec<String>),
}

/// Open the package at `path` and extract its blocks.
///
/// Blocking: call from `spawn_blocking`.
pub fn extract_file(path: &Path) -> Result<Vec<Block>, ConvertError> {
    let mut file = std::fs::File::open(path).map_err(|e| ConvertError::storage(path, e))?;

    let mut magic = [0u8; 8];
    let n = file.read(&mut magic).map_err(|e| ConvertError::storage(path, e))?;
    if n == OLE2_MAGIC.len() && magic == OLE2_MAGIC {
        return Err(ConvertError::conversion(
            "Legacy binary .doc needs the native (LibreOffice) backend",
        ));
    }

    let file = std::fs::File::open(path).map_err(|e| ConvertError::storage(path, e))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| ConvertError::conversion(format!("Not a valid .docx package: {e}")))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ConvertError::conversion(format!("Missing word/document.xml: {e}")))?;
    if entry.size() > MAX_DOCUMENT_XML {
        return Err(ConvertError::conversion(format!(
            "word/document.xml inflates to {} bytes",
            entry.size()
        )));
    }

    let mut xml = String::with_capacity(entry.size() as usize);
    entry
        .take(MAX_DOCUMENT_XML)
        .read_to_string(&mut xml)
        .map_err(|e| ConvertError::conversion(format!("Unreadable word/document.xml: {e}")))?;

    let blocks = parse_document_xml(&xml)?;
    debug!(blocks = blocks.len(), "extracted docx structure");
    Ok(blocks)
}

// ── XML walk ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct ParagraphState {
    text: String,
    heading: Option<u8>,
    list_level: Option<u8>,
}

#[derive(Default)]
struct Walker {
    blocks: Vec<Block>,
    para: Option<ParagraphState>,
    in_text: bool,
    table_depth: usize,
    row: Option<Vec<String>>,
    cell: Option<String>,
}

impl Walker {
    fn start(&mut self, e: &BytesStart<'_>) {
        match e.local_name().as_ref() {
            b"p" => self.para = Some(ParagraphState::default()),
            b"t" => self.in_text = true,
            b"tbl" => self.table_depth += 1,
            b"tr" if self.table_depth == 1 => self.row = Some(Vec::new()),
            b"tc" if self.table_depth == 1 => self.cell = Some(String::new()),
            _ => self.property(e),
        }
    }

    /// Self-closing elements and the attribute-bearing property tags.
    fn property(&mut self, e: &BytesStart<'_>) {
        let Some(para) = self.para.as_mut() else {
            return;
        };
        match e.local_name().as_ref() {
            b"pStyle" => {
                if let Some(style) = val_attr(e) {
                    para.heading = heading_level(&style);
                }
            }
            b"numPr" => para.list_level = para.list_level.or(Some(0)),
            b"ilvl" => {
                let level = val_attr(e).and_then(|v| v.parse::<u8>().ok()).unwrap_or(0);
                para.list_level = Some(level.min(8));
            }
            b"tab" => para.text.push('\t'),
            b"br" | b"cr" => para.text.push('\n'),
            _ => {}
        }
    }

    fn text(&mut self, s: &str) {
        if !self.in_text {
            return;
        }
        if let Some(para) = self.para.as_mut() {
            para.text.push_str(s);
        }
    }

    fn end(&mut self, local: &[u8]) {
        match local {
            b"t" => self.in_text = false,
            b"p" => self.finish_paragraph(),
            b"tc" if self.table_depth == 1 => {
                if let (Some(cell), Some(row)) = (self.cell.take(), self.row.as_mut()) {
                    row.push(cell);
                }
            }
            b"tr" if self.table_depth == 1 => {
                if let Some(row) = self.row.take() {
                    if row.iter().any(|c| !c.trim().is_empty()) {
                        self.blocks.push(Block::TableRow(row));
                    }
                }
            }
            b"tbl" => self.table_depth = self.table_depth.saturating_sub(1),
            _ => {}
        }
    }

    fn finish_paragraph(&mut self) {
        let Some(para) = self.para.take() else {
            return;
        };
        let text = para.text.trim().to_string();
        if text.is_empty() {
            return;
        }

        // Paragraphs inside a table (including nested ones) feed the cell.
        if let Some(cell) = self.cell.as_mut() {
            if !cell.is_empty() {
                cell.push(' ');
            }
            cell.push_str(&text);
            return;
        }
        if self.table_depth > 0 {
            return;
        }

        let block = match (para.heading, para.list_level) {
            (Some(level), _) => Block::Heading { level, text },
            (None, Some(level)) => Block::ListItem { level, text },
            (None, None) => Block::Paragraph(text),
        };
        self.blocks.push(block);
    }
}

/// Walk `word/document.xml` and collect its blocks.
pub fn parse_document_xml(xml: &str) -> Result<Vec<Block>, ConvertError> {
    let mut reader = Reader::from_str(xml);
    let mut walker = Walker::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => walker.start(&e),
            Ok(Event::Empty(e)) => walker.property(&e),
            Ok(Event::Text(t)) => {
                let s = t
                    .unescape()
                    .map_err(|e| ConvertError::conversion(format!("Bad text in document.xml: {e}")))?;
                walker.text(&s);
            }
            Ok(Event::End(e)) => walker.end(e.local_name().as_ref()),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ConvertError::conversion(format!(
                    "Malformed document.xml at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(walker.blocks)
}

fn val_attr(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == b"val")
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// `Heading2` / `heading 2` → 2, `Title` → 1, anything else → None.
fn heading_level(style: &str) -> Option<u8> {
    let s = style.to_ascii_lowercase().replace(' ', "");
    if s == "title" {
        return Some(1);
    }
    let n = s.strip_prefix("heading")?.parse::<u8>().ok()?;
    (1..=6).contains(&n).then_some(n)
}
