//! Template → PDF rendering engines.
//!
//! ## Builtin
//!
//! A small text layout engine writing PDF directly with `lopdf`. It uses
//! the standard Helvetica pair (no font embedding) with WinAnsi encoding,
//! wraps greedily on an average glyph width, and paginates within the
//! [`PageLayout`] margins. Characters outside WinAnsi print as `?`.
//!
//! ## Chromium
//!
//! Writes the HTML template into the request's scratch directory and runs
//! `chromium --headless --print-to-pdf`. Chromium honours the template's
//! `@page` rule, so geometry matches the builtin engine.

use super::extract::Block;
use crate::backend::engine_failure;
use crate::backend::native::file_url;
use crate::config::PageLayout;
use crate::error::ConvertError;
use engine_locate::Engine;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

const LINE_HEIGHT: f32 = 1.25;
/// Average Helvetica advance as a fraction of the font size.
const REGULAR_EM: f32 = 0.52;
const BOLD_EM: f32 = 0.56;
const HEADING_SCALE: [f32; 6] = [1.9, 1.55, 1.3, 1.15, 1.05, 1.0];
const CELL_PAD: f32 = 4.0;

// ── Builtin engine ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }

    fn em(self) -> f32 {
        match self {
            Font::Regular => REGULAR_EM,
            Font::Bold => BOLD_EM,
        }
    }
}

/// Something drawn on a page, in page coordinates.
#[derive(Debug, Clone, PartialEq)]
enum Mark {
    /// Text with its baseline origin at (`x`, `y`).
    Text {
        font: Font,
        size: f32,
        x: f32,
        y: f32,
        text: String,
    },
    /// A table cell outline; (`x`, `y`) is the lower-left corner.
    Cell { x: f32, y: f32, w: f32, h: f32 },
}

/// One horizontal band of output: a single line of text, or a table row.
/// Offsets are relative to the left margin and the band's top edge.
struct Band {
    space_before: f32,
    height: f32,
    marks: Vec<Mark>,
}

/// Lay out `blocks` and return the marks of each page.
fn layout_pages(blocks: &[Block], layout: &PageLayout) -> Vec<Vec<Mark>> {
    let base = layout.font_size_pt;
    let width = layout.content_width();
    let mut bands = Vec::new();

    for block in blocks {
        match block {
            Block::Heading { level, text } => {
                let size = base * HEADING_SCALE[usize::from((*level).clamp(1, 6) - 1)];
                for (i, line) in wrap(text, width, Font::Bold, size).into_iter().enumerate() {
                    let gap = if i == 0 { size * 0.6 } else { 0.0 };
                    bands.push(text_band(gap, 0.0, Font::Bold, size, line));
                }
            }
            Block::Paragraph(text) => {
                for (i, line) in wrap(text, width, Font::Regular, base).into_iter().enumerate() {
                    let gap = if i == 0 { base * 0.4 } else { 0.0 };
                    bands.push(text_band(gap, 0.0, Font::Regular, base, line));
                }
            }
            Block::ListItem { level, text } => {
                let indent = base * (1.2 + 1.5 * f32::from(*level));
                let lines = wrap(text, width - indent, Font::Regular, base);
                for (i, line) in lines.into_iter().enumerate() {
                    let (gap, line) = if i == 0 {
                        (base * 0.2, format!("\u{2022} {line}"))
                    } else {
                        (0.0, format!("  {line}"))
                    };
                    bands.push(text_band(gap, indent - base, Font::Regular, base, line));
                }
            }
            Block::TableRow(cells) => bands.push(table_band(cells, width, base)),
        }
    }

    paginate(bands, layout)
}

fn text_band(space_before: f32, dx: f32, font: Font, size: f32, text: String) -> Band {
    Band {
        space_before,
        height: size * LINE_HEIGHT,
        marks: vec![Mark::Text {
            font,
            size,
            x: dx,
            y: size,
            text,
        }],
    }
}

fn table_band(cells: &[String], width: f32, size: f32) -> Band {
    let col = width / cells.len().max(1) as f32;
    let line_h = size * LINE_HEIGHT;
    let mut marks = Vec::new();
    let mut max_lines = 1usize;

    for (i, cell) in cells.iter().enumerate() {
        let x = col * i as f32;
        let lines = wrap(cell, col - 2.0 * CELL_PAD, Font::Regular, size);
        max_lines = max_lines.max(lines.len());
        for (j, line) in lines.into_iter().enumerate() {
            marks.push(Mark::Text {
                font: Font::Regular,
                size,
                x: x + CELL_PAD,
                y: CELL_PAD + size + line_h * j as f32,
                text: line,
            });
        }
    }

    let height = line_h * max_lines as f32 + 2.0 * CELL_PAD;
    for i in 0..cells.len() {
        marks.push(Mark::Cell {
            x: col * i as f32,
            y: height,
            w: col,
            h: height,
        });
    }

    Band {
        space_before: 0.0,
        height,
        marks,
    }
}

/// Flow bands onto pages top to bottom.
fn paginate(bands: Vec<Band>, layout: &PageLayout) -> Vec<Vec<Mark>> {
    let top = layout.height_pt - layout.margin_pt;
    let bottom = layout.margin_pt;
    let left = layout.margin_pt;
    let mut pages = Vec::new();
    let mut page: Vec<Mark> = Vec::new();
    let mut cursor = top;

    for band in bands {
        if !page.is_empty() {
            if cursor - band.space_before - band.height < bottom {
                pages.push(std::mem::take(&mut page));
                cursor = top;
            } else {
                cursor -= band.space_before;
            }
        }
        for mark in band.marks {
            page.push(match mark {
                Mark::Text {
                    font,
                    size,
                    x,
                    y,
                    text,
                } => Mark::Text {
                    font,
                    size,
                    x: left + x,
                    y: cursor - y,
                    text,
                },
                Mark::Cell { x, y, w, h } => Mark::Cell {
                    x: left + x,
                    y: cursor - y,
                    w,
                    h,
                },
            });
        }
        cursor -= band.height;
    }

    if !page.is_empty() || pages.is_empty() {
        pages.push(page);
    }
    pages
}

/// Greedy word wrap on the average glyph width.
fn wrap(text: &str, width: f32, font: Font, size: f32) -> Vec<String> {
    let max_chars = ((width / (size * font.em())).floor() as usize).max(1);
    let mut out = Vec::new();

    for raw in text.split('\n') {
        let raw = raw.replace('\t', "    ");
        let mut line = String::new();
        for word in raw.split(' ').filter(|w| !w.is_empty()) {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if !line.is_empty() {
                    out.push(std::mem::take(&mut line));
                }
                let rest = word.split_off(max_chars);
                out.push(word.into_iter().collect());
                word = rest;
            }
            let word: String = word.into_iter().collect();
            let len = line.chars().count();
            if len == 0 {
                line = word;
            } else if len + 1 + word.chars().count() <= max_chars {
                line.push(' ');
                line.push_str(&word);
            } else {
                out.push(std::mem::replace(&mut line, word));
            }
        }
        if !line.is_empty() {
            out.push(line);
        }
    }

    out
}

/// Map to WinAnsiEncoding bytes; unmapped characters become `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20}'..='\u{7E}' => c as u8,
            '\u{A0}'..='\u{FF}' => c as u32 as u8,
            '\u{20AC}' => 0x80,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            _ => b'?',
        })
        .collect()
}

fn page_operations(marks: &[Mark], layout: &PageLayout) -> Vec<Operation> {
    let mut ops = Vec::new();

    if layout.print_background {
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new("g", vec![1.0f32.into()]));
        ops.push(Operation::new(
            "re",
            vec![0.into(), 0.into(), layout.width_pt.into(), layout.height_pt.into()],
        ));
        ops.push(Operation::new("f", vec![]));
        ops.push(Operation::new("Q", vec![]));
    }

    let mut framed = false;
    for mark in marks {
        if let Mark::Cell { x, y, w, h } = mark {
            if !framed {
                ops.push(Operation::new("q", vec![]));
                ops.push(Operation::new("G", vec![0.5f32.into()]));
                ops.push(Operation::new("w", vec![0.5f32.into()]));
                framed = true;
            }
            ops.push(Operation::new(
                "re",
                vec![(*x).into(), (*y).into(), (*w).into(), (*h).into()],
            ));
            ops.push(Operation::new("S", vec![]));
        }
    }
    if framed {
        ops.push(Operation::new("Q", vec![]));
    }

    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("g", vec![0.0f32.into()]));
    for mark in marks {
        if let Mark::Text {
            font,
            size,
            x,
            y,
            text,
        } = mark
        {
            ops.push(Operation::new(
                "Tf",
                vec![font.resource().into(), (*size).into()],
            ));
            ops.push(Operation::new(
                "Tm",
                vec![
                    1.into(),
                    0.into(),
                    0.into(),
                    1.into(),
                    (*x).into(),
                    (*y).into(),
                ],
            ));
            ops.push(Operation::new("Tj", vec![Object::string_literal(win_ansi(text))]));
        }
    }
    ops.push(Operation::new("ET", vec![]));
    ops
}

/// Render `blocks` to PDF bytes. Blocking: call from `spawn_blocking`.
pub fn render_builtin(title: &str, blocks: &[Block], layout: &PageLayout) -> Result<Vec<u8>, ConvertError> {
    let pages = layout_pages(blocks, layout);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for marks in &pages {
        let content = Content {
            operations: page_operations(marks, layout),
        };
        let encoded = content
            .encode()
            .map_err(|e| ConvertError::conversion(format!("PDF content encoding failed: {e}")))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id: ObjectId = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    let media_box: Vec<Object> = vec![
        0.into(),
        0.into(),
        layout.width_pt.into(),
        layout.height_pt.into(),
    ];
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => media_box,
        }),
    );
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(win_ansi(title)),
        "Producer" => Object::string_literal(format!("docx2pdf {}", env!("CARGO_PKG_VERSION"))),
    });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| ConvertError::conversion(format!("PDF serialisation failed: {e}")))?;
    debug!(pages = pages.len(), bytes = out.len(), "builtin render finished");
    Ok(out)
}

// ── Chromium engine ──────────────────────────────────────────────────────

/// Print `html` to PDF with headless Chromium, using `scratch` for the
/// page file, the browser profile and the output.
pub async fn render_chromium(
    chromium_path: Option<&Path>,
    html: &str,
    scratch: &Path,
) -> Result<Vec<u8>, ConvertError> {
    let chromium = engine_locate::locate(Engine::Chromium, chromium_path)
        .map_err(|e| ConvertError::conversion(e.to_string()))?;

    tokio::fs::create_dir_all(scratch)
        .await
        .map_err(|e| ConvertError::storage(scratch, e))?;
    let page = scratch.join("document.html");
    let out: PathBuf = scratch.join("document.pdf");
    let profile = scratch.join("chromium-profile");
    tokio::fs::write(&page, html)
        .await
        .map_err(|e| ConvertError::storage(&page, e))?;

    let mut cmd = Command::new(&chromium);
    cmd.arg("--headless")
        .arg("--disable-gpu")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--no-pdf-header-footer")
        .arg(format!("--user-data-dir={}", profile.display()))
        .arg(format!("--print-to-pdf={}", out.display()))
        .arg(file_url(&page))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(chromium = %chromium.display(), "printing template");
    let output = cmd.output().await.map_err(|e| {
        ConvertError::conversion(format!("Failed to run {}: {e}", chromium.display()))
    })?;
    if !output.status.success() {
        return Err(engine_failure("chromium", output.status, &output.stderr));
    }

    match tokio::fs::read(&out).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ConvertError::OutputMissing),
        Err(e) => Err(ConvertError::storage(&out, e)),
    }
}
