//! Fixed print template: extracted blocks → standalone HTML page.
//!
//! The template ignores every layout hint in the source document. Page
//! size, margins and body font come from [`PageLayout`], and backgrounds are
//! forced on when `print_background` is set so Chromium's print path keeps
//! them.

use super::extract::Block;
use crate::config::PageLayout;
use html_escape::encode_text;
use std::fmt::Write;

/// Render `blocks` as a complete HTML document titled `title`.
pub fn render_html(title: &str, blocks: &[Block], layout: &PageLayout) -> String {
    let mut html = String::with_capacity(4096);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(html, "<title>{}</title>", encode_text(title));
    html.push_str("<style>\n");
    html.push_str(&stylesheet(layout));
    html.push_str("</style>\n</head>\n<body>\n");

    let mut i = 0;
    while i < blocks.len() {
        match &blocks[i] {
            Block::Heading { level, text } => {
                let level = (*level).clamp(1, 6);
                let _ = writeln!(html, "<h{level}>{}</h{level}>", text_html(text));
                i += 1;
            }
            Block::Paragraph(text) => {
                let _ = writeln!(html, "<p>{}</p>", text_html(text));
                i += 1;
            }
            Block::ListItem { .. } => {
                html.push_str("<ul>\n");
                while let Some(Block::ListItem { level, text }) = blocks.get(i) {
                    let _ = writeln!(
                        html,
                        "<li style=\"margin-left:{}em\">{}</li>",
                        f32::from(*level) * 1.5,
                        text_html(text)
                    );
                    i += 1;
                }
                html.push_str("</ul>\n");
            }
            Block::TableRow(_) => {
                html.push_str("<table>\n");
                while let Some(Block::TableRow(cells)) = blocks.get(i) {
                    html.push_str("<tr>");
                    for cell in cells {
                        let _ = write!(html, "<td>{}</td>", text_html(cell));
                    }
                    html.push_str("</tr>\n");
                    i += 1;
                }
                html.push_str("</table>\n");
            }
        }
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn stylesheet(layout: &PageLayout) -> String {
    let color_adjust = if layout.print_background {
        "-webkit-print-color-adjust: exact; print-color-adjust: exact;"
    } else {
        ""
    };
    format!(
        "@page {{ size: {w}pt {h}pt; margin: {m}pt; }}\n\
         html, body {{ margin: 0; padding: 0; background: #ffffff; {color_adjust} }}\n\
         body {{ font-family: Helvetica, Arial, sans-serif; font-size: {f}pt; line-height: 1.25; color: #000000; }}\n\
         h1, h2, h3, h4, h5, h6 {{ font-weight: bold; margin: 0.8em 0 0.4em; }}\n\
         p {{ margin: 0 0 0.6em; white-space: pre-wrap; }}\n\
         ul {{ margin: 0 0 0.6em; padding-left: 1.2em; }}\n\
         table {{ border-collapse: collapse; width: 100%; margin: 0 0 0.6em; }}\n\
         td {{ border: 0.5pt solid #808080; padding: 2pt 4pt; vertical-align: top; }}\n",
        w = layout.width_pt,
        h = layout.height_pt,
        m = layout.margin_pt,
        f = layout.font_size_pt,
    )
}

/// Escape and turn soft line breaks into `<br>`.
fn text_html(text: &str) -> String {
    text.split('\n')
        .map(|line| encode_text(line).into_owned())
        .collect::<Vec<_>>()
        .join("<br>")
}
