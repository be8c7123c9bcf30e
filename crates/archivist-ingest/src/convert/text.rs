//! Plain text and subtitle files rendered as dense A4 pages.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use lopdf::content::{Content, Operation};
use lopdf::{Object, StringFormat, dictionary};

use super::{ConvertError, Converter};
use crate::formats::{TEXT_EXTENSIONS, extension_of};
use crate::pdfgen::{A4_HEIGHT, A4_WIDTH, PdfBuilder};

const FONT_SIZE: f32 = 8.0;
const LEADING: f32 = 9.0;
/// Quarter-inch margins.
const MARGIN: f32 = 18.0;

/// Built-in renderer for `txt`, `srt` and `vtt`.
pub struct TextRenderer;

impl Converter for TextRenderer {
    fn name(&self) -> &'static str {
        "text renderer"
    }

    fn accepts(&self, ext: &str) -> bool {
        TEXT_EXTENSIONS.contains(&ext)
    }

    fn convert<'a>(
        &'a self,
        input: &'a Path,
        target: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<(), ConvertError>> + Send + 'a>> {
        Box::pin(async move {
            let bytes = tokio::fs::read(input).await?;
            let ext = extension_of(input).unwrap_or_default();
            let out = target.to_path_buf();

            tokio::task::spawn_blocking(move || {
                let content = decode_text(&bytes);
                let content = match ext.as_str() {
                    "srt" => clean_srt(&content),
                    "vtt" => clean_vtt(&content),
                    _ => content,
                };
                let mut doc = render_text_pdf(&flow_text(&content))?;
                doc.save(&out)
                    .map_err(|e| ConvertError::Render(e.to_string()))?;
                Ok::<_, ConvertError>(())
            })
            .await
            .map_err(|e| ConvertError::Render(e.to_string()))?
        })
    }
}

/// UTF-8, falling back to Latin-1 for legacy files.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.trim_start_matches('\u{feff}').to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Drop cue numbers, timings, blank lines and `[sound]` annotations.
pub fn clean_srt(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .filter(|line| {
            !(line.is_empty()
                || line.chars().all(|c| c.is_ascii_digit())
                || line.contains("-->")
                || (line.starts_with('[') && line.ends_with(']')))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Drop the WebVTT header lines and blank lines.
pub fn clean_vtt(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .filter(|line| {
            !(line.is_empty()
                || line.starts_with("WEBVTT")
                || line.starts_with("X-TIMESTAMP-MAP")
                || line.starts_with("X-WRITER"))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Collapse all line breaks into one flowing paragraph.
pub fn flow_text(content: &str) -> String {
    content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Approximate Helvetica advance width in 1/1000 em.
fn glyph_width(c: char) -> u32 {
    match c {
        'i' | 'j' | 'l' | '\'' | '|' => 222,
        ' ' | 'f' | 't' | 'I' | '.' | ',' | ':' | ';' | '!' | '/' | '[' | ']' => 278,
        'r' | '(' | ')' | '-' | '"' => 333,
        'm' | 'M' => 833,
        'W' => 944,
        'w' => 722,
        '@' => 1015,
        'A'..='Z' => 722,
        _ => 556,
    }
}

fn text_width(s: &str) -> f32 {
    s.chars().map(glyph_width).sum::<u32>() as f32 * FONT_SIZE / 1000.0
}

/// Greedy word wrap; words wider than a line are split.
fn wrap(text: &str, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if text_width(&candidate) <= max_width {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        for c in word.chars() {
            current.push(c);
            if text_width(&current) > max_width {
                current.pop();
                lines.push(std::mem::take(&mut current));
                current.push(c);
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Encode for a WinAnsi Helvetica; characters outside Latin-1 are approximated.
fn encode_line(line: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len());
    for c in line.chars() {
        match c {
            '\u{2018}' | '\u{2019}' => out.push(b'\''),
            '\u{201C}' | '\u{201D}' => out.push(b'"'),
            '\u{2013}' | '\u{2014}' => out.push(b'-'),
            '\u{2026}' => out.extend_from_slice(b"..."),
            c if (c as u32) < 0x80 || (0xA0..=0xFF).contains(&(c as u32)) => {
                out.push(c as u32 as u8)
            }
            _ => out.push(b'?'),
        }
    }
    out
}

/// Lay `text` out on as many A4 pages as it needs.
pub(crate) fn render_text_pdf(text: &str) -> Result<lopdf::Document, ConvertError> {
    let render = |e: lopdf::Error| ConvertError::Render(e.to_string());

    let mut builder = PdfBuilder::new();
    let font_id = builder.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let lines = wrap(text, A4_WIDTH - 2.0 * MARGIN);
    let per_page = ((A4_HEIGHT - 2.0 * MARGIN) / LEADING).floor() as usize;
    let mut pages: Vec<&[String]> = lines.chunks(per_page.max(1)).collect();
    if pages.is_empty() {
        pages.push(&[]);
    }

    for page_lines in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
            Operation::new("TL", vec![LEADING.into()]),
            Operation::new(
                "Td",
                vec![MARGIN.into(), (A4_HEIGHT - MARGIN - FONT_SIZE).into()],
            ),
        ];
        for (i, line) in page_lines.iter().enumerate() {
            if i > 0 {
                operations.push(Operation::new("T*", vec![]));
            }
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(encode_line(line), StringFormat::Literal)],
            ));
        }
        operations.push(Operation::new("ET", vec![]));

        builder
            .add_page(
                A4_WIDTH,
                A4_HEIGHT,
                Content { operations },
                dictionary! { "Font" => dictionary! { "F1" => font_id } },
            )
            .map_err(render)?;
    }

    Ok(builder.finish())
}
