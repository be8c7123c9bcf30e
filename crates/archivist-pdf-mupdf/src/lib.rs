use std::path::Path;

use mupdf::{Document, TextPageFlags};

use archivist_core::{BackendError, PdfBackend};

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate is the sole AGPL island: it isolates the mupdf dependency
/// (which is AGPL-3.0) so that non-PDF code paths do not transitively
/// depend on it.
///
/// Headers and footers are kept. Archive documents often carry their only
/// date and reference code there (e.g. "(c) ICAEW 2014 TECPLN12949 05/14").
#[derive(Debug, Default, Clone, Copy)]
pub struct MupdfBackend;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }
}

impl PdfBackend for MupdfBackend {
    fn name(&self) -> &'static str {
        "mupdf"
    }

    fn extract_text(&self, path: &Path) -> Result<String, BackendError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::open(path, "path is not valid UTF-8"))?;
        let document =
            Document::open(path_str).map_err(|e| BackendError::open(path, e.to_string()))?;
        let pages = document
            .pages()
            .map_err(|e| BackendError::open(path, e.to_string()))?;

        let mut pages_text = Vec::new();
        for (index, page) in pages.enumerate() {
            let page_error = |e: mupdf::Error| BackendError::Page {
                page: index + 1,
                message: e.to_string(),
            };
            let text_page = page
                .map_err(page_error)?
                .to_text_page(TextPageFlags::empty())
                .map_err(page_error)?;
            pages_text.push(page_lines(&text_page));
        }

        let text = pages_text.join("\n").trim().to_string();
        if text.is_empty() {
            tracing::info!(path = %path.display(), pages = pages_text.len(), "PDF has no text layer");
        } else {
            tracing::debug!(path = %path.display(), pages = pages_text.len(), chars = text.len(), "extracted PDF text");
        }
        Ok(text)
    }
}

/// One line per text line, right-trimmed; undecodable glyphs become U+FFFD.
fn page_lines(text_page: &mupdf::TextPage) -> String {
    let mut out = String::new();
    for block in text_page.blocks() {
        for line in block.lines() {
            let line_text: String = line
                .chars()
                .map(|c| c.char().unwrap_or('\u{FFFD}'))
                .collect();
            out.push_str(line_text.trim_end());
            out.push('\n');
        }
    }
    out
}
