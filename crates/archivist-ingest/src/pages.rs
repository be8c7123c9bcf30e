//! Page windows: keep the first and last pages of a long PDF.

use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PageWindowError {
    #[error("failed to read PDF {path}: {message}")]
    Load { path: PathBuf, message: String },
    #[error("failed to write page subset of {path}: {message}")]
    Save { path: PathBuf, message: String },
}

/// How many pages to keep from each end. `0` on both sides means all pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageWindow {
    pub first: usize,
    pub last: usize,
}

impl PageWindow {
    pub fn new(first: usize, last: usize) -> Self {
        Self { first, last }
    }

    pub fn is_unbounded(&self) -> bool {
        self.first == 0 && self.last == 0
    }

    /// 1-based page numbers to keep out of `total`, in document order.
    ///
    /// `None` means the whole document is used: the window is unbounded, or
    /// it covers every page (`first + last >= total`).
    pub fn select(&self, total: usize) -> Option<Vec<usize>> {
        if self.is_unbounded() || self.first.saturating_add(self.last) >= total {
            return None;
        }
        let head = 1..=self.first;
        let tail_start = self.first.max(total - self.last);
        let tail = (tail_start + 1)..=total;
        Some(head.chain(tail).collect())
    }
}

/// The PDF handed to text extraction.
#[derive(Debug)]
pub enum WindowedPdf {
    Original(PathBuf),
    /// A temporary copy holding only the kept pages; removed on drop.
    Subset {
        file: NamedTempFile,
        kept: Vec<usize>,
        total: usize,
    },
}

impl WindowedPdf {
    pub fn path(&self) -> &Path {
        match self {
            WindowedPdf::Original(path) => path,
            WindowedPdf::Subset { file, .. } => file.path(),
        }
    }

    pub fn is_subset(&self) -> bool {
        matches!(self, WindowedPdf::Subset { .. })
    }
}

/// Apply `window` to the PDF at `path`.
///
/// Blocking; async callers run it on the blocking pool.
pub fn apply_window(path: &Path, window: PageWindow) -> Result<WindowedPdf, PageWindowError> {
    if window.is_unbounded() {
        return Ok(WindowedPdf::Original(path.to_path_buf()));
    }

    let load_err = |message: String| PageWindowError::Load {
        path: path.to_path_buf(),
        message,
    };
    let save_err = |message: String| PageWindowError::Save {
        path: path.to_path_buf(),
        message,
    };

    let mut doc = lopdf::Document::load(path).map_err(|e| load_err(e.to_string()))?;
    let total = doc.get_pages().len();

    let Some(kept) = window.select(total) else {
        tracing::warn!(
            path = %path.display(),
            first = window.first,
            last = window.last,
            total,
            "page window covers the whole document, using full PDF"
        );
        return Ok(WindowedPdf::Original(path.to_path_buf()));
    };

    let dropped: Vec<u32> = (1..=total)
        .filter(|n| !kept.contains(n))
        .map(|n| n as u32)
        .collect();
    doc.delete_pages(&dropped);
    doc.prune_objects();

    let mut file = tempfile::Builder::new()
        .prefix("archivist-window-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| save_err(e.to_string()))?;
    doc.save_to(file.as_file_mut())
        .map_err(|e| save_err(e.to_string()))?;

    tracing::info!(
        path = %path.display(),
        kept = kept.len(),
        total,
        "created page subset"
    );
    Ok(WindowedPdf::Subset { file, kept, total })
}
