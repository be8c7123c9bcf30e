use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("cannot open {}: {message}", .path.display())]
    Open { path: PathBuf, message: String },
    /// `page` is 1-based.
    #[error("cannot read text of page {page}: {message}")]
    Page { page: usize, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn open(path: &Path, message: impl Into<String>) -> Self {
        BackendError::Open {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Text source for the page-windowed PDF of each document.
///
/// Pages come back in order, separated by a blank line. A scanned PDF
/// without a text layer yields an empty string rather than an error.
pub trait PdfBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn extract_text(&self, path: &Path) -> Result<String, BackendError>;
}
