use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

use crate::process::{ProcessError, run_tool};

/// Text recognition through the `tesseract` CLI.
#[derive(Debug, Clone)]
pub struct Ocr {
    program: String,
    timeout: Duration,
}

impl Ocr {
    pub fn new(program: &str, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            timeout,
        }
    }

    /// `tesseract <image> stdout`, trimmed.
    pub async fn recognize(&self, image: &Path) -> Result<String, ProcessError> {
        let stdout = run_tool(
            &self.program,
            [image.as_os_str(), OsStr::new("stdout")],
            self.timeout,
        )
        .await?;
        let text = String::from_utf8_lossy(&stdout).trim().to_string();
        tracing::debug!(path = %image.display(), chars = text.len(), "OCR finished");
        Ok(text)
    }
}
