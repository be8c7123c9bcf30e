use std::ffi::OsStr;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use super::{ConvertError, Converter};
use crate::formats::OFFICE_EXTENSIONS;
use crate::process::run_tool;

/// Headless LibreOffice (`--convert-to pdf`).
pub struct LibreOffice {
    program: String,
    timeout: Duration,
}

impl LibreOffice {
    pub fn new(program: &str, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            timeout,
        }
    }

    async fn run(&self, input: &Path, target: &Path) -> Result<(), ConvertError> {
        let parent = target.parent().unwrap_or_else(|| Path::new("."));
        // Sibling of the target so the final move is a rename on one filesystem.
        let out_dir = tempfile::Builder::new()
            .prefix(".archivist-lo-")
            .tempdir_in(parent)?;

        run_tool(
            &self.program,
            [
                OsStr::new("--headless"),
                OsStr::new("--convert-to"),
                OsStr::new("pdf"),
                OsStr::new("--outdir"),
                out_dir.path().as_os_str(),
                input.as_os_str(),
            ],
            self.timeout,
        )
        .await?;

        let mut produced: Vec<PathBuf> = std::fs::read_dir(out_dir.path())?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| crate::formats::is_pdf(path))
            .collect();
        produced.sort();
        let Some(pdf) = produced.into_iter().next() else {
            return Err(ConvertError::NoOutput {
                converter: self.name(),
            });
        };

        tokio::fs::rename(&pdf, target).await?;
        Ok(())
    }
}

impl Converter for LibreOffice {
    fn name(&self) -> &'static str {
        "libreoffice"
    }

    fn accepts(&self, ext: &str) -> bool {
        OFFICE_EXTENSIONS.contains(&ext) || ext == "txt"
    }

    fn convert<'a>(
        &'a self,
        input: &'a Path,
        target: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<(), ConvertError>> + Send + 'a>> {
        Box::pin(self.run(input, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_office_formats_and_plain_text() {
        let lo = LibreOffice::new("libreoffice", Duration::from_secs(1));
        for ext in ["docx", "doc", "xlsx", "xls", "pptx", "ppt", "txt"] {
            assert!(lo.accepts(ext), "{ext}");
        }
        assert!(!lo.accepts("srt"));
        assert!(!lo.accepts("png"));
    }

    #[tokio::test]
    async fn missing_binary_fails_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("memo.docx");
        std::fs::write(&input, b"x").unwrap();

        let lo = LibreOffice::new("archivist-no-such-office", Duration::from_secs(5));
        let err = lo
            .convert(&input, &input.with_extension("pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Process(_)));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".archivist-lo-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
