use std::ffi::OsStr;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use super::{ConvertError, Converter};
use crate::process::run_tool;

/// `pandoc <input> -o <output.pdf>`; needs a LaTeX engine on the host.
pub struct Pandoc {
    program: String,
    timeout: Duration,
}

impl Pandoc {
    pub fn new(program: &str, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            timeout,
        }
    }

    async fn run(&self, input: &Path, target: &Path) -> Result<(), ConvertError> {
        run_tool(
            &self.program,
            [input.as_os_str(), OsStr::new("-o"), target.as_os_str()],
            self.timeout,
        )
        .await?;

        if !target.is_file() {
            return Err(ConvertError::NoOutput {
                converter: self.name(),
            });
        }
        Ok(())
    }
}

impl Converter for Pandoc {
    fn name(&self) -> &'static str {
        "pandoc"
    }

    fn accepts(&self, ext: &str) -> bool {
        matches!(ext, "docx" | "txt")
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
    fn accepts_docx_and_txt_only() {
        let pandoc = Pandoc::new("pandoc", Duration::from_secs(1));
        assert!(pandoc.accepts("docx"));
        assert!(pandoc.accepts("txt"));
        assert!(!pandoc.accepts("doc"));
        assert!(!pandoc.accepts("jpg"));
    }
}
