//! Conversion of office documents, text and images to PDF.
//!
//! Converters are tried in order; the first one that accepts the extension
//! and succeeds wins. Every failure is kept for the final error.

mod libreoffice;
mod pandoc;
mod raster;
mod text;

pub use self::libreoffice::LibreOffice;
pub use self::pandoc::Pandoc;
pub use self::raster::ImageRenderer;
pub use self::text::{TextRenderer, clean_srt, clean_vtt, decode_text, flow_text};

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use archivist_core::Config;
use thiserror::Error;

use crate::format_map::{FormatMapping, mapping_key, save_mapping};
use crate::formats::{CONVERTIBLE_EXTENSIONS, extension_of, is_convertible, is_pdf};
use crate::process::ProcessError;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("input file not found: {0}")]
    NotFound(PathBuf),
    #[error("unsupported file format: .{ext} (supported: {})", CONVERTIBLE_EXTENSIONS.join(", "))]
    Unsupported { ext: String },
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("{converter} produced no PDF")]
    NoOutput { converter: &'static str },
    #[error("failed to render PDF: {0}")]
    Render(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to convert {}: {}", .file.display(), describe_failures(.failures))]
    AllFailed {
        file: PathBuf,
        failures: Vec<(&'static str, ConvertError)>,
    },
}

fn describe_failures(failures: &[(&'static str, ConvertError)]) -> String {
    if failures.is_empty() {
        return "no converter accepts this format".to_string();
    }
    failures
        .iter()
        .map(|(name, err)| format!("{name}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// One way of producing a PDF from a source document.
pub trait Converter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this converter handles the lowercased extension.
    fn accepts(&self, ext: &str) -> bool;

    /// Convert `input` into a PDF at `target`, replacing any file there.
    fn convert<'a>(
        &'a self,
        input: &'a Path,
        target: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<(), ConvertError>> + Send + 'a>>;
}

/// External tool settings for the standard chain.
#[derive(Debug, Clone)]
pub struct ConversionSettings {
    pub timeout: Duration,
    pub libreoffice: String,
    pub pandoc: String,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            libreoffice: "libreoffice".to_string(),
            pandoc: "pandoc".to_string(),
        }
    }
}

impl ConversionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.conversion_timeout_secs),
            libreoffice: config.libreoffice.clone(),
            pandoc: config.pandoc.clone(),
        }
    }
}

/// Result of running a document through the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub pdf_path: PathBuf,
    pub was_converted: bool,
    /// Extension of the source without the dot (`"pdf"` for native PDFs).
    pub original_format: String,
    pub converter: Option<&'static str>,
}

pub struct ConverterChain {
    converters: Vec<Box<dyn Converter>>,
}

impl ConverterChain {
    pub fn new(converters: Vec<Box<dyn Converter>>) -> Self {
        Self { converters }
    }

    /// LibreOffice, then Pandoc, then the built-in text and image renderers.
    pub fn standard(settings: &ConversionSettings) -> Self {
        Self::new(vec![
            Box::new(LibreOffice::new(&settings.libreoffice, settings.timeout)),
            Box::new(Pandoc::new(&settings.pandoc, settings.timeout)),
            Box::new(TextRenderer),
            Box::new(ImageRenderer),
        ])
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.converters.iter().map(|c| c.name()).collect()
    }

    /// Produce `<stem>.pdf` next to `input`. Native PDFs pass through
    /// unchanged.
    pub async fn convert(&self, input: &Path) -> Result<Conversion, ConvertError> {
        self.convert_to(input, &input.with_extension("pdf")).await
    }

    /// Like [`convert`](Self::convert), but a converted PDF is written to
    /// `target`. Sources sharing a stem (`memo.doc`, `memo.docx`) need
    /// distinct targets when converted concurrently.
    pub async fn convert_to(&self, input: &Path, target: &Path) -> Result<Conversion, ConvertError> {
        if !input.is_file() {
            return Err(ConvertError::NotFound(input.to_path_buf()));
        }
        if is_pdf(input) {
            return Ok(Conversion {
                pdf_path: input.to_path_buf(),
                was_converted: false,
                original_format: "pdf".to_string(),
                converter: None,
            });
        }
        let ext = extension_of(input).unwrap_or_default();
        if !is_convertible(input) {
            return Err(ConvertError::Unsupported { ext });
        }

        let mut failures = Vec::new();
        for converter in self.converters.iter().filter(|c| c.accepts(&ext)) {
            tracing::debug!(path = %input.display(), converter = converter.name(), "converting");
            match converter.convert(input, target).await {
                Ok(()) => {
                    tracing::info!(
                        path = %input.display(),
                        converter = converter.name(),
                        "converted to PDF"
                    );
                    return Ok(Conversion {
                        pdf_path: target.to_path_buf(),
                        was_converted: true,
                        original_format: ext,
                        converter: Some(converter.name()),
                    });
                }
                Err(e) => {
                    tracing::debug!(
                        path = %input.display(),
                        converter = converter.name(),
                        error = %e,
                        "converter failed, trying next"
                    );
                    failures.push((converter.name(), e));
                }
            }
        }

        Err(ConvertError::AllFailed {
            file: input.to_path_buf(),
            failures,
        })
    }
}

/// Outcome of converting a whole directory.
#[derive(Debug, Default)]
pub struct DirectoryConversion {
    /// Every PDF available afterwards: native ones plus fresh conversions.
    pub pdfs: Vec<PathBuf>,
    pub converted: usize,
    pub failures: Vec<(PathBuf, String)>,
    pub mapping_file: Option<PathBuf>,
}

/// Convert every convertible file in `dir` (top level only) and record the
/// original formats in `format_mapping.json`.
pub async fn convert_directory(
    dir: &Path,
    chain: &ConverterChain,
) -> Result<DirectoryConversion, crate::IngestError> {
    if !dir.exists() {
        return Err(crate::IngestError::NotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(crate::IngestError::NotADirectory(dir.to_path_buf()));
    }

    let entries = std::fs::read_dir(dir).map_err(|source| crate::IngestError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && (is_pdf(path) || is_convertible(path)))
        .collect();
    files.sort();
    tracing::info!(dir = %dir.display(), count = files.len(), "found supported files");

    let mut result = DirectoryConversion::default();
    let mut mapping = FormatMapping::new();

    for file in files.iter().filter(|f| is_convertible(f)) {
        match chain.convert(file).await {
            Ok(conversion) => {
                result.converted += 1;
                mapping.insert(
                    mapping_key(&conversion.pdf_path),
                    conversion.original_format.clone(),
                );
                result.pdfs.push(conversion.pdf_path);
            }
            Err(e) => {
                tracing::warn!(path = %file.display(), error = %e, "conversion failed");
                result.failures.push((file.clone(), e.to_string()));
            }
        }
    }
    for pdf in files.iter().filter(|f| is_pdf(f)) {
        if !result.pdfs.contains(pdf) {
            result.pdfs.push(pdf.clone());
        }
    }
    result.pdfs.sort();

    if !mapping.is_empty() {
        let path = save_mapping(dir, &mapping).map_err(|source| crate::IngestError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "format mapping saved");
        result.mapping_file = Some(path);
    }

    Ok(result)
}
