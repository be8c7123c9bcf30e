use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use archivist_core::{
    BackendError, Config, ContentMode, DocumentFacts, DocumentInput, PdfAttachment, PdfBackend,
};

pub mod convert;
pub mod discover;
pub mod format_map;
pub mod formats;
pub mod ocr;
pub mod pages;
pub mod pdfgen;
pub mod process;

pub use archivist_core::DocumentStage;
pub use convert::{
    ConversionSettings, ConvertError, Converter, ConverterChain, DirectoryConversion,
    convert_directory,
};
pub use discover::{InputSource, discover};
pub use format_map::detect_original_format;
pub use ocr::Ocr;
pub use pages::{PageWindow, PageWindowError, WindowedPdf, apply_window};
pub use process::ProcessError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error(transparent)]
    PageWindow(#[from] PageWindowError),
    #[error("text extraction failed: {0}")]
    Text(#[from] BackendError),
    #[error("background task failed: {0}")]
    Task(String),
    #[cfg(not(feature = "pdf"))]
    #[error("PDF support not compiled in (enable the `pdf` feature of archivist-ingest)")]
    NoPdfSupport,
}

impl IngestError {
    /// Terminal stage this error leaves the document in.
    pub fn stage(&self) -> DocumentStage {
        match self {
            IngestError::Convert(_) => DocumentStage::ConversionFailed,
            _ => DocumentStage::ExtractionFailed,
        }
    }
}

/// The PDF text backend compiled into this build.
#[cfg(feature = "pdf")]
pub fn default_backend() -> Result<Arc<dyn PdfBackend>, IngestError> {
    Ok(Arc::new(archivist_pdf_mupdf::MupdfBackend::new()))
}

#[cfg(not(feature = "pdf"))]
pub fn default_backend() -> Result<Arc<dyn PdfBackend>, IngestError> {
    Err(IngestError::NoPdfSupport)
}

#[derive(Debug, Clone, Default)]
pub struct PrepareOptions {
    pub window: PageWindow,
    pub mode: ContentMode,
    /// Set when image originals should also be OCR'd.
    pub ocr: Option<Ocr>,
}

impl PrepareOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            window: PageWindow::new(config.first_pages, config.last_pages),
            mode: config.mode,
            ocr: config.ocr.then(|| {
                Ocr::new(
                    &config.tesseract,
                    Duration::from_secs(config.conversion_timeout_secs),
                )
            }),
        }
    }
}

/// A document ready for the extraction service.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    /// The file as discovered.
    pub source: PathBuf,
    pub original_format: String,
    pub converted: bool,
    /// `(kept, total)` when a page window cut the document.
    pub pages_kept: Option<(usize, usize)>,
    pub input: DocumentInput,
}

/// Turns a discovered file into a [`PreparedDocument`]: converts it if
/// needed, applies the page window, extracts text (or attaches the PDF),
/// and runs OCR on image originals.
///
/// Conversions go to a private scratch directory that lives only for the
/// call, so documents sharing a stem never read each other's PDF.
pub struct DocumentPreparer {
    chain: ConverterChain,
    backend: Arc<dyn PdfBackend>,
    options: PrepareOptions,
}

impl DocumentPreparer {
    pub fn new(
        chain: ConverterChain,
        backend: Arc<dyn PdfBackend>,
        options: PrepareOptions,
    ) -> Self {
        Self {
            chain,
            backend,
            options,
        }
    }

    /// Standard converter chain and the compiled-in PDF backend.
    pub fn from_config(config: &Config) -> Result<Self, IngestError> {
        Ok(Self::new(
            ConverterChain::standard(&ConversionSettings::from_config(config)),
            default_backend()?,
            PrepareOptions::from_config(config),
        ))
    }

    pub async fn prepare(&self, source: &Path) -> Result<PreparedDocument, IngestError> {
        let scratch = if formats::is_pdf(source) {
            None
        } else {
            let dir = tempfile::Builder::new()
                .prefix("archivist-")
                .tempdir()
                .map_err(|e| IngestError::Io {
                    path: std::env::temp_dir(),
                    source: e,
                })?;
            Some(dir)
        };
        let conversion = match &scratch {
            Some(dir) => {
                let name = source.with_extension("pdf");
                let target = dir.path().join(name.file_name().unwrap_or_default());
                self.chain.convert_to(source, &target).await?
            }
            None => self.chain.convert(source).await?,
        };
        let pdf_path = conversion.pdf_path.clone();
        let original_format = if conversion.was_converted {
            conversion.original_format.clone()
        } else {
            detect_original_format(&pdf_path)
        };

        let window = self.options.window;
        let windowed = {
            let path = pdf_path.clone();
            tokio::task::spawn_blocking(move || apply_window(&path, window))
                .await
                .map_err(|e| IngestError::Task(e.to_string()))??
        };
        let pages_kept = match &windowed {
            WindowedPdf::Subset { kept, total, .. } => Some((kept.len(), *total)),
            WindowedPdf::Original(_) => None,
        };

        let (text, attachment) = match self.options.mode {
            ContentMode::Text => {
                let backend = Arc::clone(&self.backend);
                let path = windowed.path().to_path_buf();
                let text = tokio::task::spawn_blocking(move || backend.extract_text(&path))
                    .await
                    .map_err(|e| IngestError::Task(e.to_string()))??;
                (text, None)
            }
            ContentMode::File => {
                let bytes = tokio::fs::read(windowed.path()).await.map_err(|source| {
                    IngestError::Io {
                        path: windowed.path().to_path_buf(),
                        source,
                    }
                })?;
                let file_name = pdf_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "document.pdf".to_string());
                (String::new(), Some(PdfAttachment { file_name, bytes }))
            }
        };
        drop(windowed);
        drop(scratch);

        let ocr_text = self.ocr_text(source, &original_format).await;

        tracing::debug!(
            path = %source.display(),
            format = %original_format,
            backend = self.backend.name(),
            chars = text.len(),
            "document prepared"
        );

        Ok(PreparedDocument {
            source: source.to_path_buf(),
            converted: conversion.was_converted,
            pages_kept,
            input: DocumentInput {
                text,
                ocr_text,
                attachment,
                facts: DocumentFacts {
                    original_format: original_format.clone(),
                },
            },
            original_format,
        })
    }

    /// OCR failures are logged and leave the document without OCR text.
    async fn ocr_text(&self, source: &Path, format: &str) -> Option<String> {
        let ocr = self.options.ocr.as_ref()?;
        if !formats::is_image_format(format) {
            return None;
        }
        let image = if formats::is_pdf(source) {
            source.with_extension(format)
        } else {
            source.to_path_buf()
        };
        if !image.is_file() {
            tracing::debug!(path = %image.display(), "original image not found, skipping OCR");
            return None;
        }
        match ocr.recognize(&image).await {
            Ok(text) if !text.is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %image.display(), error = %e, "OCR failed");
                None
            }
        }
    }
}
