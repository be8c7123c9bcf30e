use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

pub mod backend;
pub mod config_file;
pub mod dates;
pub mod extractor;
pub mod fields;
pub mod prompt;
pub mod reconcile;
pub mod record;
pub mod schema;
pub mod service;
pub mod text_utils;

// Re-export for convenience
pub use backend::{BackendError, PdfBackend};
pub use extractor::{CallOutcome, DocumentInput, Extraction, MetadataExtractor};
pub use fields::{ContextError, FieldContext, FieldDescriptor, FieldShape};
pub use reconcile::{DocumentFacts, Reconciled, ValidationWarning};
pub use record::{FieldValue, MetadataRecord};
pub use schema::{ResponseSchema, build_schema};
pub use service::{ExtractionRequest, ExtractionService, PdfAttachment, ServiceError};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY is not set (use the environment, a .env file or the config file)")]
    MissingApiKey,
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// What the service is given for each document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentMode {
    /// Extracted text (plus OCR text).
    #[default]
    Text,
    /// The page-windowed PDF itself.
    File,
}

impl FromStr for ContentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(ContentMode::Text),
            "file" => Ok(ContentMode::File),
            other => Err(format!("unknown content mode `{other}` (expected text or file)")),
        }
    }
}

/// Run configuration, resolved once in `main` and passed down.
#[derive(Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub mode: ContentMode,
    pub context_path: Option<PathBuf>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Pages kept from the start; 0 means no limit.
    pub first_pages: usize,
    /// Pages kept from the end; 0 means no limit.
    pub last_pages: usize,
    pub workers: usize,
    pub ocr: bool,
    pub conversion_timeout_secs: u64,
    pub libreoffice: String,
    pub pandoc: String,
    pub tesseract: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("mode", &self.mode)
            .field("context_path", &self.context_path)
            .field("include", &self.include)
            .field("exclude", &self.exclude)
            .field("first_pages", &self.first_pages)
            .field("last_pages", &self.last_pages)
            .field("workers", &self.workers)
            .field("ocr", &self.ocr)
            .field("conversion_timeout_secs", &self.conversion_timeout_secs)
            .field("libreoffice", &self.libreoffice)
            .field("pandoc", &self.pandoc)
            .field("tesseract", &self.tesseract)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: service::openai::DEFAULT_MODEL.to_string(),
            base_url: service::openai::DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 120,
            mode: ContentMode::Text,
            context_path: None,
            include: Vec::new(),
            exclude: Vec::new(),
            first_pages: 0,
            last_pages: 0,
            workers: 1,
            ocr: false,
            conversion_timeout_secs: 60,
            libreoffice: "libreoffice".to_string(),
            pandoc: "pandoc".to_string(),
            tesseract: "tesseract".to_string(),
        }
    }
}

fn parse_env<T: FromStr>(key: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    match value {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: v }),
    }
}

impl Config {
    /// Resolve environment > config file > defaults.
    ///
    /// `env` looks a variable up; `main` passes `std::env::var(..).ok()`.
    /// CLI flags are applied on top by the caller.
    pub fn from_sources(
        file: &config_file::ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(service) = &file.service {
            config.api_key = service.api_key.clone().or(config.api_key);
            if let Some(model) = &service.model {
                config.model = model.clone();
            }
            if let Some(url) = &service.base_url {
                config.base_url = url.clone();
            }
            if let Some(secs) = service.timeout_secs {
                config.request_timeout_secs = secs;
            }
            if let Some(mode) = &service.mode {
                config.mode = mode.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "service.mode",
                    value: mode.clone(),
                })?;
            }
        }
        if let Some(extraction) = &file.extraction {
            config.context_path = extraction.context_path.as_ref().map(PathBuf::from);
            config.include = extraction.include.clone().unwrap_or_default();
            config.exclude = extraction.exclude.clone().unwrap_or_default();
            config.first_pages = extraction.first_pages.unwrap_or(config.first_pages);
            config.last_pages = extraction.last_pages.unwrap_or(config.last_pages);
            config.workers = extraction.workers.unwrap_or(config.workers);
            config.ocr = extraction.ocr.unwrap_or(config.ocr);
        }
        if let Some(conversion) = &file.conversion {
            config.conversion_timeout_secs = conversion
                .timeout_secs
                .unwrap_or(config.conversion_timeout_secs);
            if let Some(v) = &conversion.libreoffice {
                config.libreoffice = v.clone();
            }
            if let Some(v) = &conversion.pandoc {
                config.pandoc = v.clone();
            }
            if let Some(v) = &conversion.tesseract {
                config.tesseract = v.clone();
            }
        }

        if let Some(key) = env("OPENAI_API_KEY") {
            config.api_key = Some(key);
        }
        if let Some(model) = env("ARCHIVIST_MODEL") {
            config.model = model;
        }
        if let Some(url) = env("OPENAI_BASE_URL") {
            config.base_url = url;
        }
        if let Some(secs) = parse_env("ARCHIVIST_TIMEOUT", env("ARCHIVIST_TIMEOUT"))? {
            config.request_timeout_secs = secs;
        }
        if let Some(workers) = parse_env("ARCHIVIST_WORKERS", env("ARCHIVIST_WORKERS"))? {
            config.workers = workers;
        }
        config.workers = config.workers.max(1);
        Ok(config)
    }

    /// The API key, or the fatal startup error.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    /// Load the field context named by the config (built-in when unset) and
    /// apply include/exclude overrides.
    pub fn load_field_context(&self) -> Result<FieldContext, ConfigError> {
        let context = match &self.context_path {
            Some(path) => FieldContext::from_path(path)?,
            None => FieldContext::builtin()?,
        };
        Ok(context.with_overrides(&self.include, &self.exclude)?)
    }
}

/// Per-document pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStage {
    Discovered,
    Converted,
    TextExtracted,
    PromptSent,
    ResponseReceived,
    Reconciled,
    Written,
    ConversionFailed,
    ExtractionFailed,
}

impl DocumentStage {
    pub fn label(self) -> &'static str {
        match self {
            DocumentStage::Discovered => "discovered",
            DocumentStage::Converted => "converted",
            DocumentStage::TextExtracted => "text extracted",
            DocumentStage::PromptSent => "prompt sent",
            DocumentStage::ResponseReceived => "response received",
            DocumentStage::Reconciled => "reconciled",
            DocumentStage::Written => "written",
            DocumentStage::ConversionFailed => "conversion failed",
            DocumentStage::ExtractionFailed => "extraction failed",
        }
    }
}

/// Progress events emitted during a run.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Inputs were discovered; emitted once before processing.
    Started { total: usize },
    Stage {
        index: usize,
        total: usize,
        path: PathBuf,
        stage: DocumentStage,
    },
    Warning {
        index: usize,
        total: usize,
        path: PathBuf,
        message: String,
    },
    /// Terminal failure for one document; processing continues.
    Failed {
        index: usize,
        total: usize,
        path: PathBuf,
        stage: DocumentStage,
        error: String,
    },
}

/// Summary statistics for a complete run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub found: usize,
    pub written: usize,
    pub failed: usize,
    pub service_failures: usize,
    pub warnings: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_file::{ConfigFile, ExtractionConfig, ServiceConfig};
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = Config {
            api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("***"));
    }

    #[test]
    fn env_overrides_file() {
        let file = ConfigFile {
            service: Some(ServiceConfig {
                api_key: Some("from-file".into()),
                model: Some("file-model".into()),
                ..Default::default()
            }),
            extraction: Some(ExtractionConfig {
                workers: Some(2),
                first_pages: Some(6),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config =
            Config::from_sources(&file, env_from(&[("OPENAI_API_KEY", "from-env")])).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.model, "file-model");
        assert_eq!(config.workers, 2);
        assert_eq!(config.first_pages, 6);
    }

    #[test]
    fn defaults_apply_without_sources() {
        let config = Config::from_sources(&ConfigFile::default(), env_from(&[])).unwrap();
        assert_eq!(config.model, "gpt-4.1");
        assert_eq!(config.workers, 1);
        assert_eq!(config.mode, ContentMode::Text);
        assert!(matches!(
            config.require_api_key(),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn invalid_env_number_is_an_error() {
        let err = Config::from_sources(
            &ConfigFile::default(),
            env_from(&[("ARCHIVIST_WORKERS", "many")]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "ARCHIVIST_WORKERS",
                ..
            }
        ));
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let config = Config::from_sources(
            &ConfigFile::default(),
            env_from(&[("OPENAI_API_KEY", "  ")]),
        )
        .unwrap();
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn content_mode_parses() {
        assert_eq!("FILE".parse::<ContentMode>().unwrap(), ContentMode::File);
        assert!("pdf".parse::<ContentMode>().is_err());
    }

    #[test]
    fn field_context_overrides_apply() {
        let config = Config {
            exclude: vec!["Description".into()],
            ..Default::default()
        };
        let ctx = config.load_field_context().unwrap();
        assert!(!ctx.get("Description").unwrap().included);
    }
}
