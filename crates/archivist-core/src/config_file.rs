use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub service: Option<ServiceConfig>,
    pub extraction: Option<ExtractionConfig>,
    pub conversion: Option<ConversionConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub context_path: Option<String>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub first_pages: Option<usize>,
    pub last_pages: Option<usize>,
    pub workers: Option<usize>,
    pub ocr: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionConfig {
    pub timeout_secs: Option<u64>,
    pub libreoffice: Option<String>,
    pub pandoc: Option<String>,
    pub tesseract: Option<String>,
}

/// Platform config directory path: `<config_dir>/archivist/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("archivist").join("config.toml"))
}

/// Load config by cascading CWD `.archivist.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".archivist.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            None
        }
    }
}

fn pick<S, T>(overlay: &Option<S>, base: &Option<S>, get: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&get)
        .or_else(|| base.as_ref().and_then(&get))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (bs, os) = (&base.service, &overlay.service);
    let (be, oe) = (&base.extraction, &overlay.extraction);
    let (bc, oc) = (&base.conversion, &overlay.conversion);

    ConfigFile {
        service: Some(ServiceConfig {
            api_key: pick(os, bs, |s| s.api_key.clone()),
            model: pick(os, bs, |s| s.model.clone()),
            base_url: pick(os, bs, |s| s.base_url.clone()),
            timeout_secs: pick(os, bs, |s| s.timeout_secs),
            mode: pick(os, bs, |s| s.mode.clone()),
        }),
        extraction: Some(ExtractionConfig {
            context_path: pick(oe, be, |e| e.context_path.clone()),
            include: pick(oe, be, |e| e.include.clone()),
            exclude: pick(oe, be, |e| e.exclude.clone()),
            first_pages: pick(oe, be, |e| e.first_pages),
            last_pages: pick(oe, be, |e| e.last_pages),
            workers: pick(oe, be, |e| e.workers),
            ocr: pick(oe, be, |e| e.ocr),
        }),
        conversion: Some(ConversionConfig {
            timeout_secs: pick(oc, bc, |c| c.timeout_secs),
            libreoffice: pick(oc, bc, |c| c.libreoffice.clone()),
            pandoc: pick(oc, bc, |c| c.pandoc.clone()),
            tesseract: pick(oc, bc, |c| c.tesseract.clone()),
        }),
    }
}
