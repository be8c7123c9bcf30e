//! `format_mapping.json`: which PDFs were converted from what.
//!
//! Keys are PDF paths as written by the converter (directory joined with
//! the file name), values are the original extension without the dot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::formats::CONVERTIBLE_EXTENSIONS;

pub const FORMAT_MAPPING_FILE: &str = "format_mapping.json";

pub type FormatMapping = BTreeMap<String, String>;

pub fn mapping_path(dir: &Path) -> PathBuf {
    dir.join(FORMAT_MAPPING_FILE)
}

/// Read the mapping in `dir`. Missing or unreadable files yield an empty map.
pub fn load_mapping(dir: &Path) -> FormatMapping {
    let path = mapping_path(dir);
    let Ok(content) = std::fs::read_to_string(&path) else {
        return FormatMapping::new();
    };
    match serde_json::from_str(&content) {
        Ok(mapping) => mapping,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read format mapping");
            FormatMapping::new()
        }
    }
}

/// Merge `entries` into the mapping file in `dir` and write it back.
pub fn save_mapping(dir: &Path, entries: &FormatMapping) -> std::io::Result<PathBuf> {
    let mut mapping = load_mapping(dir);
    mapping.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
    let path = mapping_path(dir);
    let json = serde_json::to_string_pretty(&mapping).map_err(std::io::Error::other)?;
    std::fs::write(&path, json)?;
    Ok(path)
}

/// Key under which a converted PDF is recorded.
pub fn mapping_key(pdf: &Path) -> String {
    pdf.display().to_string()
}

/// Resolve the format a PDF was originally delivered in.
///
/// Checks the directory's mapping file, then a sibling with the same stem
/// and a convertible extension, and falls back to `"pdf"`.
pub fn detect_original_format(pdf: &Path) -> String {
    let dir = pdf.parent().unwrap_or_else(|| Path::new("."));
    let mapping = load_mapping(dir);
    if !mapping.is_empty() {
        let key = mapping_key(pdf);
        let by_name = || {
            let name = pdf.file_name()?;
            mapping
                .iter()
                .find(|(k, _)| Path::new(k).file_name() == Some(name))
                .map(|(_, v)| v)
        };
        if let Some(format) = mapping.get(&key).or_else(by_name) {
            tracing::debug!(path = %pdf.display(), format = %format, "original format from mapping");
            return format.to_ascii_lowercase();
        }
    }

    for ext in CONVERTIBLE_EXTENSIONS {
        if pdf.with_extension(ext).is_file() {
            tracing::debug!(path = %pdf.display(), format = ext, "original format from sibling file");
            return (*ext).to_string();
        }
    }

    "pdf".to_string()
}
