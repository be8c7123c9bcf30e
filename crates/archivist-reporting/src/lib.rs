use std::path::{Path, PathBuf};

use thiserror::Error;

use archivist_core::{FieldContext, MetadataRecord};

pub mod clean;
pub mod csv;
pub mod json;
pub mod json_to_csv;

pub use clean::clean_text;
pub use csv::CsvSink;
pub use json::{JsonSink, MetadataFile, StoredRecord};
pub use json_to_csv::{CsvExport, JsonSummary, json_to_csv, summarize};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl SinkError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> SinkError + '_ {
        move |source| SinkError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn json(path: &Path) -> impl FnOnce(serde_json::Error) -> SinkError + '_ {
        move |source| SinkError::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One processed document, ready to be written.
#[derive(Debug, Clone, Copy)]
pub struct SinkEntry<'a> {
    /// The discovered file; its base name becomes the asset id.
    pub source: &'a Path,
    pub original_format: &'a str,
    pub record: &'a MetadataRecord,
}

impl SinkEntry<'_> {
    pub fn asset_id(&self) -> String {
        asset_id(self.source)
    }
}

/// Base name of a document path.
pub fn asset_id(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Destination for metadata records. Writes are sequential.
pub trait MetadataSink: Send {
    fn write(&mut self, entry: &SinkEntry<'_>) -> Result<(), SinkError>;

    fn path(&self) -> &Path;

    /// Records written through this sink (not counting earlier runs).
    fn written(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    Csv(PathBuf),
    Json(PathBuf),
}

impl SinkTarget {
    pub fn path(&self) -> &Path {
        match self {
            SinkTarget::Csv(p) | SinkTarget::Json(p) => p,
        }
    }
}

/// Open (creating if needed) the sink for `target`.
pub fn open_sink(
    target: &SinkTarget,
    context: &FieldContext,
) -> Result<Box<dyn MetadataSink>, SinkError> {
    Ok(match target {
        SinkTarget::Csv(path) => Box::new(CsvSink::open(path, context)?),
        SinkTarget::Json(path) => Box::new(JsonSink::open(path)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_id_is_base_name() {
        assert_eq!(asset_id(Path::new("/archive/2014/vital-82.pdf")), "vital-82.pdf");
        assert_eq!(asset_id(Path::new("memo.docx")), "memo.docx");
    }

    #[test]
    fn open_sink_dispatches_on_target() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = FieldContext::builtin().unwrap();

        let csv = SinkTarget::Csv(dir.path().join("out.csv"));
        let sink = open_sink(&csv, &ctx).unwrap();
        assert_eq!(sink.path(), csv.path());
        assert!(csv.path().exists());

        let json = SinkTarget::Json(dir.path().join("out.json"));
        let sink = open_sink(&json, &ctx).unwrap();
        assert_eq!(sink.written(), 0);
        assert!(json.path().exists());
    }
}
