//! JSON sink: a single document holding every record written so far.
//!
//! Each write re-reads the file, appends, and atomically replaces it, so a
//! crash never leaves a half-written document behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clean::clean_text;
use crate::{MetadataSink, SinkEntry, SinkError};

/// On-disk layout of a JSON sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataFile {
    #[serde(default)]
    pub metadata: Vec<StoredRecord>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub total_records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(default)]
    pub asset_id: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default = "default_format")]
    pub original_format: String,
    #[serde(default)]
    pub extracted_at: String,
    /// Field name to value, in field-context order.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_format() -> String {
    "pdf".to_string()
}

/// Local time in ISO-8601 with microseconds.
pub(crate) fn timestamp() -> String {
    chrono::Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

impl MetadataFile {
    fn empty() -> Self {
        let now = timestamp();
        Self {
            metadata: Vec::new(),
            created_at: now.clone(),
            last_updated: now,
            total_records: 0,
        }
    }

    pub fn load(path: &Path) -> Result<Self, SinkError> {
        let content = std::fs::read_to_string(path).map_err(SinkError::io(path))?;
        serde_json::from_str(&content).map_err(SinkError::json(path))
    }

    /// Write via a sibling temp file and rename.
    fn store(&self, path: &Path) -> Result<(), SinkError> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let json = serde_json::to_string_pretty(self).map_err(SinkError::json(path))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(SinkError::io(path))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.write_all(b"\n"))
            .map_err(SinkError::io(path))?;
        tmp.persist(path).map_err(|e| SinkError::io(path)(e.error))?;
        Ok(())
    }
}

pub struct JsonSink {
    path: PathBuf,
    written: usize,
}

impl JsonSink {
    /// Open `path`, creating an empty document if it does not exist.
    ///
    /// An existing file must parse; it is never silently replaced.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        if path.exists() {
            let existing = MetadataFile::load(path)?;
            tracing::debug!(
                path = %path.display(),
                records = existing.metadata.len(),
                "appending to existing JSON sink"
            );
        } else {
            MetadataFile::empty().store(path)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            written: 0,
        })
    }

    pub fn records(&self) -> Result<Vec<StoredRecord>, SinkError> {
        Ok(MetadataFile::load(&self.path)?.metadata)
    }

    pub fn record_count(&self) -> Result<usize, SinkError> {
        Ok(MetadataFile::load(&self.path)?.total_records)
    }
}

fn clean_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(clean_text(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(clean_value).collect()),
        other => other,
    }
}

impl MetadataSink for JsonSink {
    fn write(&mut self, entry: &SinkEntry<'_>) -> Result<(), SinkError> {
        let mut file = MetadataFile::load(&self.path)?;

        let metadata = entry
            .record
            .iter()
            .map(|(name, value)| (name.to_string(), clean_value(value.to_json())))
            .collect();
        let format = if entry.original_format.is_empty() {
            default_format()
        } else {
            entry.original_format.to_ascii_lowercase()
        };
        file.metadata.push(StoredRecord {
            asset_id: entry.asset_id(),
            file_path: entry.source.display().to_string(),
            original_format: format,
            extracted_at: timestamp(),
            metadata,
        });
        file.last_updated = timestamp();
        file.total_records = file.metadata.len();
        file.store(&self.path)?;

        self.written += 1;
        tracing::debug!(
            path = %self.path.display(),
            asset = %entry.asset_id(),
            total = file.total_records,
            "JSON record written"
        );
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn written(&self) -> usize {
        self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archivist_core::{FieldValue, MetadataRecord};

    fn record() -> MetadataRecord {
        let mut r = MetadataRecord::new();
        r.set("Title", FieldValue::Single("Vital \u{2014} Issue 82".into()));
        r.set(
            "Creator",
            FieldValue::Multi(vec!["ICAEW".into(), "Caf\u{e9} Society".into()]),
        );
        r
    }

    fn write(sink: &mut JsonSink, source: &str, format: &str, record: &MetadataRecord) {
        sink.write(&SinkEntry {
            source: Path::new(source),
            original_format: format,
            record,
        })
        .unwrap();
    }

    #[test]
    fn new_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let sink = JsonSink::open(&path).unwrap();
        assert_eq!(sink.record_count().unwrap(), 0);
        let file = MetadataFile::load(&path).unwrap();
        assert!(!file.created_at.is_empty());
        assert_eq!(file.created_at, file.last_updated);
    }

    #[test]
    fn every_write_appends_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut sink = JsonSink::open(&path).unwrap();
        let r = record();
        write(&mut sink, "/in/a.pdf", "pdf", &r);
        write(&mut sink, "/in/b.pdf", "DOCX", &r);
        write(&mut sink, "/in/c.pdf", "", &r);

        assert_eq!(sink.written(), 3);
        assert_eq!(sink.record_count().unwrap(), 3);
        let records = sink.records().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].asset_id, "a.pdf");
        assert_eq!(records[0].file_path, "/in/a.pdf");
        assert_eq!(records[1].original_format, "docx");
        assert_eq!(records[2].original_format, "pdf");
    }

    #[test]
    fn values_are_cleaned_and_keep_their_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut sink = JsonSink::open(&path).unwrap();
        write(&mut sink, "a.pdf", "pdf", &record());

        let stored = &sink.records().unwrap()[0];
        assert_eq!(stored.metadata["Title"], "Vital : Issue 82");
        assert_eq!(
            stored.metadata["Creator"],
            serde_json::json!(["ICAEW", "Caf Society"])
        );
        let keys: Vec<_> = stored.metadata.keys().collect();
        assert_eq!(keys, ["Title", "Creator"]);
    }

    #[test]
    fn reopening_keeps_existing_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        {
            let mut sink = JsonSink::open(&path).unwrap();
            write(&mut sink, "a.pdf", "pdf", &record());
        }
        let created = MetadataFile::load(&path).unwrap().created_at;
        let mut sink = JsonSink::open(&path).unwrap();
        write(&mut sink, "b.pdf", "pdf", &record());

        let file = MetadataFile::load(&path).unwrap();
        assert_eq!(file.total_records, 2);
        assert_eq!(file.created_at, created);
        assert_eq!(sink.written(), 1);
    }

    #[test]
    fn corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            JsonSink::open(&path),
            Err(SinkError::Json { .. })
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }
}
