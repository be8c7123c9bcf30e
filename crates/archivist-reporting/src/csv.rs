//! Append-only CSV sink: one header, one row per document.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use archivist_core::FieldContext;

use crate::clean::clean_text;
use crate::{MetadataSink, SinkEntry, SinkError};

pub const ASSET_ID_COLUMN: &str = "assetId";
/// Separator for multi-valued fields inside one cell.
pub const MULTI_SEPARATOR: &str = "; ";

/// What fills a column.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Cell {
    AssetId,
    Field(String),
    /// Header column no field maps to.
    Unknown,
}

pub struct CsvSink {
    path: PathBuf,
    columns: Vec<String>,
    cells: Vec<Cell>,
    written: usize,
}

impl CsvSink {
    /// Open `path`, writing the header if the file is missing or empty.
    ///
    /// An existing header is kept as-is; columns it lacks are never written.
    pub fn open(path: &Path, context: &FieldContext) -> Result<Self, SinkError> {
        let existing = read_header(path)?;
        let columns = match existing {
            Some(header) => {
                tracing::debug!(path = %path.display(), columns = header.len(), "reusing CSV header");
                header
            }
            None => {
                let columns = header_for(context);
                let mut file = std::fs::File::create(path).map_err(SinkError::io(path))?;
                writeln!(file, "{}", encode_row(&columns)).map_err(SinkError::io(path))?;
                columns
            }
        };

        let cells = columns
            .iter()
            .map(|column| {
                if column == ASSET_ID_COLUMN {
                    return Cell::AssetId;
                }
                match context.resolve(column) {
                    Some(field) => Cell::Field(field.name.clone()),
                    None => {
                        tracing::warn!(column = %column, "CSV column matches no field, it will stay empty");
                        Cell::Unknown
                    }
                }
            })
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            columns,
            cells,
            written: 0,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn row_for(&self, entry: &SinkEntry<'_>) -> Vec<String> {
        self.cells
            .iter()
            .map(|cell| match cell {
                Cell::AssetId => entry.asset_id(),
                Cell::Field(name) => entry
                    .record
                    .get(name)
                    .map(|v| clean_text(&v.joined(MULTI_SEPARATOR)))
                    .unwrap_or_default(),
                Cell::Unknown => String::new(),
            })
            .collect()
    }
}

impl MetadataSink for CsvSink {
    fn write(&mut self, entry: &SinkEntry<'_>) -> Result<(), SinkError> {
        let row = self.row_for(entry);
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(SinkError::io(&self.path))?;
        writeln!(file, "{}", encode_row(&row)).map_err(SinkError::io(&self.path))?;
        self.written += 1;
        tracing::debug!(path = %self.path.display(), asset = %entry.asset_id(), "CSV row written");
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn written(&self) -> usize {
        self.written
    }
}

/// `assetId` followed by every field's column alias in context order.
pub fn header_for(context: &FieldContext) -> Vec<String> {
    std::iter::once(ASSET_ID_COLUMN.to_string())
        .chain(context.columns().map(str::to_string))
        .collect()
}

/// First line of an existing, non-empty file.
fn read_header(path: &Path) -> Result<Option<Vec<String>>, SinkError> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SinkError::io(path)(e)),
    };
    let mut first = String::new();
    BufReader::new(file)
        .read_line(&mut first)
        .map_err(SinkError::io(path))?;
    let first = first.trim_end_matches(['\r', '\n']);
    if first.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(split_row(first)))
}

pub(crate) fn csv_escape(s: &str) -> String {
    if s.contains('"') || s.contains(',') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub(crate) fn encode_row<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|v| csv_escape(v.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Split one CSV line, honouring quoted cells.
fn split_row(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            ('"', _) => in_quotes = !in_quotes,
            (',', false) => cells.push(std::mem::take(&mut cell)),
            _ => cell.push(c),
        }
    }
    cells.push(cell);
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use archivist_core::{FieldValue, MetadataRecord};

    fn context() -> FieldContext {
        FieldContext::from_json_str(
            r#"{
                "entity.title": {"definition": "t", "type": "string", "mirror_of": "Title", "included": false},
                "Title": {"definition": "t", "type": "string", "column": "dc:title"},
                "Creator": {"definition": "c", "type": "array", "items": {"type": "string"}, "column": "dc:creator"}
            }"#,
        )
        .unwrap()
    }

    fn record(title: &str, creators: &[&str]) -> MetadataRecord {
        let mut r = MetadataRecord::new();
        r.set("entity.title", FieldValue::Single(title.into()));
        r.set("Title", FieldValue::Single(title.into()));
        r.set(
            "Creator",
            FieldValue::Multi(creators.iter().map(|s| s.to_string()).collect()),
        );
        r
    }

    fn write(sink: &mut CsvSink, source: &str, record: &MetadataRecord) {
        sink.write(&SinkEntry {
            source: Path::new(source),
            original_format: "pdf",
            record,
        })
        .unwrap();
    }

    #[test]
    fn header_once_then_one_row_per_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::open(&path, &context()).unwrap();
        for i in 0..3 {
            write(&mut sink, &format!("/in/doc{i}.pdf"), &record("T", &["A"]));
        }
        assert_eq!(sink.written(), 3);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "assetId,entity.title,dc:title,dc:creator");
        assert_eq!(lines[1], "doc0.pdf,T,T,A");
    }

    #[test]
    fn multi_values_are_joined_and_cells_escaped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::open(&path, &context()).unwrap();
        write(
            &mut sink,
            "a.pdf",
            &record("Audit, \u{201C}reformed\u{201D}", &["ICAEW", "FRC"]),
        );

        let content = std::fs::read_to_string(&path).unwrap();
        let row = content.lines().nth(1).unwrap();
        assert_eq!(
            row,
            r#"a.pdf,"Audit, ""reformed""","Audit, ""reformed""",ICAEW; FRC"#
        );
    }

    #[test]
    fn reopening_appends_without_new_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        {
            let mut sink = CsvSink::open(&path, &context()).unwrap();
            write(&mut sink, "a.pdf", &record("A", &[]));
        }
        let mut sink = CsvSink::open(&path, &context()).unwrap();
        write(&mut sink, "b.pdf", &record("B", &[]));

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert_eq!(content.matches("assetId").count(), 1);
    }

    #[test]
    fn existing_header_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.csv");
        std::fs::write(&path, "assetId,dc:title,legacy:col\n").unwrap();

        let mut sink = CsvSink::open(&path, &context()).unwrap();
        assert_eq!(sink.columns(), ["assetId", "dc:title", "legacy:col"]);
        write(&mut sink, "c.pdf", &record("Kept", &["Dropped"]));

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().nth(1).unwrap(), "c.pdf,Kept,");
    }

    #[test]
    fn empty_file_gets_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "").unwrap();
        CsvSink::open(&path, &context()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "assetId,entity.title,dc:title,dc:creator\n");
    }

    #[test]
    fn carriage_returns_are_quoted() {
        assert_eq!(csv_escape("line one\rline two"), "\"line one\rline two\"");
        assert_eq!(encode_row(&["a", "b\r"]), "a,\"b\r\"");
        assert_eq!(csv_escape("plain"), "plain");
    }

    #[test]
    fn split_row_handles_quotes() {
        assert_eq!(
            split_row(r#"a,"b,c","d""e",f"#),
            vec!["a", "b,c", "d\"e", "f"]
        );
    }
}
