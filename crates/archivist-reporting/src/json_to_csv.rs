//! Export a JSON sink to CSV with one column per list entry.
//!
//! A multi-valued field whose longest list has `n` entries gets `n` columns,
//! all carrying the same header.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use archivist_core::FieldContext;
use archivist_core::fields::{Derived, FieldDescriptor};

use crate::SinkError;
use crate::csv::{ASSET_ID_COLUMN, encode_row};
use crate::json::{MetadataFile, StoredRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    pub rows: usize,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsonSummary {
    pub total_records: usize,
    pub created_at: String,
    pub last_updated: String,
    pub format_counts: BTreeMap<String, usize>,
    pub file_size: u64,
}

/// Convert the JSON sink at `json_path` to `csv_path`.
///
/// `format_override` replaces every record's original format in the
/// derived-format columns. Nothing is written when there are no records.
pub fn json_to_csv(
    json_path: &Path,
    csv_path: &Path,
    context: &FieldContext,
    format_override: Option<&str>,
) -> Result<CsvExport, SinkError> {
    let file = MetadataFile::load(json_path)?;
    if file.metadata.is_empty() {
        tracing::info!(path = %json_path.display(), "no metadata records to convert");
        return Ok(CsvExport {
            rows: 0,
            columns: Vec::new(),
        });
    }

    let widths: Vec<usize> = context
        .fields()
        .iter()
        .map(|field| column_width(field, context, &file.metadata))
        .collect();

    let mut columns = vec![ASSET_ID_COLUMN.to_string()];
    for (field, width) in context.fields().iter().zip(&widths) {
        columns.extend(std::iter::repeat_n(field.column.clone(), *width));
    }

    let mut out = std::fs::File::create(csv_path).map_err(SinkError::io(csv_path))?;
    writeln!(out, "{}", encode_row(&columns)).map_err(SinkError::io(csv_path))?;

    for record in &file.metadata {
        let mut row = vec![record.asset_id.clone()];
        for (field, width) in context.fields().iter().zip(&widths) {
            for index in 0..*width {
                row.push(cell(field, index, record, context, format_override));
            }
        }
        writeln!(out, "{}", encode_row(&row)).map_err(SinkError::io(csv_path))?;
    }

    tracing::info!(
        path = %csv_path.display(),
        rows = file.metadata.len(),
        columns = columns.len(),
        "converted JSON to CSV"
    );
    Ok(CsvExport {
        rows: file.metadata.len(),
        columns,
    })
}

/// Record count, timestamps, format distribution and size of a JSON sink.
pub fn summarize(json_path: &Path) -> Result<JsonSummary, SinkError> {
    let file = MetadataFile::load(json_path)?;
    let file_size = std::fs::metadata(json_path)
        .map_err(SinkError::io(json_path))?
        .len();

    let mut format_counts = BTreeMap::new();
    for record in &file.metadata {
        *format_counts
            .entry(record.original_format.clone())
            .or_insert(0) += 1;
    }

    Ok(JsonSummary {
        total_records: file.metadata.len(),
        created_at: file.created_at,
        last_updated: file.last_updated,
        format_counts,
        file_size,
    })
}

/// Stored value of a field, looked up by name and then by column alias.
fn stored_value<'a>(metadata: &'a Map<String, Value>, field: &FieldDescriptor) -> Option<&'a Value> {
    metadata
        .get(&field.name)
        .or_else(|| metadata.get(&field.column))
}

/// Field whose values fill this field's columns (mirrors read their canonical field).
fn source_field<'a>(field: &'a FieldDescriptor, context: &'a FieldContext) -> &'a FieldDescriptor {
    field
        .mirror_of
        .as_deref()
        .and_then(|name| context.get(name))
        .unwrap_or(field)
}

fn column_width(field: &FieldDescriptor, context: &FieldContext, records: &[StoredRecord]) -> usize {
    if field.derived.is_some() {
        return 1;
    }
    let source = source_field(field, context);
    records
        .iter()
        .filter_map(|r| match stored_value(&r.metadata, source) {
            Some(Value::Array(items)) => Some(items.len()),
            _ => None,
        })
        .max()
        .unwrap_or(1)
        .max(1)
}

fn cell(
    field: &FieldDescriptor,
    index: usize,
    record: &StoredRecord,
    context: &FieldContext,
    format_override: Option<&str>,
) -> String {
    if matches!(field.derived, Some(Derived::OriginalFormat)) {
        return format_override
            .unwrap_or(&record.original_format)
            .to_ascii_lowercase();
    }
    let source = source_field(field, context);
    match stored_value(&record.metadata, source) {
        Some(Value::Array(items)) => items.get(index).map(scalar).unwrap_or_default(),
        Some(value) if index == 0 => scalar(value),
        _ => String::new(),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
