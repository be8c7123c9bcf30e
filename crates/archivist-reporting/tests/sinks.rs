//! Sink behaviour over many writes, driven through [`open_sink`] with the
//! built-in field context and fully reconciled records.

use std::path::Path;

use archivist_core::reconcile::reconcile;
use archivist_core::{DocumentFacts, FieldContext, MetadataRecord};
use archivist_reporting::{
    MetadataFile, SinkEntry, SinkTarget, json_to_csv, open_sink, summarize,
};

fn record(context: &FieldContext, title: &str, creators: &[&str]) -> MetadataRecord {
    let raw = serde_json::json!({
        "Title": title,
        "Creator": creators,
        "Date": "10/7/2009",
    });
    reconcile(&raw, context, &DocumentFacts::default()).record
}

fn write_all(target: &SinkTarget, context: &FieldContext, count: usize) {
    let mut sink = open_sink(target, context).unwrap();
    for i in 0..count {
        let rec = record(context, &format!("Report {i}"), &["ICAEW"]);
        let source = format!("/archive/report-{i}.pdf");
        sink.write(&SinkEntry {
            source: Path::new(&source),
            original_format: "pdf",
            record: &rec,
        })
        .unwrap();
    }
    assert_eq!(sink.written(), count);
}

#[test]
fn csv_has_one_header_and_one_line_per_document() {
    let dir = tempfile::tempdir().unwrap();
    let context = FieldContext::builtin().unwrap();
    let target = SinkTarget::Csv(dir.path().join("out.csv"));

    write_all(&target, &context, 7);

    let content = std::fs::read_to_string(target.path()).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), 8);
    assert!(lines[0].starts_with("assetId,entity.title,"));
    assert!(lines[0].contains("dc:title"));
    assert!(lines[1].starts_with("report-0.pdf,Report 0,"));
    assert!(lines[1].contains("2009-10-07"));
    assert_eq!(content.matches("assetId").count(), 1);
}

#[test]
fn json_counts_match_writes() {
    let dir = tempfile::tempdir().unwrap();
    let context = FieldContext::builtin().unwrap();
    let target = SinkTarget::Json(dir.path().join("out.json"));

    write_all(&target, &context, 5);

    let file = MetadataFile::load(target.path()).unwrap();
    assert_eq!(file.total_records, 5);
    assert_eq!(file.metadata.len(), 5);
    let first = &file.metadata[0];
    assert_eq!(first.asset_id, "report-0.pdf");
    assert_eq!(first.metadata.len(), context.len());
    assert_eq!(first.metadata["entity.title"], first.metadata["Title"]);
}

#[test]
fn json_sink_exports_to_csv() {
    let dir = tempfile::tempdir().unwrap();
    let context = FieldContext::builtin().unwrap();
    let json = SinkTarget::Json(dir.path().join("out.json"));
    write_all(&json, &context, 3);

    let csv_path = dir.path().join("export.csv");
    let export = json_to_csv(json.path(), &csv_path, &context, None).unwrap();
    assert_eq!(export.rows, 3);
    assert_eq!(export.columns[0], "assetId");

    let content = std::fs::read_to_string(&csv_path).unwrap();
    assert_eq!(content.lines().count(), 4);

    let summary = summarize(json.path()).unwrap();
    assert_eq!(summary.total_records, 3);
    assert_eq!(summary.format_counts.get("pdf"), Some(&3));
}
