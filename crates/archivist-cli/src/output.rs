use std::io::Write;
use std::path::Path;

use archivist_core::{DocumentStage, ProgressEvent};
use archivist_ingest::DirectoryConversion;
use archivist_reporting::{CsvExport, JsonSummary};
use owo_colors::OwoColorize;

use crate::run::RunReport;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Print a real-time progress event.
///
/// Only the stages a user cares about are shown; the rest go to the log.
pub fn print_progress(
    w: &mut dyn Write,
    event: &ProgressEvent,
    color: ColorMode,
) -> std::io::Result<()> {
    match event {
        ProgressEvent::Started { total } => {
            writeln!(w, "Starting to process {} file(s)", total)?;
        }
        ProgressEvent::Stage {
            index,
            total,
            path,
            stage,
        } => {
            let idx = index + 1;
            match stage {
                DocumentStage::Discovered => {
                    writeln!(w, "[{}/{}] Processing: {}", idx, total, path.display())?;
                }
                DocumentStage::Converted => {
                    if color.enabled() {
                        writeln!(w, "[{}/{}] -> {}", idx, total, "converted to PDF".dimmed())?;
                    } else {
                        writeln!(w, "[{}/{}] -> converted to PDF", idx, total)?;
                    }
                }
                DocumentStage::Written => {
                    if color.enabled() {
                        writeln!(
                            w,
                            "[{}/{}] -> {} ({})",
                            idx,
                            total,
                            "WRITTEN".green(),
                            file_name(path)
                        )?;
                    } else {
                        writeln!(w, "[{}/{}] -> WRITTEN ({})", idx, total, file_name(path))?;
                    }
                }
                _ => {}
            }
        }
        ProgressEvent::Warning {
            index,
            total,
            message,
            ..
        } => {
            if color.enabled() {
                writeln!(w, "[{}/{}] {} {}", index + 1, total, "WARNING:".yellow(), message)?;
            } else {
                writeln!(w, "[{}/{}] WARNING: {}", index + 1, total, message)?;
            }
        }
        ProgressEvent::Failed {
            index,
            total,
            path,
            stage,
            error,
        } => {
            let label = stage.label().to_uppercase();
            if color.enabled() {
                writeln!(
                    w,
                    "[{}/{}] -> {} {}: {}",
                    index + 1,
                    total,
                    label.red(),
                    file_name(path),
                    error
                )?;
            } else {
                writeln!(w, "[{}/{}] -> {} {}: {}", index + 1, total, label, file_name(path), error)?;
            }
        }
    }
    Ok(())
}

fn print_heading(w: &mut dyn Write, title: &str, color: ColorMode) -> std::io::Result<()> {
    writeln!(w)?;
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", title.bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "{}", title)?;
        writeln!(w, "{}", sep)?;
    }
    Ok(())
}

/// Totals for a run, then every failed file with its error.
pub fn print_run_summary(
    w: &mut dyn Write,
    report: &RunReport,
    sink_path: &Path,
    color: ColorMode,
) -> std::io::Result<()> {
    let stats = &report.stats;
    print_heading(w, "SUMMARY", color)?;
    writeln!(w, "  Total files found: {}", stats.found)?;
    if color.enabled() {
        writeln!(w, "  Successfully processed: {}", stats.written.to_string().green())?;
        if stats.failed > 0 {
            writeln!(w, "  Failed to process: {}", stats.failed.to_string().red())?;
        } else {
            writeln!(w, "  Failed to process: {}", stats.failed)?;
        }
    } else {
        writeln!(w, "  Successfully processed: {}", stats.written)?;
        writeln!(w, "  Failed to process: {}", stats.failed)?;
    }
    if stats.service_failures > 0 {
        writeln!(w, "  Empty records after service errors: {}", stats.service_failures)?;
    }
    if stats.warnings > 0 {
        writeln!(w, "  Validation warnings: {}", stats.warnings)?;
    }
    writeln!(w, "  Metadata written to: {}", sink_path.display())?;

    if report.cancelled {
        let msg = "Run cancelled before all files were processed";
        if color.enabled() {
            writeln!(w, "  {}", msg.yellow())?;
        } else {
            writeln!(w, "  {}", msg)?;
        }
    }

    if !report.failures.is_empty() {
        writeln!(w)?;
        writeln!(w, "Failed files:")?;
        for failed in &report.failures {
            writeln!(
                w,
                "  - {} ({}): {}",
                file_name(&failed.path),
                failed.stage.label(),
                failed.error
            )?;
        }
    }
    Ok(())
}

pub fn print_conversion_summary(
    w: &mut dyn Write,
    dir: &Path,
    result: &DirectoryConversion,
    color: ColorMode,
) -> std::io::Result<()> {
    print_heading(w, "CONVERSION SUMMARY", color)?;
    writeln!(w, "  Directory: {}", dir.display())?;
    writeln!(w, "  Converted: {}", result.converted)?;
    writeln!(w, "  PDFs available: {}", result.pdfs.len())?;
    if let Some(mapping) = &result.mapping_file {
        writeln!(w, "  Format mapping: {}", mapping.display())?;
    }
    if !result.failures.is_empty() {
        if color.enabled() {
            writeln!(w, "  Failed: {}", result.failures.len().to_string().red())?;
        } else {
            writeln!(w, "  Failed: {}", result.failures.len())?;
        }
        for (path, error) in &result.failures {
            writeln!(w, "    - {}: {}", file_name(path), error)?;
        }
    }
    Ok(())
}

pub fn print_json_summary(
    w: &mut dyn Write,
    path: &Path,
    summary: &JsonSummary,
    color: ColorMode,
) -> std::io::Result<()> {
    print_heading(w, &format!("JSON SUMMARY: {}", file_name(path)), color)?;
    writeln!(w, "  Total records: {}", summary.total_records)?;
    writeln!(w, "  Created at: {}", or_unknown(&summary.created_at))?;
    writeln!(w, "  Last updated: {}", or_unknown(&summary.last_updated))?;
    writeln!(w, "  File size: {} bytes", summary.file_size)?;
    if !summary.format_counts.is_empty() {
        writeln!(w, "  Format distribution:")?;
        for (format, count) in &summary.format_counts {
            writeln!(w, "    {}: {}", format, count)?;
        }
    }
    Ok(())
}

fn or_unknown(s: &str) -> &str {
    if s.is_empty() { "Unknown" } else { s }
}

pub fn print_export(
    w: &mut dyn Write,
    csv_path: &Path,
    export: &CsvExport,
    color: ColorMode,
) -> std::io::Result<()> {
    if export.rows == 0 {
        writeln!(w, "No metadata records to convert")?;
        return Ok(());
    }
    let msg = format!(
        "Wrote {} rows with {} columns to {}",
        export.rows,
        export.columns.len(),
        csv_path.display()
    );
    if color.enabled() {
        writeln!(w, "{}", msg.green())?;
    } else {
        writeln!(w, "{}", msg)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use archivist_core::RunStats;

    use crate::run::FailedDocument;

    fn render(f: impl FnOnce(&mut dyn Write) -> std::io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn progress_lines_are_numbered_from_one() {
        let out = render(|w| {
            print_progress(
                w,
                &ProgressEvent::Stage {
                    index: 0,
                    total: 3,
                    path: PathBuf::from("/in/a.pdf"),
                    stage: DocumentStage::Discovered,
                },
                ColorMode(false),
            )
        });
        assert_eq!(out, "[1/3] Processing: /in/a.pdf\n");
    }

    #[test]
    fn quiet_stages_print_nothing() {
        let out = render(|w| {
            print_progress(
                w,
                &ProgressEvent::Stage {
                    index: 0,
                    total: 1,
                    path: PathBuf::from("a.pdf"),
                    stage: DocumentStage::PromptSent,
                },
                ColorMode(false),
            )
        });
        assert!(out.is_empty());
    }

    #[test]
    fn failure_names_the_stage() {
        let out = render(|w| {
            print_progress(
                w,
                &ProgressEvent::Failed {
                    index: 1,
                    total: 2,
                    path: PathBuf::from("/in/b.docx"),
                    stage: DocumentStage::ConversionFailed,
                    error: "all converters failed".into(),
                },
                ColorMode(false),
            )
        });
        assert_eq!(out, "[2/2] -> CONVERSION FAILED b.docx: all converters failed\n");
    }

    #[test]
    fn summary_lists_failed_files() {
        let report = RunReport {
            stats: RunStats {
                found: 3,
                written: 2,
                failed: 1,
                ..Default::default()
            },
            failures: vec![FailedDocument {
                path: PathBuf::from("/in/c.pdf"),
                stage: DocumentStage::ExtractionFailed,
                error: "damaged xref".into(),
            }],
            cancelled: false,
        };
        let out = render(|w| print_run_summary(w, &report, Path::new("out.csv"), ColorMode(false)));
        assert!(out.contains("Total files found: 3"));
        assert!(out.contains("Successfully processed: 2"));
        assert!(out.contains("Metadata written to: out.csv"));
        assert!(out.contains("  - c.pdf (extraction failed): damaged xref"));
        assert!(!out.contains("Validation warnings"));
    }
}
