//! The extraction run: prepare, extract and write every discovered document.
//!
//! Up to `workers` documents are in flight at once, but only this loop
//! touches the sink, so records are written one at a time and in discovery
//! order.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream;
use tokio_util::sync::CancellationToken;

use archivist_core::{
    CallOutcome, DocumentStage, MetadataExtractor, MetadataRecord, ProgressEvent, RunStats,
};
use archivist_ingest::DocumentPreparer;
use archivist_reporting::{MetadataSink, SinkEntry};

/// A document that failed, and where.
#[derive(Debug, Clone)]
pub struct FailedDocument {
    pub path: PathBuf,
    pub stage: DocumentStage,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub stats: RunStats,
    pub failures: Vec<FailedDocument>,
    /// Ctrl+C stopped the run before every document was handled.
    pub cancelled: bool,
}

/// A document that made it through extraction and awaits writing.
struct Extracted {
    path: PathBuf,
    original_format: String,
    record: MetadataRecord,
    warnings: usize,
    service_failed: bool,
}

enum Outcome {
    Extracted(Extracted),
    Failed(FailedDocument),
    Cancelled,
}

pub struct Pipeline {
    preparer: Arc<DocumentPreparer>,
    extractor: Arc<MetadataExtractor>,
    workers: usize,
}

impl Pipeline {
    pub fn new(
        preparer: Arc<DocumentPreparer>,
        extractor: Arc<MetadataExtractor>,
        workers: usize,
    ) -> Self {
        Self {
            preparer,
            extractor,
            workers: workers.max(1),
        }
    }

    pub async fn run(
        &self,
        files: Vec<PathBuf>,
        sink: &mut dyn MetadataSink,
        progress: &(dyn Fn(ProgressEvent) + Sync),
        cancel: CancellationToken,
    ) -> RunReport {
        let total = files.len();
        let mut report = RunReport {
            stats: RunStats {
                found: total,
                ..Default::default()
            },
            ..Default::default()
        };
        progress(ProgressEvent::Started { total });

        let mut outcomes = stream::iter(files.into_iter().enumerate())
            .map(|(index, path)| {
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return (index, Outcome::Cancelled);
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => (index, Outcome::Cancelled),
                        outcome = self.process(index, total, path, progress) => (index, outcome),
                    }
                }
            })
            .buffered(self.workers);

        while let Some((index, outcome)) = outcomes.next().await {
            match outcome {
                Outcome::Cancelled => report.cancelled = true,
                Outcome::Failed(failed) => {
                    report.stats.failed += 1;
                    report.failures.push(failed);
                }
                Outcome::Extracted(doc) => {
                    report.stats.warnings += doc.warnings;
                    if doc.service_failed {
                        report.stats.service_failures += 1;
                    }
                    let entry = SinkEntry {
                        source: &doc.path,
                        original_format: &doc.original_format,
                        record: &doc.record,
                    };
                    match sink.write(&entry) {
                        Ok(()) => {
                            report.stats.written += 1;
                            progress(ProgressEvent::Stage {
                                index,
                                total,
                                path: doc.path.clone(),
                                stage: DocumentStage::Written,
                            });
                        }
                        Err(e) => {
                            tracing::error!(path = %doc.path.display(), error = %e, "failed to write record");
                            let failed = FailedDocument {
                                path: doc.path,
                                stage: DocumentStage::ExtractionFailed,
                                error: e.to_string(),
                            };
                            report_failure(progress, index, total, &failed);
                            report.stats.failed += 1;
                            report.failures.push(failed);
                        }
                    }
                }
            }
        }

        tracing::info!(
            found = report.stats.found,
            written = report.stats.written,
            failed = report.stats.failed,
            cancelled = report.cancelled,
            "run finished"
        );
        report
    }

    async fn process(
        &self,
        index: usize,
        total: usize,
        path: PathBuf,
        progress: &(dyn Fn(ProgressEvent) + Sync),
    ) -> Outcome {
        let stage = |stage| {
            progress(ProgressEvent::Stage {
                index,
                total,
                path: path.clone(),
                stage,
            })
        };
        stage(DocumentStage::Discovered);

        let prepared = match self.preparer.prepare(&path).await {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "document skipped");
                let failed = FailedDocument {
                    path: path.clone(),
                    stage: e.stage(),
                    error: e.to_string(),
                };
                report_failure(progress, index, total, &failed);
                return Outcome::Failed(failed);
            }
        };
        if prepared.converted {
            stage(DocumentStage::Converted);
        }
        if let Some((kept, pages)) = prepared.pages_kept {
            tracing::debug!(path = %path.display(), kept, pages, "page window applied");
        }
        stage(DocumentStage::TextExtracted);

        stage(DocumentStage::PromptSent);
        let extraction = self.extractor.extract(&prepared.input).await;
        let service_failed = match &extraction.call {
            CallOutcome::Replied => {
                stage(DocumentStage::ResponseReceived);
                false
            }
            CallOutcome::Skipped(reason) => {
                tracing::info!(path = %path.display(), reason, "service call skipped");
                false
            }
            CallOutcome::Failed(error) => {
                progress(ProgressEvent::Warning {
                    index,
                    total,
                    path: path.clone(),
                    message: format!("service call failed, writing an empty record: {error}"),
                });
                true
            }
        };
        stage(DocumentStage::Reconciled);

        let warnings = extraction.reconciled.warnings;
        for warning in &warnings {
            tracing::warn!(path = %path.display(), %warning, "validation warning");
            progress(ProgressEvent::Warning {
                index,
                total,
                path: path.clone(),
                message: warning.to_string(),
            });
        }

        Outcome::Extracted(Extracted {
            path: prepared.source,
            original_format: prepared.original_format,
            record: extraction.reconciled.record,
            warnings: warnings.len(),
            service_failed,
        })
    }
}

fn report_failure(
    progress: &(dyn Fn(ProgressEvent) + Sync),
    index: usize,
    total: usize,
    failed: &FailedDocument,
) {
    progress(ProgressEvent::Failed {
        index,
        total,
        path: failed.path.clone(),
        stage: failed.stage,
        error: failed.error.clone(),
    });
}
