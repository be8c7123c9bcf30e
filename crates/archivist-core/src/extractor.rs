use std::sync::Arc;

use serde_json::Value;

use crate::fields::FieldContext;
use crate::prompt::build_prompt;
use crate::reconcile::{DocumentFacts, Reconciled, parse_reply, reconcile};
use crate::schema::{ResponseSchema, build_schema};
use crate::service::{ExtractionRequest, ExtractionService, PdfAttachment};

pub const OCR_MARKER: &str = "\n[OCR Extracted Content]\n";

/// Everything the extractor needs from one prepared document.
#[derive(Debug, Clone, Default)]
pub struct DocumentInput {
    pub text: String,
    pub ocr_text: Option<String>,
    /// Page-windowed PDF, set in file mode.
    pub attachment: Option<PdfAttachment>,
    pub facts: DocumentFacts,
}

impl DocumentInput {
    /// Document text with OCR text appended after the marker.
    pub fn combined_text(&self) -> String {
        let mut combined = self.text.trim().to_string();
        if let Some(ocr) = self.ocr_text.as_deref().map(str::trim)
            && !ocr.is_empty()
        {
            combined.push_str(OCR_MARKER);
            combined.push_str(ocr);
        }
        combined
    }
}

/// What happened to the service call for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Replied,
    /// No call was made (empty schema or nothing to send).
    Skipped(&'static str),
    /// The call failed; the record is empty but complete.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub reconciled: Reconciled,
    pub call: CallOutcome,
}

/// Prompt, schema and service bound together for one run.
pub struct MetadataExtractor {
    service: Arc<dyn ExtractionService>,
    context: Arc<FieldContext>,
    schema: ResponseSchema,
    prompt: String,
}

impl MetadataExtractor {
    pub fn new(service: Arc<dyn ExtractionService>, context: Arc<FieldContext>) -> Self {
        let schema = build_schema(&context);
        let prompt = build_prompt(&context);
        Self {
            service,
            context,
            schema,
            prompt,
        }
    }

    pub fn context(&self) -> &FieldContext {
        &self.context
    }

    /// Ask the service for the raw JSON reply.
    ///
    /// Never fails: service errors are logged and degrade to `{}`.
    pub async fn request(&self, input: &DocumentInput) -> (Value, CallOutcome) {
        let empty = Value::Object(Default::default());
        if self.schema.is_empty() {
            tracing::debug!("no fields requested, skipping service call");
            return (empty, CallOutcome::Skipped("no fields requested"));
        }

        let text = input.combined_text();
        if text.is_empty() && input.attachment.is_none() {
            tracing::info!("document has no text, skipping service call");
            return (empty, CallOutcome::Skipped("document has no text"));
        }

        let request = ExtractionRequest {
            instructions: &self.prompt,
            text: &text,
            attachment: input.attachment.as_ref(),
            schema: &self.schema,
        };

        match self.service.extract(request).await {
            Ok(content) => (parse_reply(&content), CallOutcome::Replied),
            Err(e) => {
                tracing::warn!(service = self.service.name(), error = %e, "extraction call failed");
                (empty, CallOutcome::Failed(e.to_string()))
            }
        }
    }

    /// Request and reconcile in one step.
    pub async fn extract(&self, input: &DocumentInput) -> Extraction {
        let (raw, call) = self.request(input).await;
        let reconciled = reconcile(&raw, &self.context, &input.facts);
        Extraction { reconciled, call }
    }
}
