//! Extraction service trait and implementations.

pub mod mock;
pub mod openai;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::schema::ResponseSchema;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// Server returned 429.
    #[error("rate limited by service")]
    RateLimited,
    #[error("service refused the request: {0}")]
    Refused(String),
    #[error("service reply had no content")]
    EmptyReply,
    #[error("{0}")]
    Other(String),
}

/// A PDF sent to the service as an inline file part.
#[derive(Debug, Clone)]
pub struct PdfAttachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// One extraction call.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRequest<'a> {
    /// Rendered field instructions (system message).
    pub instructions: &'a str,
    /// Document text, with any OCR text already appended.
    pub text: &'a str,
    /// Present in file mode.
    pub attachment: Option<&'a PdfAttachment>,
    pub schema: &'a ResponseSchema,
}

/// An understanding service that turns a document into a JSON reply.
pub trait ExtractionService: Send + Sync {
    /// Short name for logs (e.g., "openai").
    fn name(&self) -> &str;

    /// Run one extraction and return the raw reply text.
    fn extract<'a>(
        &'a self,
        request: ExtractionRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<String, ServiceError>> + Send + 'a>>;
}
