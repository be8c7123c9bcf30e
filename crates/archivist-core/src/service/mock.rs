//! Mock extraction service for testing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{ExtractionRequest, ExtractionService, ServiceError};

/// A configurable mock reply for [`MockService`].
#[derive(Clone, Debug)]
pub enum MockReply {
    /// Reply with this content.
    Content(String),
    /// Simulate a 429 rate-limit response.
    RateLimited,
    /// Simulate a transport or server error.
    Error(String),
}

/// A hand-rolled mock implementing [`ExtractionService`] for tests.
///
/// Supports:
/// - A fixed reply (used for every call), **or**
/// - A sequence of replies (one per call, repeating the last when exhausted).
/// - Optional per-call latency.
/// - Call counting and capture of every request text.
pub struct MockService {
    replies: Mutex<Vec<MockReply>>,
    fallback: MockReply,
    delay: Option<Duration>,
    call_count: AtomicUsize,
    texts: Mutex<Vec<String>>,
    last_had_attachment: Mutex<bool>,
}

impl MockService {
    /// Create a mock that always returns `reply`.
    pub fn new(reply: MockReply) -> Self {
        Self {
            replies: Mutex::new(Vec::new()),
            fallback: reply,
            delay: None,
            call_count: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
            last_had_attachment: Mutex::new(false),
        }
    }

    /// Shorthand for a mock that always replies with `content`.
    pub fn replying(content: impl Into<String>) -> Self {
        Self::new(MockReply::Content(content.into()))
    }

    /// Create a mock that returns replies in order, repeating the last one.
    pub fn with_sequence(mut replies: Vec<MockReply>) -> Self {
        let fallback = replies
            .last()
            .cloned()
            .unwrap_or(MockReply::Content("{}".to_string()));
        // Reverse so pop() yields them in order.
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            ..Self::new(fallback)
        }
    }

    /// Set simulated latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times `extract()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Text of the most recent request.
    pub fn last_text(&self) -> Option<String> {
        self.texts.lock().ok().and_then(|t| t.last().cloned())
    }

    /// Texts of every request, in call order.
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn last_had_attachment(&self) -> bool {
        self.last_had_attachment.lock().map(|b| *b).unwrap_or(false)
    }

    fn next_reply(&self) -> MockReply {
        match self.replies.lock() {
            Ok(mut seq) => seq.pop().unwrap_or_else(|| self.fallback.clone()),
            Err(_) => self.fallback.clone(),
        }
    }
}

impl ExtractionService for MockService {
    fn name(&self) -> &str {
        "mock"
    }

    fn extract<'a>(
        &'a self,
        request: ExtractionRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<String, ServiceError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut texts) = self.texts.lock() {
            texts.push(request.text.to_string());
        }
        if let Ok(mut flag) = self.last_had_attachment.lock() {
            *flag = request.attachment.is_some();
        }
        let reply = self.next_reply();
        let delay = self.delay;

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            match reply {
                MockReply::Content(content) => Ok(content),
                MockReply::RateLimited => Err(ServiceError::RateLimited),
                MockReply::Error(msg) => Err(ServiceError::Other(msg)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldContext;
    use crate::schema::build_schema;

    #[tokio::test]
    async fn sequence_repeats_last_reply() {
        let schema = build_schema(&FieldContext::builtin().unwrap());
        let mock = MockService::with_sequence(vec![
            MockReply::Content("first".into()),
            MockReply::RateLimited,
        ]);
        let request = ExtractionRequest {
            instructions: "",
            text: "doc",
            attachment: None,
            schema: &schema,
        };
        assert_eq!(mock.extract(request).await.unwrap(), "first");
        assert!(matches!(
            mock.extract(request).await,
            Err(ServiceError::RateLimited)
        ));
        assert!(matches!(
            mock.extract(request).await,
            Err(ServiceError::RateLimited)
        ));
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.last_text().as_deref(), Some("doc"));
    }
}
