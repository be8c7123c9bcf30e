use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use super::{ExtractionRequest, ExtractionService, ServiceError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4.1";

const FILE_MODE_PROMPT: &str = "Analyse the attached document and extract its metadata \
     according to the field instructions. Return the metadata in the specified format.";

/// Chat-completions client constrained to a JSON schema.
pub struct OpenAiService {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiService {
    pub fn new(api_key: String, model: String, base_url: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, request: &ExtractionRequest<'_>) -> Value {
        let user_content = match request.attachment {
            Some(pdf) => {
                let mut parts = vec![json!({
                    "type": "file",
                    "file": {
                        "filename": pdf.file_name,
                        "file_data": format!("data:application/pdf;base64,{}", STANDARD.encode(&pdf.bytes)),
                    }
                })];
                let text = if request.text.trim().is_empty() {
                    FILE_MODE_PROMPT.to_string()
                } else {
                    format!("{FILE_MODE_PROMPT}\n\n{}", request.text)
                };
                parts.push(json!({ "type": "text", "text": text }));
                Value::Array(parts)
            }
            None => Value::String(format!("The document text is here:\n\n{}", request.text)),
        };

        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.instructions },
                { "role": "user", "content": user_content },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": request.schema.to_json_schema_format(),
            },
        })
    }
}

/// Pull the assistant message out of a chat-completions reply.
pub(crate) fn reply_content(data: &Value) -> Result<String, ServiceError> {
    let message = &data["choices"][0]["message"];
    if let Some(refusal) = message["refusal"].as_str()
        && !refusal.is_empty()
    {
        return Err(ServiceError::Refused(refusal.to_string()));
    }
    match message["content"].as_str() {
        Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
        _ => Err(ServiceError::EmptyReply),
    }
}

impl ExtractionService for OpenAiService {
    fn name(&self) -> &str {
        "openai"
    }

    fn extract<'a>(
        &'a self,
        request: ExtractionRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<String, ServiceError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/chat/completions", self.base_url);
            let body = self.request_body(&request);

            tracing::debug!(model = %self.model, url = %url, "sending extraction request");

            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await?;

            let status = resp.status();
            if status.as_u16() == 429 {
                return Err(ServiceError::RateLimited);
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(ServiceError::Status {
                    status: status.as_u16(),
                    body: body.chars().take(500).collect(),
                });
            }

            let data: Value = resp.json().await?;
            reply_content(&data)
        })
    }
}
