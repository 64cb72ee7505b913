// OpenAI-compatible chat-completions enricher.
//
// Sends the cluster evidence as a single user message and asks for a JSON
// object back (`response_format: json_object`). The message content is
// parsed as JSON but not validated here; that happens in the retry loop so a
// malformed brief counts as a failed attempt.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::prompt::{build_prompt, SYSTEM_PROMPT};
use super::traits::{Enricher, EnrichmentRequest, EnrichmentResponse};
use crate::error::EngineError;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiEnricher {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    model_version: String,
    temperature: f64,
    categories: Vec<String>,
}

impl OpenAiEnricher {
    pub fn new(
        api_url: String,
        api_key: String,
        model: String,
        model_version: String,
        categories: Vec<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_url,
            api_key,
            model,
            model_version,
            temperature: 0.7,
            categories,
        }
    }
}

#[async_trait]
impl Enricher for OpenAiEnricher {
    async fn enrich(&self, request: &EnrichmentRequest) -> Result<EnrichmentResponse, EngineError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(request, &self.categories),
                },
            ],
            temperature: self.temperature,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::ExternalCall(format!("failed to call {}: {e}", self.api_url)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| EngineError::ExternalCall(format!("failed to parse enrichment API response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| EngineError::SchemaValidation("response contained no message content".to_string()))?;

        let payload: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| EngineError::SchemaValidation(format!("message content is not JSON: {e}")))?;

        debug!(
            cluster_id = %request.cluster_id,
            model = %self.model,
            chars = content.len(),
            "Received enrichment payload"
        );

        Ok(EnrichmentResponse {
            payload,
            model_name: parsed.model.unwrap_or_else(|| self.model.clone()),
            model_version: self.model_version.clone(),
        })
    }
}

/// Map a non-success HTTP status to an engine error.
///
/// 429 and 5xx are transient. Any other 4xx (bad key, bad request, unknown
/// model) will fail the same way on every retry.
fn status_error(status: StatusCode, body: &str) -> EngineError {
    let message = format!(
        "enrichment API returned {status}: {}",
        body.chars().take(300).collect::<String>()
    );
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        EngineError::Rejected {
            status: status.as_u16(),
            message,
        }
    } else {
        EngineError::ExternalCall(message)
    }
}

// --- chat-completions request/response types ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
