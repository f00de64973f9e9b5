//! Text generation backends.
//!
//! The pipeline only sees the [`TextGenerator`] trait: prompt, token budget and
//! system prompt in, free text out. [`AnthropicClient`] calls the Anthropic
//! Messages API. Errors are returned unmodified; retrying is the job
//! scheduler's concern, so the client makes exactly one request per call.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const API_VERSION: &str = "2023-06-01";

/// Token budget for one capture.
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert assistant that processes and structures text content for knowledge management.
Your task is to analyze the provided content and extract key information in a clear, structured format.
Your output should be formatted as markdown and include important links (URLs).

Be concise, accurate, and focus on extracting the most valuable information from the content.";

// ============================================================================
// TextGenerator trait
// ============================================================================

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        system: &str,
    ) -> Result<String, GenerationError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing API key")]
    MissingApiKey,

    #[error("Generation backend error: {0}")]
    Backend(String),
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl AnthropicConfig {
    /// Falls back to `ANTHROPIC_API_KEY` when no key is given.
    pub fn new(api_key: Option<String>, model: String) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_seconds: 120,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

// ============================================================================
// Messages API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// AnthropicClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self, GenerationError> {
        if config.api_key.is_empty() {
            return Err(GenerationError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        system: &str,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));

        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        tracing::debug!(model = %self.config.model, prompt_len = prompt.len(), "Sending generation request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_body);

            tracing::error!(code = status.as_u16(), message = %message, "Generation API error");

            return Err(GenerationError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let body: MessagesResponse = response.json().await?;

        // A response without a text block is treated as empty text.
        let text = body
            .content
            .into_iter()
            .next()
            .and_then(|block| block.text)
            .unwrap_or_default();

        tracing::debug!(response_len = text.len(), "Generation response received");

        Ok(text)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: String) -> AnthropicClient {
        let config = AnthropicConfig {
            api_key: "test-api-key".to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url,
            timeout_seconds: 5,
        };
        AnthropicClient::new(config).expect("Failed to create client")
    }

    #[tokio::test]
    async fn test_generate_sends_messages_request() {
        let mock_server = MockServer::start().await;
        let client = test_client(mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-api-key"))
            .and(header("anthropic-version", API_VERSION))
            .and(body_json(serde_json::json!({
                "model": DEFAULT_MODEL,
                "max_tokens": 2000,
                "system": "be brief",
                "messages": [{ "role": "user", "content": "summarize this" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{ "type": "text", "text": "# A Title" }]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let text = client.generate("summarize this", 2000, "be brief").await.unwrap();
        assert_eq!(text, "# A Title");
    }

    #[tokio::test]
    async fn test_generate_empty_content_yields_empty_text() {
        let mock_server = MockServer::start().await;
        let client = test_client(mock_server.uri());

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": []
            })))
            .mount(&mock_server)
            .await;

        assert_eq!(client.generate("p", 10, "s").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_generate_surfaces_api_error_without_retry() {
        let mock_server = MockServer::start().await;
        let client = test_client(mock_server.uri());

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_json(serde_json::json!({
                "type": "error",
                "error": { "type": "overloaded_error", "message": "Overloaded" }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        match client.generate("p", 10, "s").await {
            Err(GenerationError::Api { code, message }) => {
                assert_eq!(code, 529);
                assert_eq!(message, "Overloaded");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_non_json_error_body_kept_verbatim() {
        let mock_server = MockServer::start().await;
        let client = test_client(mock_server.uri());

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&mock_server)
            .await;

        match client.generate("p", 10, "s").await {
            Err(GenerationError::Api { code, message }) => {
                assert_eq!(code, 502);
                assert_eq!(message, "bad gateway");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let config = AnthropicConfig {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_seconds: 5,
        };
        assert!(matches!(
            AnthropicClient::new(config),
            Err(GenerationError::MissingApiKey)
        ));
    }
}
