//! Anthropic implementation of `LlmAdapter` (§4.3)

mod config;
mod models;

pub use config::AnthropicConfig;
use models::*;

use async_trait::async_trait;
use kg_core::prelude::*;
use reqwest::Client;
use tracing::debug;

pub struct AnthropicAdapter {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicAdapter {
    pub fn new(config: AnthropicConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| LlmError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    async fn call(&self, system: Option<String>, user: String, json_mode: bool) -> Result<String, LlmError> {
        let request = MessageRequest {
            model: self.config.model.clone(),
            messages: vec![Message::user(user)],
            system,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            response_format: json_mode.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.api_base))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: MessageResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseParseError(e.to_string()))?;

        if let Some(usage) = &parsed.usage {
            debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                model = %self.config.model,
                "anthropic call completed"
            );
        }

        let text = parsed
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("\n");

        if text.is_empty() {
            return Err(LlmError::ResponseParseError("no text content in response".to_string()));
        }

        Ok(text)
    }
}

fn strip_code_fences(content: &str) -> &str {
    content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

#[async_trait]
impl LlmAdapter for AnthropicAdapter {
    async fn json(&self, req: JsonRequest) -> Result<serde_json::Value, LlmError> {
        let content = self.call(Some(req.system), req.user, true).await?;
        let cleaned = strip_code_fences(&content);
        serde_json::from_str(cleaned)
            .map_err(|e| LlmError::SchemaValidationError(format!("invalid JSON from model: {e}: '{cleaned}'")))
    }

    async fn chat(&self, req: ChatRequest) -> Result<String, LlmError> {
        self.call(req.system, req.user, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base: &str) -> AnthropicAdapter {
        AnthropicAdapter::new(AnthropicConfig::new("test-key").with_api_base(base)).unwrap()
    }

    #[tokio::test]
    async fn json_mode_strips_code_fences_before_parsing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "```json\n{\"entities\": []}\n```"}],
                "usage": {"input_tokens": 10, "output_tokens": 5}
            })))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let value = adapter
            .json(JsonRequest {
                system: "extract".to_string(),
                user: "text".to_string(),
                schema_hint: json!({}),
            })
            .await
            .unwrap();

        assert_eq!(value, json!({"entities": []}));
    }

    #[tokio::test]
    async fn empty_text_content_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": []})))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let err = adapter
            .chat(ChatRequest {
                system: None,
                user: "hi".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::ResponseParseError(_)));
    }

    #[tokio::test]
    async fn quota_exceeded_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(402).set_body_string("payment required"))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let err = adapter
            .chat(ChatRequest {
                system: None,
                user: "hi".to_string(),
            })
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
    }
}
