//! OpenAI implementation of `LlmAdapter` (§4.3)

mod config;
mod models;

pub use config::OpenAiConfig;
use models::*;

use async_trait::async_trait;
use kg_core::prelude::*;
use reqwest::Client;
use tracing::debug;

pub struct OpenAiAdapter {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiAdapter {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| LlmError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    async fn call(&self, system: Option<String>, user: String, json_mode: bool) -> Result<String, LlmError> {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: system,
            });
        }
        messages.push(OpenAiMessage {
            role: "user".to_string(),
            content: user,
        });

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            response_format: json_mode.then(|| ResponseFormat {
                r#type: "json_object".to_string(),
            }),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.api_base))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
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

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseParseError(e.to_string()))?;

        if let Some(usage) = &parsed.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                model = %self.config.model,
                "openai call completed"
            );
        }

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::ResponseParseError("no content in response".to_string()))
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
impl LlmAdapter for OpenAiAdapter {
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

    fn adapter(base: &str) -> OpenAiAdapter {
        OpenAiAdapter::new(OpenAiConfig::new("test-key").with_api_base(base)).unwrap()
    }

    #[tokio::test]
    async fn json_mode_strips_code_fences_before_parsing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "```json\n{\"entities\": []}\n```"}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5}
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
    async fn non_success_status_becomes_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
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
        match err {
            LlmError::ApiError { status, .. } => assert_eq!(status, 401),
            other => panic!("expected ApiError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_json_is_schema_validation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "not json"}}]
            })))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let err = adapter
            .json(JsonRequest {
                system: "extract".to_string(),
                user: "text".to_string(),
                schema_hint: json!({}),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::SchemaValidationError(_)));
    }
}
