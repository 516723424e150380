//! Parser facade (§6): PDF blob -> markdown text, upload/poll/result; plus
//! the pre-parser's structured-extraction call (§4.7), folded in as
//! `PdfParser::preparse` since both are served by the same external service.

use async_trait::async_trait;
use kg_core::errors::ExternalError;
use kg_core::types::PreparsedPaperContext;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::ParserConfig;

#[async_trait]
pub trait PdfParser: Send + Sync {
    /// Uploads a PDF blob, polls the parser's job queue, and returns the
    /// extracted markdown text.
    async fn parse(&self, pdf_bytes: &[u8]) -> Result<String, ExternalError>;

    /// Runs the structured-extraction mode over already-parsed text,
    /// producing a `PreparsedPaperContext` for the Extractor to steer its
    /// prompts with (§4.7).
    async fn preparse(&self, text: &str) -> Result<PreparsedPaperContext, ExternalError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    status: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct HttpPdfParser {
    client: Client,
    config: ParserConfig,
}

impl HttpPdfParser {
    pub fn new(config: ParserConfig) -> Result<Self, ExternalError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ExternalError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn status_to_error(status: reqwest::StatusCode, message: String) -> ExternalError {
        ExternalError::ApiError {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl PdfParser for HttpPdfParser {
    async fn parse(&self, pdf_bytes: &[u8]) -> Result<String, ExternalError> {
        let upload = self
            .client
            .post(format!("{}/parse", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .body(pdf_bytes.to_vec())
            .send()
            .await
            .map_err(|e| ExternalError::NetworkError(e.to_string()))?;

        let status = upload.status();
        if !status.is_success() {
            let body = upload.text().await.unwrap_or_default();
            return Err(Self::status_to_error(status, body));
        }

        let upload: UploadResponse = upload
            .json()
            .await
            .map_err(|e| ExternalError::ParseError(e.to_string()))?;

        for attempt in 0..self.config.max_polls {
            let response = self
                .client
                .get(format!("{}/jobs/{}", self.config.base_url, upload.job_id))
                .header("Authorization", format!("Bearer {}", self.config.api_key))
                .send()
                .await
                .map_err(|e| ExternalError::NetworkError(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Self::status_to_error(status, body));
            }

            let job: JobStatusResponse = response
                .json()
                .await
                .map_err(|e| ExternalError::ParseError(e.to_string()))?;

            match job.status.as_str() {
                "done" => {
                    return job
                        .text
                        .ok_or_else(|| ExternalError::ParseError("job done with no text".to_string()));
                }
                "failed" => {
                    return Err(ExternalError::ApiError {
                        status: 500,
                        message: job.error.unwrap_or_else(|| "parser job failed".to_string()),
                    });
                }
                _ => {
                    debug!(job_id = %upload.job_id, attempt, status = %job.status, "parser job pending");
                    tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
                }
            }
        }

        Err(ExternalError::ApiError {
            status: 504,
            message: format!("parser job {} did not complete within {} polls", upload.job_id, self.config.max_polls),
        })
    }

    async fn preparse(&self, text: &str) -> Result<PreparsedPaperContext, ExternalError> {
        let response = self
            .client
            .post(format!("{}/preparse", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| ExternalError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::status_to_error(status, body));
        }

        response
            .json::<PreparsedPaperContext>()
            .await
            .map_err(|e| ExternalError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn parser(base: &str) -> HttpPdfParser {
        HttpPdfParser::new(ParserConfig::new("test-key", base)).unwrap()
    }

    #[tokio::test]
    async fn parse_polls_until_job_is_done() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/parse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "abc"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jobs/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "done", "text": "hello world"})))
            .mount(&server)
            .await;

        let mut cfg = ParserConfig::new("test-key", server.uri());
        cfg.poll_interval_ms = 1;
        let parser = HttpPdfParser::new(cfg).unwrap();
        let text = parser.parse(b"%PDF-1.4").await.unwrap();
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn quota_exceeded_upload_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/parse"))
            .respond_with(ResponseTemplate::new(402).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let parser = parser(&server.uri());
        let err = parser.parse(b"%PDF-1.4").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn preparse_returns_structured_context() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/preparse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "title": "Attention Is All You Need",
                "authors": [],
                "keywords": [],
                "main_findings": [],
                "references": []
            })))
            .mount(&server)
            .await;

        let parser = parser(&server.uri());
        let context = parser.preparse("raw text").await.unwrap();
        assert_eq!(context.title.as_deref(), Some("Attention Is All You Need"));
    }
}
