//! OpenAI-compatible `/v1/embeddings` implementation of `EmbeddingAdapter` (§4.2)

pub mod config;

use async_trait::async_trait;
pub use config::EmbeddingConfig;
use kg_core::prelude::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbeddingAdapter {
    client: Client,
    config: EmbeddingConfig,
}

impl OpenAiEmbeddingAdapter {
    pub fn new(config: EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| EmbeddingError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl EmbeddingAdapter for OpenAiEmbeddingAdapter {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.config.api_base))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&EmbeddingRequest {
                model: &self.config.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(EmbeddingError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::ApiError {
                status: status.as_u16(),
                message: e.to_string(),
            })?;

        let embedding = parsed
            .data
            .pop()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::ApiError {
                status: status.as_u16(),
                message: "no embedding data in response".to_string(),
            })?;

        if embedding.len() != EMBEDDING_DIM {
            return Err(EmbeddingError::DimensionMismatch {
                expected: EMBEDDING_DIM,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }
}
