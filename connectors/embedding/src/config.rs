//! Configuration for the embedding connector

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub timeout_ms: u64,
}

impl EmbeddingConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "text-embedding-3-small".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            timeout_ms: 30_000,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

impl From<&kg_core::config::EmbeddingConfig> for EmbeddingConfig {
    fn from(cfg: &kg_core::config::EmbeddingConfig) -> Self {
        let mut config = Self::new(cfg.api_key.clone()).with_model(cfg.model.clone());
        if let Some(api_base) = &cfg.api_base {
            config = config.with_api_base(api_base.clone());
        }
        config
    }
}
