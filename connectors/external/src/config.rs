//! Configuration for the parser / discovery / downloader facades

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
}

impl ParserConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            timeout_ms: 30_000,
            poll_interval_ms: 2_000,
            max_polls: 30,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_ms: u64,
}

impl DiscoveryConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderConfig {
    pub timeout_ms: u64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self { timeout_ms: 60_000 }
    }
}

impl From<&kg_core::config::ExternalServicesConfig> for ParserConfig {
    fn from(cfg: &kg_core::config::ExternalServicesConfig) -> Self {
        Self::new(cfg.parser_api_key.clone().unwrap_or_default(), cfg.parser_base_url.clone())
    }
}

impl From<&kg_core::config::ExternalServicesConfig> for DiscoveryConfig {
    fn from(cfg: &kg_core::config::ExternalServicesConfig) -> Self {
        Self::new(
            cfg.discovery_api_key.clone().unwrap_or_default(),
            cfg.discovery_base_url.clone(),
        )
    }
}
