//! Process-wide configuration, loaded once at startup (§6 "Environment /
//! configuration")

use crate::errors::CoreError;
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Openai,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub dsn: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub api_key: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalServicesConfig {
    pub parser_base_url: String,
    #[serde(default)]
    pub parser_api_key: Option<String>,
    pub discovery_base_url: String,
    #[serde(default)]
    pub discovery_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

fn default_max_chars() -> usize {
    12_000
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_chars: default_max_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default = "default_min_timeout_ms")]
    pub min_timeout_ms: u64,
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,
}

fn default_retries() -> u32 {
    3
}
fn default_factor() -> f64 {
    2.0
}
fn default_min_timeout_ms() -> u64 {
    1000
}
fn default_max_timeout_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            factor: default_factor(),
            min_timeout_ms: default_min_timeout_ms(),
            max_timeout_ms: default_max_timeout_ms(),
        }
    }
}

impl From<&RetryConfig> for crate::resilience::RetryOptions {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            retries: cfg.retries,
            factor: cfg.factor,
            min_timeout_ms: cfg.min_timeout_ms,
            max_timeout_ms: cfg.max_timeout_ms,
        }
    }
}

/// Top-level process configuration, read once at startup and never
/// re-read (§6)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub postgres: PostgresConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub external: ExternalServicesConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_debug_dir")]
    pub debug_dir: PathBuf,
    #[serde(default = "default_max_agent_steps")]
    pub max_agent_steps: u32,
}

fn default_debug_dir() -> PathBuf {
    PathBuf::from("debug")
}

fn default_max_agent_steps() -> u32 {
    25
}

impl AppConfig {
    /// Load layered configuration: `config.yaml` (or an explicit override
    /// path), then environment variables prefixed `KGAGENT_`, grounded on
    /// `kgctl::config::KgctlConfig::load`'s layering.
    pub fn load(config_path: &Option<PathBuf>) -> Result<Self, CoreError> {
        let mut figment = Figment::new();

        let default_config_paths = ["config.yaml", "config.yml", ".kgagent.yaml"];
        for path in &default_config_paths {
            if Path::new(path).exists() {
                figment = figment.merge(Yaml::file(path));
                break;
            }
        }

        if let Some(path) = config_path {
            if path.exists() {
                figment = figment.merge(Yaml::file(path));
            } else {
                return Err(CoreError::Configuration(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
        }

        figment = figment.merge(Env::prefixed("KGAGENT_").split("__"));

        figment
            .extract()
            .map_err(|e| CoreError::Configuration(format!("failed to parse configuration: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_yaml() -> &'static str {
        r#"
postgres:
  dsn: "postgres://localhost/kg"
llm:
  provider: openai
  api_key: "sk-test"
  model: "gpt-4o"
embedding:
  api_key: "sk-test"
external:
  parser_base_url: "http://parser.local"
  discovery_base_url: "http://discovery.local"
"#
    }

    #[test]
    fn loads_from_file_with_defaults_filled_in() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", sample_yaml()).unwrap();

        let config = AppConfig::load(&Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.postgres.dsn, "postgres://localhost/kg");
        assert_eq!(config.postgres.max_connections, 10);
        assert_eq!(config.llm.provider, LlmProvider::Openai);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert!(!config.chunking.enabled);
        assert_eq!(config.retry.retries, 3);
        assert_eq!(config.max_agent_steps, 25);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let result = AppConfig::load(&Some(PathBuf::from("/nonexistent/config.yaml")));
        assert!(result.is_err());
    }
}
