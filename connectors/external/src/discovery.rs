//! Paper discovery facade (§6): search, citations, PDF URL resolution.

use async_trait::async_trait;
use kg_core::errors::ExternalError;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::DiscoveryConfig;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PaperSummary {
    pub id: String,
    pub title: String,
    pub citation_count: u32,
}

#[async_trait]
pub trait PaperDiscovery: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperSummary>, ExternalError>;
    async fn citations(&self, paper_id: &str, limit: usize) -> Result<Vec<PaperSummary>, ExternalError>;
    async fn resolve_pdf_url(&self, paper_id: &str) -> Result<String, ExternalError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<PaperSummary>,
}

#[derive(Debug, Deserialize)]
struct PaperDetailResponse {
    #[serde(default)]
    pdf_url: Option<String>,
}

pub struct HttpPaperDiscovery {
    client: Client,
    config: DiscoveryConfig,
}

impl HttpPaperDiscovery {
    pub fn new(config: DiscoveryConfig) -> Result<Self, ExternalError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ExternalError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: String) -> Result<T, ExternalError> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .send()
            .await
            .map_err(|e| ExternalError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if status.as_u16() == 404 {
                ExternalError::NotFound(body)
            } else {
                ExternalError::ApiError {
                    status: status.as_u16(),
                    message: body,
                }
            });
        }

        response.json::<T>().await.map_err(|e| ExternalError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl PaperDiscovery for HttpPaperDiscovery {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperSummary>, ExternalError> {
        let url = format!(
            "{}/search?query={}&limit={}",
            self.config.base_url,
            urlencode(query),
            limit
        );
        let response: SearchResponse = self.get_json(url).await?;
        Ok(response.results)
    }

    async fn citations(&self, paper_id: &str, limit: usize) -> Result<Vec<PaperSummary>, ExternalError> {
        let url = format!(
            "{}/papers/{}/citations?limit={}",
            self.config.base_url,
            urlencode(paper_id),
            limit
        );
        let response: SearchResponse = self.get_json(url).await?;
        Ok(response.results)
    }

    async fn resolve_pdf_url(&self, paper_id: &str) -> Result<String, ExternalError> {
        let url = format!("{}/papers/{}", self.config.base_url, urlencode(paper_id));
        let detail: PaperDetailResponse = self.get_json(url).await?;
        detail
            .pdf_url
            .ok_or_else(|| ExternalError::NotFound(format!("no pdf url for paper {paper_id}")))
    }
}

/// Falls back to a secondary provider's PDF resolution when the primary
/// doesn't have one for the paper, per spec.md §6.
pub struct FallbackPaperDiscovery {
    primary: Arc<dyn PaperDiscovery>,
    fallback: Arc<dyn PaperDiscovery>,
}

impl FallbackPaperDiscovery {
    pub fn new(primary: Arc<dyn PaperDiscovery>, fallback: Arc<dyn PaperDiscovery>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl PaperDiscovery for FallbackPaperDiscovery {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperSummary>, ExternalError> {
        self.primary.search(query, limit).await
    }

    async fn citations(&self, paper_id: &str, limit: usize) -> Result<Vec<PaperSummary>, ExternalError> {
        self.primary.citations(paper_id, limit).await
    }

    async fn resolve_pdf_url(&self, paper_id: &str) -> Result<String, ExternalError> {
        match self.primary.resolve_pdf_url(paper_id).await {
            Ok(url) => Ok(url),
            Err(ExternalError::NotFound(_)) => {
                debug!(paper_id, "primary discovery has no pdf, trying fallback");
                self.fallback.resolve_pdf_url(paper_id).await
            }
            Err(other) => Err(other),
        }
    }
}

fn urlencode(value: &str) -> String {
    value
        .chars()
        .flat_map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') {
                vec![c]
            } else {
                format!("%{:02X}", c as u32).chars().collect()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn discovery(base: &str) -> HttpPaperDiscovery {
        HttpPaperDiscovery::new(DiscoveryConfig::new("test-key", base)).unwrap()
    }

    #[tokio::test]
    async fn search_returns_paper_summaries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/search$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": "p1", "title": "NeRF", "citation_count": 500}]
            })))
            .mount(&server)
            .await;

        let results = discovery(&server.uri()).search("nerf", 10).await.unwrap();
        assert_eq!(results, vec![PaperSummary { id: "p1".into(), title: "NeRF".into(), citation_count: 500 }]);
    }

    #[tokio::test]
    async fn fallback_kicks_in_when_primary_has_no_pdf() {
        let primary_server = MockServer::start().await;
        let fallback_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/papers/p1$"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no pdf"))
            .mount(&primary_server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/papers/p1$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"pdf_url": "https://example.com/p1.pdf"})))
            .mount(&fallback_server)
            .await;

        let primary = Arc::new(discovery(&primary_server.uri()));
        let fallback = Arc::new(discovery(&fallback_server.uri()));
        let combined = FallbackPaperDiscovery::new(primary, fallback);

        let url = combined.resolve_pdf_url("p1").await.unwrap();
        assert_eq!(url, "https://example.com/p1.pdf");
    }
}
