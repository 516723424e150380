//! PDF downloader facade (§6): HTTPS GET -> bytes -> file on disk.

use async_trait::async_trait;
use kg_core::errors::ExternalError;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::config::DownloaderConfig;

#[async_trait]
pub trait PdfDownloader: Send + Sync {
    async fn download(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, ExternalError>;
}

pub struct HttpPdfDownloader {
    client: Client,
}

impl HttpPdfDownloader {
    pub fn new(config: DownloaderConfig) -> Result<Self, ExternalError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ExternalError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PdfDownloader for HttpPdfDownloader {
    async fn download(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, ExternalError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ExternalError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExternalError::ApiError {
                status: status.as_u16(),
                message: format!("download failed for {url}"),
            });
        }

        let bytes = response.bytes().await.map_err(|e| ExternalError::NetworkError(e.to_string()))?;

        let file_name = url.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or("paper.pdf");
        let dest_path = dest_dir.join(file_name);

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| ExternalError::ConfigError(format!("failed to create download dir: {e}")))?;

        let mut file = tokio::fs::File::create(&dest_path)
            .await
            .map_err(|e| ExternalError::ConfigError(format!("failed to create {dest_path:?}: {e}")))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| ExternalError::ConfigError(format!("failed to write {dest_path:?}: {e}")))?;

        Ok(dest_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn download_writes_bytes_to_dest_dir() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 fake".to_vec()))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let downloader = HttpPdfDownloader::new(DownloaderConfig::default()).unwrap();
        let path = downloader
            .download(&format!("{}/papers/p1.pdf", server.uri()), tmp.path())
            .await
            .unwrap();

        assert_eq!(path.file_name().unwrap(), "p1.pdf");
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"%PDF-1.4 fake");
    }

    #[tokio::test]
    async fn non_success_status_is_an_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let downloader = HttpPdfDownloader::new(DownloaderConfig::default()).unwrap();
        let err = downloader
            .download(&format!("{}/papers/missing.pdf", server.uri()), tmp.path())
            .await
            .unwrap_err();

        assert!(matches!(err, ExternalError::ApiError { status: 404, .. }));
    }
}
