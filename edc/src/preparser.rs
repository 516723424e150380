//! Thin wrapper over `connectors/external`'s structured-extraction mode
//! (§4.7). Non-fatal on failure: the caller proceeds with `context: None`.

use kg_connector_external::PdfParser;
use kg_core::types::PreparsedPaperContext;
use tracing::warn;

pub async fn preparse(parser: &dyn PdfParser, text: &str) -> Option<PreparsedPaperContext> {
    match parser.preparse(text).await {
        Ok(context) => Some(context),
        Err(err) => {
            warn!(error = %err, "pre-parse failed, proceeding without structured context");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kg_core::errors::ExternalError;

    struct FailingParser;

    #[async_trait]
    impl PdfParser for FailingParser {
        async fn parse(&self, _pdf_bytes: &[u8]) -> Result<String, ExternalError> {
            unimplemented!()
        }

        async fn preparse(&self, _text: &str) -> Result<PreparsedPaperContext, ExternalError> {
            Err(ExternalError::ApiError {
                status: 500,
                message: "boom".to_string(),
            })
        }
    }

    struct SucceedingParser;

    #[async_trait]
    impl PdfParser for SucceedingParser {
        async fn parse(&self, _pdf_bytes: &[u8]) -> Result<String, ExternalError> {
            unimplemented!()
        }

        async fn preparse(&self, _text: &str) -> Result<PreparsedPaperContext, ExternalError> {
            Ok(PreparsedPaperContext {
                title: Some("A Paper".to_string()),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn failure_degrades_to_none_instead_of_propagating() {
        let result = preparse(&FailingParser, "text").await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn success_returns_the_context() {
        let result = preparse(&SucceedingParser, "text").await;
        assert_eq!(result.unwrap().title.as_deref(), Some("A Paper"));
    }
}
