//! Error taxonomy for the knowledge graph builder

use thiserror::Error;

/// Top-level error for orchestration code that can see every subsystem
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("graph store error: {0}")]
    Store(#[from] GraphError),

    #[error("LLM adapter error: {0}")]
    Llm(#[from] LlmError),

    #[error("embedding adapter error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("external service error: {0}")]
    External(#[from] ExternalError),

    #[error("EDC pipeline error: {0}")]
    Edc(#[from] EdcError),

    #[error("integration error: {0}")]
    Integration(#[from] IntegrationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors from the graph store (§4.1, §7)
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("query execution failed: {0}")]
    QueryFailed(String),

    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("serialization failure exhausted retries: {0}")]
    SerializationRetriesExhausted(String),

    #[error("embedding computation failed: {0}")]
    EmbeddingFailed(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("migration error: {0}")]
    MigrationFailed(String),
}

/// Errors from LLM adapters (§4.3, §7)
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("API error from LLM provider (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("timeout during LLM call")]
    Timeout,

    #[error("failed to parse LLM response: {0}")]
    ResponseParseError(String),

    #[error("LLM response failed schema validation: {0}")]
    SchemaValidationError(String),

    #[error("internal adapter error: {0}")]
    InternalError(String),
}

impl LlmError {
    /// Classification used by the resilience utility (§4.10): non-retryable
    /// on auth/quota/not-found, retryable on everything else.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::ApiError { status, message } => {
                !matches!(status, 401 | 402 | 404)
                    && !message.to_lowercase().contains("payment required")
                    && !message.to_lowercase().contains("unauthorized")
            }
            LlmError::NetworkError(_) | LlmError::Timeout => true,
            LlmError::ConfigError(_)
            | LlmError::ResponseParseError(_)
            | LlmError::SchemaValidationError(_)
            | LlmError::InternalError(_) => false,
        }
    }
}

/// Errors from the embedding adapter
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("unexpected embedding dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ApiError { status, .. } => !matches!(status, 401 | 402 | 404),
            EmbeddingError::NetworkError(_) => true,
            EmbeddingError::ConfigError(_) | EmbeddingError::DimensionMismatch { .. } => false,
        }
    }
}

/// Errors from the external parser / discovery / download facades (§6)
#[derive(Error, Debug)]
pub enum ExternalError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("response parse error: {0}")]
    ParseError(String),
}

impl ExternalError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ExternalError::ApiError { status, .. } => !matches!(status, 401 | 402 | 404),
            ExternalError::NetworkError(_) => true,
            ExternalError::NotFound(_) => false,
            ExternalError::ConfigError(_) | ExternalError::ParseError(_) => false,
        }
    }
}

/// Errors from the EDC pipeline stages (§4.4–§4.8, §7)
#[derive(Error, Debug)]
pub enum EdcError {
    #[error("load stage failed: {0}")]
    LoadFailed(String),

    #[error("extraction stage failed: {0}")]
    ExtractionFailed(#[from] LlmError),

    #[error("definition stage failed: {0}")]
    DefinitionFailed(String),

    #[error("canonicalization stage failed: {0}")]
    CanonicalizationFailed(String),

    #[error("save stage failed: {0}")]
    SaveFailed(#[from] GraphError),
}

/// Errors from the integration workflow (§4.9, §7)
#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("candidate retrieval failed: {0}")]
    RetrievalFailed(String),

    #[error("resolution failed: {0}")]
    ResolutionFailed(String),

    #[error("persistence failed: {0}")]
    PersistFailed(#[from] GraphError),
}

/// Result aliases, mirrored per subsystem for readability at call sites
pub type CoreResult<T> = Result<T, CoreError>;
pub type GraphResult<T> = Result<T, GraphError>;
pub type LlmResult<T> = Result<T, LlmError>;
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;
pub type ExternalResult<T> = Result<T, ExternalError>;
pub type EdcResult<T> = Result<T, EdcError>;
pub type IntegrationResult<T> = Result<T, IntegrationError>;
