//! # Core
//!
//! Shared types, traits, error taxonomy, and cross-cutting utilities for
//! the knowledge graph builder. Every adapter, connector, and workflow
//! crate in the workspace depends on this one.

pub mod config;
pub mod errors;
pub mod render;
pub mod resilience;
pub mod traits;
pub mod types;

pub use errors::{CoreError, CoreResult, EdcError, EmbeddingError, ExternalError, GraphError, IntegrationError, LlmError};
pub use traits::{ChatRequest, EmbeddingAdapter, GraphStore, JsonRequest, LlmAdapter};
pub use types::{Entity, GraphData, MergeAction, MergeDecision, PreparsedPaperContext, Relationship, RelationshipType, UpsertSummary};

/// Convenience re-exports for downstream crates
pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::errors::*;
    pub use crate::render::render_entity;
    pub use crate::resilience::{with_retry, Classify, RetryOptions};
    pub use crate::traits::*;
    pub use crate::types::*;
    pub use async_trait::async_trait;
}
