//! Trait contracts shared by every adapter and connector in the workspace

use crate::errors::{EmbeddingError, GraphError, LlmError};
use crate::types::{CandidateMap, Entity, GraphData, GraphSummary, UpsertSummary};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The persistence contract implemented by `adapters/postgres` and
/// `adapters/in_memory` (§4.1)
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Run migrations / validate schema. Called once at process startup.
    async fn init(&self) -> Result<(), GraphError>;

    /// Upsert a fragment of the graph in one transaction (I1-I5). Returns
    /// counters for the caller rather than requiring a re-query.
    async fn upsert_graph(&self, graph: GraphData) -> Result<UpsertSummary, GraphError>;

    /// The `k` nearest entities to `entity`'s embedding by cosine distance,
    /// excluding `entity` itself.
    async fn fetch_similar_entities(&self, entity: &Entity, k: usize) -> Result<Vec<Entity>, GraphError>;

    /// Batched form of `fetch_similar_entities`, keyed by `entity.id`.
    /// Entities with zero candidates are omitted from the map.
    async fn fetch_similar_entities_batch(&self, entities: &[Entity], k: usize) -> Result<CandidateMap, GraphError>;

    /// Release the underlying connection pool. Called once at shutdown;
    /// never called from inside a workflow handler (§5).
    async fn close(&self) -> Result<(), GraphError>;

    /// Aggregate counters for the agentic controller's
    /// `summarizeKnowledgeGraph` tool: total entities, total
    /// relationships, and the top entity types by count.
    async fn graph_summary(&self) -> Result<GraphSummary, GraphError>;
}

/// The embedding contract consumed by the store and the Integration
/// resolver (§4.2)
#[async_trait]
pub trait EmbeddingAdapter: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// A single message in an LLM chat request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub user: String,
}

/// A JSON-mode request: the adapter guarantees the response parses as
/// JSON, not that it matches `schema_hint` — schema enforcement is the
/// caller's job (§4.3)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRequest {
    pub system: String,
    pub user: String,
    pub schema_hint: serde_json::Value,
}

/// The LLM contract implemented by `connectors/llm-openai` and
/// `connectors/llm-anthropic` (§4.3)
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    /// Structured output mode. Never retries internally — callers that
    /// need retry wrap this in `core::resilience::with_retry`.
    async fn json(&self, req: JsonRequest) -> Result<serde_json::Value, LlmError>;

    /// Free-form chat mode, used by the agentic controller's ReACT loop.
    async fn chat(&self, req: ChatRequest) -> Result<String, LlmError>;
}
