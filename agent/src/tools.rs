//! The six ReACT tools (§4.11), each a thin async wrapper over a
//! component built earlier in the workspace.

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use kg_connector_external::{PaperDiscovery, PaperSummary, PdfDownloader, PdfParser};
use kg_core::config::ChunkingConfig;
use kg_core::prelude::*;
use kg_edc::{EdcEvent, EdcWorkflow};
use kg_integration::{IntegrationEvent, IntegrationWorkflow};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("external service error: {0}")]
    External(#[from] ExternalError),
    #[error("graph store error: {0}")]
    Graph(#[from] GraphError),
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Everything a tool call needs, shared across one agent run (and, for
/// the store, across the whole process — §5's "one pool" policy).
pub struct ToolContext {
    pub discovery: Arc<dyn PaperDiscovery>,
    pub downloader: Arc<dyn PdfDownloader>,
    pub parser: Arc<dyn PdfParser>,
    pub llm: Arc<dyn LlmAdapter>,
    pub embedder: Arc<dyn EmbeddingAdapter>,
    pub store: Arc<dyn GraphStore>,
    pub chunking: ChunkingConfig,
    pub debug_dir: PathBuf,
    pub download_dir: PathBuf,
}

pub async fn search_papers(ctx: &ToolContext, query: &str, limit: usize) -> Result<Vec<PaperSummary>, ToolError> {
    Ok(ctx.discovery.search(query, limit).await?)
}

pub async fn get_citations(ctx: &ToolContext, paper_id: &str, limit: usize) -> Result<Vec<PaperSummary>, ToolError> {
    Ok(ctx.discovery.citations(paper_id, limit).await?)
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Resolves the paper's PDF url then downloads it. Failure is reported
/// in the result, not as an `Err` — a ReACT agent needs to see "this
/// paper had no PDF" as an observation it can reason about, not a tool
/// invocation that crashed.
pub async fn download_paper(ctx: &ToolContext, paper: &PaperSummary) -> DownloadResult {
    match ctx.discovery.resolve_pdf_url(&paper.id).await {
        Ok(url) => match ctx.downloader.download(&url, &ctx.download_dir).await {
            Ok(path) => DownloadResult {
                success: true,
                path: Some(path.display().to_string()),
                error: None,
            },
            Err(err) => DownloadResult {
                success: false,
                path: None,
                error: Some(err.to_string()),
            },
        },
        Err(err) => DownloadResult {
            success: false,
            path: None,
            error: Some(err.to_string()),
        },
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessPaperStats {
    pub entities_extracted: usize,
    pub relationships_extracted: usize,
    pub entities_merged: usize,
    pub entities_created: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessPaperResult {
    pub success: bool,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub stats: ProcessPaperStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Composes EDC then Integration over one shared store connection
/// (spec.md §4.11, §5). Always returns — partial data plus `error` on
/// either stage's failure, never an `Err`, so the ReACT loop can keep
/// going after a bad paper.
pub async fn process_paper(ctx: &ToolContext, paper_path: &str, source_paper_id: Option<&str>) -> ProcessPaperResult {
    let edc = EdcWorkflow::new(
        ctx.parser.clone(),
        ctx.llm.clone(),
        ctx.store.clone(),
        ctx.chunking.clone(),
        true,
        ctx.debug_dir.clone(),
    );

    let mut stream = Box::pin(edc.run(paper_path.to_string()));
    let mut edc_complete = None;
    while let Some(event) = stream.next().await {
        if let EdcEvent::Complete { .. } = &event {
            edc_complete = Some(event);
        }
    }

    let (success, _paper_path_out, entities_count, relationships_count, final_graph, error) = match edc_complete {
        Some(EdcEvent::Complete {
            success,
            paper_path,
            entities_count,
            relationships_count,
            final_graph,
            error,
        }) => (success, paper_path, entities_count, relationships_count, final_graph, error),
        _ => {
            return ProcessPaperResult {
                success: false,
                entities: vec![],
                relationships: vec![],
                stats: ProcessPaperStats::default(),
                error: Some("EDC workflow produced no Complete event".to_string()),
            }
        }
    };

    if !success {
        return ProcessPaperResult {
            success: false,
            entities: vec![],
            relationships: vec![],
            stats: ProcessPaperStats::default(),
            error,
        };
    }

    let mut graph = match final_graph {
        Some(graph) => graph,
        None => {
            return ProcessPaperResult {
                success: false,
                entities: vec![],
                relationships: vec![],
                stats: ProcessPaperStats::default(),
                error: Some("EDC workflow reported success without a final graph".to_string()),
            }
        }
    };

    if let Some(source_paper_id) = source_paper_id {
        for rel in &mut graph.relationships {
            rel.source_paper_id = Some(source_paper_id.to_string());
        }
    }

    let integration = IntegrationWorkflow::new(ctx.store.clone(), ctx.llm.clone(), ctx.debug_dir.clone());
    let mut stream = Box::pin(integration.run(graph.clone(), paper_path));
    let mut integration_complete = None;
    while let Some(event) = stream.next().await {
        if let IntegrationEvent::Complete { .. } = &event {
            integration_complete = Some(event);
        }
    }

    match integration_complete {
        Some(IntegrationEvent::Complete { success: true, stats, .. }) => ProcessPaperResult {
            success: true,
            entities: graph.entities,
            relationships: graph.relationships,
            stats: ProcessPaperStats {
                entities_extracted: entities_count,
                relationships_extracted: relationships_count,
                entities_merged: stats.entities_merged,
                entities_created: stats.entities_created,
            },
            error: None,
        },
        Some(IntegrationEvent::Complete { error, .. }) => ProcessPaperResult {
            success: false,
            entities: graph.entities,
            relationships: graph.relationships,
            stats: ProcessPaperStats {
                entities_extracted: entities_count,
                relationships_extracted: relationships_count,
                ..Default::default()
            },
            error,
        },
        _ => ProcessPaperResult {
            success: false,
            entities: graph.entities,
            relationships: graph.relationships,
            stats: ProcessPaperStats {
                entities_extracted: entities_count,
                relationships_extracted: relationships_count,
                ..Default::default()
            },
            error: Some("Integration workflow produced no Complete event".to_string()),
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub entities: Vec<Entity>,
    pub count: usize,
}

/// Backed by `fetchSimilarEntities` over a synthetic, unstored query
/// entity (spec.md §4.11) — the search term is embedded the same way a
/// real entity's rendering would be.
pub async fn query_knowledge_graph(ctx: &ToolContext, search_term: &str, limit: usize) -> Result<QueryResult, ToolError> {
    let embedding = ctx.embedder.embed(search_term).await?;
    let synthetic = Entity {
        id: "__query__".to_string(),
        name: search_term.to_string(),
        entity_type: "Query".to_string(),
        description: None,
        aliases: None,
        metadata: None,
        embedding: Some(embedding),
        version: 0,
    };

    let entities = ctx.store.fetch_similar_entities(&synthetic, limit).await?;
    let count = entities.len();
    Ok(QueryResult { entities, count })
}

pub async fn summarize_knowledge_graph(ctx: &ToolContext) -> Result<GraphSummary, ToolError> {
    Ok(ctx.store.graph_summary().await?)
}
