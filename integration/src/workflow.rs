//! Event-driven cross-document resolution: Retrieve -> Resolve -> Persist
//! -> Complete (§4.9).

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures::Stream;
use kg_core::prelude::*;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use crate::resolver::resolve_all;

/// One step of the Integration state machine, carrying exactly the
/// payloads spec.md §4.9 lists per event.
#[derive(Debug, Clone)]
pub enum IntegrationEvent {
    Integrate {
        new_graph: GraphData,
        paper_path: String,
    },
    CandidatesRetrieved {
        new_graph: GraphData,
        candidates: CandidateMap,
        paper_path: String,
    },
    EntitiesResolved {
        resolved_graph: GraphData,
        merge_log: Vec<MergeDecision>,
        paper_path: String,
    },
    Complete {
        success: bool,
        paper_path: String,
        stats: IntegrationStats,
        error: Option<String>,
    },
    Error {
        stage: String,
        error: String,
        paper_path: String,
    },
}

impl IntegrationEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IntegrationEvent::Complete { .. })
    }
}

const CANDIDATE_LIMIT: usize = 10;

struct WorkflowCtx {
    store: Arc<dyn GraphStore>,
    llm: Arc<dyn LlmAdapter>,
    debug_dir: PathBuf,
}

/// Drives one graph fragment through Retrieve -> Resolve -> Persist,
/// yielding every event on an `impl Stream` the caller drains until
/// `Complete` (§4.9, §5).
pub struct IntegrationWorkflow {
    store: Arc<dyn GraphStore>,
    llm: Arc<dyn LlmAdapter>,
    debug_dir: PathBuf,
}

impl IntegrationWorkflow {
    pub fn new(store: Arc<dyn GraphStore>, llm: Arc<dyn LlmAdapter>, debug_dir: PathBuf) -> Self {
        Self { store, llm, debug_dir }
    }

    pub fn run(&self, new_graph: GraphData, paper_path: impl Into<String>) -> impl Stream<Item = IntegrationEvent> {
        let paper_path = paper_path.into();
        let ctx = WorkflowCtx {
            store: self.store.clone(),
            llm: self.llm.clone(),
            debug_dir: self.debug_dir.clone(),
        };
        let (tx, rx) = mpsc::channel(8);

        tokio::spawn(async move {
            let mut current = IntegrationEvent::Integrate { new_graph, paper_path };
            loop {
                let terminal = current.is_terminal();
                if tx.send(current.clone()).await.is_err() || terminal {
                    break;
                }
                current = step(current, &ctx).await;
            }
        });

        ReceiverStream::new(rx)
    }
}

async fn step(event: IntegrationEvent, ctx: &WorkflowCtx) -> IntegrationEvent {
    match event {
        IntegrationEvent::Integrate { new_graph, paper_path } => {
            match ctx.store.fetch_similar_entities_batch(&new_graph.entities, CANDIDATE_LIMIT).await {
                Ok(candidates) => IntegrationEvent::CandidatesRetrieved {
                    new_graph,
                    candidates,
                    paper_path,
                },
                Err(err) => IntegrationEvent::Error {
                    stage: "retrieve".to_string(),
                    error: IntegrationError::RetrievalFailed(err.to_string()).to_string(),
                    paper_path,
                },
            }
        }

        IntegrationEvent::CandidatesRetrieved {
            new_graph,
            candidates,
            paper_path,
        } => {
            let (id_mapping, merge_log) = resolve_all(&new_graph.entities, &candidates, ctx.llm.as_ref()).await;
            let resolved_graph = rewrite_graph(&new_graph, &id_mapping);
            IntegrationEvent::EntitiesResolved {
                resolved_graph,
                merge_log,
                paper_path,
            }
        }

        IntegrationEvent::EntitiesResolved {
            resolved_graph,
            merge_log,
            paper_path,
        } => {
            write_debug_artifact(&ctx.debug_dir, "04_integration_log.json", &merge_log).await;
            match ctx.store.upsert_graph(resolved_graph).await {
                Ok(_summary) => {
                    let entities_merged = merge_log.iter().filter(|d| d.action == MergeAction::Merge).count();
                    let entities_created = merge_log.len() - entities_merged;
                    IntegrationEvent::Complete {
                        success: true,
                        paper_path,
                        stats: IntegrationStats {
                            entities_processed: merge_log.len(),
                            entities_merged,
                            entities_created,
                        },
                        error: None,
                    }
                }
                Err(err) => IntegrationEvent::Error {
                    stage: "persist".to_string(),
                    error: IntegrationError::PersistFailed(err).to_string(),
                    paper_path,
                },
            }
        }

        IntegrationEvent::Error {
            stage,
            error: message,
            paper_path,
        } => {
            error!(stage = %stage, error = %message, paper_path = %paper_path, "Integration stage failed");
            IntegrationEvent::Complete {
                success: false,
                paper_path,
                stats: IntegrationStats::default(),
                error: Some(format!("{stage}: {message}")),
            }
        }

        complete @ IntegrationEvent::Complete { .. } => complete,
    }
}

/// Best-effort debug artifact write, mirroring the EDC workflow's helper:
/// directory-creation and write failures are logged and swallowed.
async fn write_debug_artifact<T: Serialize>(debug_dir: &std::path::Path, filename: &str, value: &T) {
    if let Err(err) = tokio::fs::create_dir_all(debug_dir).await {
        debug!(error = %err, dir = %debug_dir.display(), "failed to create debug directory, skipping artifact write");
        return;
    }

    let bytes = match serde_json::to_vec_pretty(value) {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!(error = %err, file = filename, "failed to serialize debug artifact");
            return;
        }
    };

    if let Err(err) = tokio::fs::write(debug_dir.join(filename), bytes).await {
        debug!(error = %err, file = filename, "failed to write debug artifact");
    }
}

/// Builds the resolved fragment per §4.9's Rewriting rule: entities are
/// the CREATE outcomes (new id == resolved id), relationships are
/// rewritten through `idMapping`, and `referencedEntityIds` surfaces
/// MERGE targets that live only in the store so the persistence layer
/// doesn't drop relationships to them as orphans.
fn rewrite_graph(new_graph: &GraphData, id_mapping: &std::collections::HashMap<String, String>) -> GraphData {
    let entities: Vec<Entity> = new_graph
        .entities
        .iter()
        .filter(|e| id_mapping.get(&e.id).map(|resolved| resolved == &e.id).unwrap_or(true))
        .cloned()
        .collect();

    let resolve = |id: &str| -> String { id_mapping.get(id).cloned().unwrap_or_else(|| id.to_string()) };

    let relationships: Vec<Relationship> = new_graph
        .relationships
        .iter()
        .map(|r| Relationship {
            source_id: resolve(&r.source_id),
            target_id: resolve(&r.target_id),
            ..r.clone()
        })
        .filter(|r| !r.is_self_loop())
        .collect();

    let entity_ids: HashSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();
    let referenced_entity_ids: HashSet<String> = id_mapping
        .values()
        .filter(|resolved| !entity_ids.contains(resolved.as_str()))
        .cloned()
        .collect();

    GraphData {
        entities,
        relationships,
        referenced_entity_ids: if referenced_entity_ids.is_empty() {
            None
        } else {
            Some(referenced_entity_ids)
        },
    }
}
