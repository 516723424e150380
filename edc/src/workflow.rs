//! Event-driven orchestration of Load -> (PreParse) -> Extract -> Define ->
//! Canonicalize -> Save (§4.8). Handlers are pure over their event's
//! payload plus the injected dependencies; the dispatch loop — not the
//! handler — converts a failure into an `ErrorEvent` (§7 propagation
//! policy), so the stream provably always terminates in one
//! `CompleteEvent`.

use std::path::PathBuf;
use std::sync::Arc;

use futures::Stream;
use kg_connector_external::PdfParser;
use kg_core::config::ChunkingConfig;
use kg_core::prelude::*;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use crate::{canonicalizer, preparser, Definer, Extractor};

/// One step of the EDC state machine (§4.8). Carries exactly the payloads
/// spec.md lists per event; `Complete` is the stream's only terminal
/// variant.
#[derive(Debug, Clone)]
pub enum EdcEvent {
    Load {
        paper_path: String,
    },
    PreParsed {
        text: String,
        paper_path: String,
        context: Option<PreparsedPaperContext>,
    },
    Extract {
        text: String,
        paper_path: String,
        context: Option<PreparsedPaperContext>,
    },
    Define {
        graph: GraphData,
        paper_path: String,
    },
    Canonicalize {
        graph: GraphData,
        paper_path: String,
    },
    Save {
        graph: GraphData,
        paper_path: String,
    },
    Complete {
        success: bool,
        paper_path: String,
        entities_count: usize,
        relationships_count: usize,
        final_graph: Option<GraphData>,
        error: Option<String>,
    },
    Error {
        stage: String,
        error: String,
        paper_path: String,
    },
}

impl EdcEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EdcEvent::Complete { .. })
    }
}

struct WorkflowCtx {
    parser: Arc<dyn PdfParser>,
    llm: Arc<dyn LlmAdapter>,
    store: Arc<dyn GraphStore>,
    chunking: ChunkingConfig,
    pre_parse_enabled: bool,
    debug_dir: PathBuf,
    retry: RetryOptions,
}

/// Drives one paper through Load -> ... -> Save, yielding every event on
/// an `impl Stream` the caller drains until `CompleteEvent` (§4.8, §5).
pub struct EdcWorkflow {
    parser: Arc<dyn PdfParser>,
    llm: Arc<dyn LlmAdapter>,
    store: Arc<dyn GraphStore>,
    chunking: ChunkingConfig,
    pre_parse_enabled: bool,
    debug_dir: PathBuf,
    retry: RetryOptions,
}

impl EdcWorkflow {
    pub fn new(
        parser: Arc<dyn PdfParser>,
        llm: Arc<dyn LlmAdapter>,
        store: Arc<dyn GraphStore>,
        chunking: ChunkingConfig,
        pre_parse_enabled: bool,
        debug_dir: PathBuf,
    ) -> Self {
        Self {
            parser,
            llm,
            store,
            chunking,
            pre_parse_enabled,
            debug_dir,
            retry: RetryOptions::default(),
        }
    }

    pub fn with_retry_options(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    /// Runs the pipeline for `paper_path`, shared connections never
    /// closed — the store's pool is a process-wide resource (§5).
    pub fn run(&self, paper_path: impl Into<String>) -> impl Stream<Item = EdcEvent> {
        let paper_path = paper_path.into();
        let ctx = WorkflowCtx {
            parser: self.parser.clone(),
            llm: self.llm.clone(),
            store: self.store.clone(),
            chunking: self.chunking.clone(),
            pre_parse_enabled: self.pre_parse_enabled,
            debug_dir: self.debug_dir.clone(),
            retry: self.retry,
        };
        let (tx, rx) = mpsc::channel(8);

        tokio::spawn(async move {
            let mut current = EdcEvent::Load { paper_path };
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

async fn step(event: EdcEvent, ctx: &WorkflowCtx) -> EdcEvent {
    match event {
        EdcEvent::Load { paper_path } => match load_stage(&paper_path, ctx).await {
            Ok(text) => {
                if ctx.pre_parse_enabled {
                    EdcEvent::PreParsed {
                        text,
                        paper_path,
                        context: None,
                    }
                } else {
                    EdcEvent::Extract {
                        text,
                        paper_path,
                        context: None,
                    }
                }
            }
            Err(err) => EdcEvent::Error {
                stage: "load".to_string(),
                error: err.to_string(),
                paper_path,
            },
        },

        EdcEvent::PreParsed {
            text,
            paper_path,
            context,
        } => {
            let context = match context {
                Some(context) => Some(context),
                None => {
                    let parsed = preparser::preparse(ctx.parser.as_ref(), &text).await;
                    if let Some(parsed) = &parsed {
                        write_debug_artifact(&ctx.debug_dir, "00_preparsed.json", parsed).await;
                    }
                    parsed
                }
            };
            EdcEvent::Extract {
                text,
                paper_path,
                context,
            }
        }

        EdcEvent::Extract {
            text,
            paper_path,
            context,
        } => {
            let extractor = Extractor::new(ctx.llm.as_ref(), ctx.chunking.clone());
            match extractor.extract(&text, context.as_ref()).await {
                Ok(graph) => {
                    write_debug_artifact(&ctx.debug_dir, "01_extraction.json", &graph).await;
                    EdcEvent::Define { graph, paper_path }
                }
                Err(err) => EdcEvent::Error {
                    stage: "extract".to_string(),
                    error: err.to_string(),
                    paper_path,
                },
            }
        }

        EdcEvent::Define { graph, paper_path } => {
            let definer = Definer::new(ctx.llm.as_ref());
            match definer.define(graph).await {
                Ok(graph) => {
                    write_debug_artifact(&ctx.debug_dir, "02_definition.json", &graph).await;
                    EdcEvent::Canonicalize { graph, paper_path }
                }
                Err(err) => EdcEvent::Error {
                    stage: "define".to_string(),
                    error: err.to_string(),
                    paper_path,
                },
            }
        }

        EdcEvent::Canonicalize { graph, paper_path } => {
            let graph = canonicalizer::canonicalize(graph);
            write_debug_artifact(&ctx.debug_dir, "03_canonicalization.json", &graph).await;
            EdcEvent::Save { graph, paper_path }
        }

        EdcEvent::Save { graph, paper_path } => match ctx.store.upsert_graph(graph.clone()).await {
            Ok(_summary) => EdcEvent::Complete {
                success: true,
                paper_path,
                entities_count: graph.entities.len(),
                relationships_count: graph.relationships.len(),
                final_graph: Some(graph),
                error: None,
            },
            Err(err) => EdcEvent::Error {
                stage: "save".to_string(),
                error: err.to_string(),
                paper_path,
            },
        },

        EdcEvent::Error {
            stage,
            error: message,
            paper_path,
        } => {
            error!(stage = %stage, error = %message, paper_path = %paper_path, "EDC pipeline stage failed");
            EdcEvent::Complete {
                success: false,
                paper_path,
                entities_count: 0,
                relationships_count: 0,
                final_graph: None,
                error: Some(format!("{stage}: {message}")),
            }
        }

        complete @ EdcEvent::Complete { .. } => complete,
    }
}

async fn load_stage(paper_path: &str, ctx: &WorkflowCtx) -> Result<String, EdcError> {
    let bytes = tokio::fs::read(paper_path)
        .await
        .map_err(|e| EdcError::LoadFailed(format!("failed to read {paper_path}: {e}")))?;

    let parser = ctx.parser.clone();
    with_retry("pdf-parse", ctx.retry, || {
        let parser = parser.clone();
        let bytes = bytes.clone();
        async move { parser.parse(&bytes).await }
    })
    .await
    .map_err(|e| EdcError::LoadFailed(e.to_string()))
}

/// Best-effort debug artifact write: directory-creation and write failures
/// are logged and swallowed, never propagated (§4.8).
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
