//! `kg-agent` binary: wires configuration into concrete adapters, then
//! either drives the ReACT controller over a free-form task or runs a
//! single PDF through EDC (+ Integration) directly (§6 CLI surface).

mod cli;

use std::path::Path;
use std::process;
use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use kg_adapter_in_memory::InMemoryStore;
use kg_adapter_postgres::{config::PgConfig, PgGraphStore};
use kg_agent::{tools, ReactAgent, ToolContext};
use kg_connector_embedding::{EmbeddingConfig, OpenAiEmbeddingAdapter};
use kg_connector_external::{
    DiscoveryConfig, DownloaderConfig, HttpPaperDiscovery, HttpPdfDownloader, HttpPdfParser, PaperDiscovery,
    ParserConfig, PdfDownloader, PdfParser,
};
use kg_connector_llm_anthropic::{AnthropicAdapter, AnthropicConfig};
use kg_connector_llm_openai::{OpenAiAdapter, OpenAiConfig};
use kg_core::config::{AppConfig, LlmProvider};
use kg_core::prelude::*;
use kg_edc::{EdcEvent, EdcWorkflow};

use cli::Cli;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_target(false)
        .init();

    let config = match AppConfig::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to load configuration: {}", err);
            process::exit(1);
        }
    };

    let tool_context = match build_tool_context(&config).await {
        Ok(ctx) => ctx,
        Err(err) => {
            error!("Failed to initialize adapters: {}", err);
            process::exit(1);
        }
    };

    let result = if let Some(task) = &args.agent_task {
        run_agentic(&tool_context, task, args.max_steps.unwrap_or(config.max_agent_steps)).await
    } else if let Some(paper_path) = &args.paper_path {
        run_single_paper(&tool_context, paper_path, args.integrate, args.source_paper_id.as_deref()).await
    } else {
        Err("either --agent <task> or a PDF path must be given".to_string())
    };

    if let Err(err) = result {
        error!("kg-agent run failed: {}", err);
        process::exit(1);
    }
}

/// Builds every adapter/connector from `config` via the `From<&core::config::*>`
/// impls each crate already exposes, then shares one store/llm/embedder
/// across the whole process (§5 "one pool" policy).
async fn build_tool_context(config: &AppConfig) -> Result<ToolContext, String> {
    let embedder: Arc<dyn EmbeddingAdapter> =
        Arc::new(OpenAiEmbeddingAdapter::new(EmbeddingConfig::from(&config.embedding)).map_err(|e| e.to_string())?);

    let llm: Arc<dyn LlmAdapter> = match config.llm.provider {
        LlmProvider::Openai => Arc::new(OpenAiAdapter::new(OpenAiConfig::from(&config.llm)).map_err(|e| e.to_string())?),
        LlmProvider::Anthropic => {
            Arc::new(AnthropicAdapter::new(AnthropicConfig::from(&config.llm)).map_err(|e| e.to_string())?)
        }
    };

    // A blank dsn means "no Postgres configured" — fall back to the
    // in-memory store so the agent still runs for local experimentation.
    let store: Arc<dyn GraphStore> = if config.postgres.dsn.is_empty() {
        Arc::new(InMemoryStore::new(embedder.clone()))
    } else {
        let pg = PgGraphStore::connect(&PgConfig::from(&config.postgres), embedder.clone())
            .await
            .map_err(|e| e.to_string())?;
        Arc::new(pg)
    };
    store.init().await.map_err(|e| e.to_string())?;

    let parser: Arc<dyn PdfParser> = Arc::new(HttpPdfParser::new(ParserConfig::from(&config.external)).map_err(|e| e.to_string())?);
    let discovery: Arc<dyn PaperDiscovery> =
        Arc::new(HttpPaperDiscovery::new(DiscoveryConfig::from(&config.external)).map_err(|e| e.to_string())?);
    let downloader: Arc<dyn PdfDownloader> =
        Arc::new(HttpPdfDownloader::new(DownloaderConfig::default()).map_err(|e| e.to_string())?);

    Ok(ToolContext {
        discovery,
        downloader,
        parser,
        llm,
        embedder,
        store,
        chunking: config.chunking.clone(),
        debug_dir: config.debug_dir.clone(),
        download_dir: config.debug_dir.join("downloads"),
    })
}

async fn run_agentic(tools: &ToolContext, task: &str, max_steps: u32) -> Result<(), String> {
    let agent = ReactAgent::new(tools.llm.as_ref(), tools, max_steps);
    let outcome = agent.run(task).await;

    info!(success = outcome.success, steps = outcome.steps.len(), "agent run finished");
    if let Some(answer) = &outcome.final_answer {
        println!("{answer}");
    }

    if outcome.success {
        Ok(())
    } else {
        Err("agent reached the step cap without a final answer".to_string())
    }
}

async fn run_single_paper(
    ctx: &ToolContext,
    paper_path: &Path,
    integrate: bool,
    source_paper_id: Option<&str>,
) -> Result<(), String> {
    if !integrate {
        let edc = EdcWorkflow::new(
            ctx.parser.clone(),
            ctx.llm.clone(),
            ctx.store.clone(),
            ctx.chunking.clone(),
            true,
            ctx.debug_dir.clone(),
        );
        let mut stream = Box::pin(edc.run(paper_path.display().to_string()));
        let mut complete = None;
        while let Some(event) = stream.next().await {
            if matches!(event, EdcEvent::Complete { .. }) {
                complete = Some(event);
            }
        }
        return match complete {
            Some(EdcEvent::Complete { success: true, .. }) => Ok(()),
            Some(EdcEvent::Complete { error, .. }) => Err(error.unwrap_or_else(|| "EDC workflow failed".to_string())),
            _ => Err("EDC workflow produced no Complete event".to_string()),
        };
    }

    let result = tools::process_paper(ctx, &paper_path.display().to_string(), source_paper_id).await;
    info!(
        success = result.success,
        entities = result.stats.entities_extracted,
        relationships = result.stats.relationships_extracted,
        merged = result.stats.entities_merged,
        created = result.stats.entities_created,
        "paper processed"
    );

    if result.success {
        Ok(())
    } else {
        Err(result.error.unwrap_or_else(|| "pipeline failed".to_string()))
    }
}
