//! ReACT loop: Thought -> Action -> Observation, bounded by `max_steps`
//! (§4.11). `core::traits::LlmAdapter` only exposes `json`/`chat`, not a
//! provider-specific tool-calling wire protocol, so each step is driven
//! through `json()` against a small per-step decision schema rather than
//! an OpenAI/Anthropic `tools` array — the same JSON-mode idiom the
//! Extractor, Definer, and Integration resolver already use.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use kg_connector_external::PaperSummary;
use kg_core::prelude::*;

use crate::tools::{self, ToolContext};

const SYSTEM_PROMPT: &str = "You are a research assistant building an academic knowledge graph. You have six \
tools, each described by its JSON argument shape and return shape: \
searchPapers({query, limit}) -> {results: [{id, title, citation_count}]}; \
getCitations({paper_id, limit}) -> {results: [{id, title, citation_count}]}; \
downloadPaper({paper: {id, title, citation_count}}) -> {success, path?, error?}; \
processPaper({paper_path, source_paper_id?}) -> {success, entities, relationships, stats, error?}; \
queryKnowledgeGraph({search_term, limit?}) -> {entities, count}; \
summarizeKnowledgeGraph({}) -> {total_entities, total_relationships, top_entity_types}. \
At every step, think, then either call exactly one tool or give a final answer summarizing what you \
accomplished. Return strictly JSON: {\"thought\": \"...\", \"tool\": \"<one of the six tool names>\" or null, \
\"args\": {...} or null, \"finalAnswer\": \"...\" or null}. Set tool+args together, or finalAnswer alone, never \
both, never neither.";

fn default_limit() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
struct Decision {
    thought: String,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    args: Value,
    #[serde(default, rename = "finalAnswer")]
    final_answer: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactStep {
    pub thought: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactOutcome {
    pub success: bool,
    pub final_answer: Option<String>,
    pub steps: Vec<ReactStep>,
}

/// Drives one free-form task through Thought/Action/Observation turns
/// against `tools`, stopping at a final answer or at `max_steps`.
pub struct ReactAgent<'a> {
    llm: &'a dyn LlmAdapter,
    tools: &'a ToolContext,
    max_steps: u32,
}

impl<'a> ReactAgent<'a> {
    pub fn new(llm: &'a dyn LlmAdapter, tools: &'a ToolContext, max_steps: u32) -> Self {
        Self { llm, tools, max_steps }
    }

    pub async fn run(&self, task: &str) -> ReactOutcome {
        let mut transcript: Vec<ReactStep> = Vec::new();

        for step_index in 0..self.max_steps {
            let decision = match self.decide(task, &transcript).await {
                Ok(decision) => decision,
                Err(err) => {
                    warn!(step = step_index, error = %err, "agent step failed to produce a valid decision, stopping");
                    return ReactOutcome {
                        success: false,
                        final_answer: None,
                        steps: transcript,
                    };
                }
            };

            if let Some(final_answer) = decision.final_answer {
                transcript.push(ReactStep {
                    thought: decision.thought,
                    tool: None,
                    observation: None,
                });
                return ReactOutcome {
                    success: true,
                    final_answer: Some(final_answer),
                    steps: transcript,
                };
            }

            let tool_name = match decision.tool {
                Some(name) => name,
                None => {
                    warn!(step = step_index, "agent returned neither a tool call nor a final answer, stopping");
                    transcript.push(ReactStep {
                        thought: decision.thought,
                        tool: None,
                        observation: None,
                    });
                    return ReactOutcome {
                        success: false,
                        final_answer: None,
                        steps: transcript,
                    };
                }
            };

            debug!(step = step_index, tool = %tool_name, "agent invoking tool");
            let observation = self.dispatch(&tool_name, decision.args).await;
            transcript.push(ReactStep {
                thought: decision.thought,
                tool: Some(tool_name),
                observation: Some(observation),
            });
        }

        warn!(max_steps = self.max_steps, "agent reached the step cap without a final answer");
        ReactOutcome {
            success: false,
            final_answer: None,
            steps: transcript,
        }
    }

    async fn decide(&self, task: &str, transcript: &[ReactStep]) -> Result<Decision, LlmError> {
        let user = serde_json::json!({ "task": task, "history": transcript }).to_string();
        let value = self
            .llm
            .json(JsonRequest {
                system: SYSTEM_PROMPT.to_string(),
                user,
                schema_hint: serde_json::json!({
                    "thought": "string",
                    "tool": "string?",
                    "args": "object?",
                    "finalAnswer": "string?",
                }),
            })
            .await?;

        serde_json::from_value(value).map_err(|e| LlmError::SchemaValidationError(e.to_string()))
    }

    async fn dispatch(&self, tool_name: &str, args: Value) -> Value {
        match tool_name {
            "searchPapers" => self.call_search_papers(args).await,
            "getCitations" => self.call_get_citations(args).await,
            "downloadPaper" => self.call_download_paper(args).await,
            "processPaper" => self.call_process_paper(args).await,
            "queryKnowledgeGraph" => self.call_query_knowledge_graph(args).await,
            "summarizeKnowledgeGraph" => self.call_summarize_knowledge_graph().await,
            other => serde_json::json!({ "error": format!("unknown tool: {other}") }),
        }
    }

    async fn call_search_papers(&self, args: Value) -> Value {
        #[derive(Deserialize)]
        struct Args {
            query: String,
            #[serde(default = "default_limit")]
            limit: usize,
        }
        match serde_json::from_value::<Args>(args) {
            Ok(a) => match tools::search_papers(self.tools, &a.query, a.limit).await {
                Ok(results) => serde_json::json!({ "results": results }),
                Err(err) => serde_json::json!({ "error": err.to_string() }),
            },
            Err(err) => serde_json::json!({ "error": format!("invalid args: {err}") }),
        }
    }

    async fn call_get_citations(&self, args: Value) -> Value {
        #[derive(Deserialize)]
        struct Args {
            paper_id: String,
            #[serde(default = "default_limit")]
            limit: usize,
        }
        match serde_json::from_value::<Args>(args) {
            Ok(a) => match tools::get_citations(self.tools, &a.paper_id, a.limit).await {
                Ok(results) => serde_json::json!({ "results": results }),
                Err(err) => serde_json::json!({ "error": err.to_string() }),
            },
            Err(err) => serde_json::json!({ "error": format!("invalid args: {err}") }),
        }
    }

    async fn call_download_paper(&self, args: Value) -> Value {
        #[derive(Deserialize)]
        struct Args {
            paper: PaperSummary,
        }
        match serde_json::from_value::<Args>(args) {
            Ok(a) => serde_json::to_value(tools::download_paper(self.tools, &a.paper).await).unwrap_or_default(),
            Err(err) => serde_json::json!({ "error": format!("invalid args: {err}") }),
        }
    }

    async fn call_process_paper(&self, args: Value) -> Value {
        #[derive(Deserialize)]
        struct Args {
            paper_path: String,
            #[serde(default)]
            source_paper_id: Option<String>,
        }
        match serde_json::from_value::<Args>(args) {
            Ok(a) => {
                let result = tools::process_paper(self.tools, &a.paper_path, a.source_paper_id.as_deref()).await;
                serde_json::to_value(result).unwrap_or_default()
            }
            Err(err) => serde_json::json!({ "error": format!("invalid args: {err}") }),
        }
    }

    async fn call_query_knowledge_graph(&self, args: Value) -> Value {
        #[derive(Deserialize)]
        struct Args {
            search_term: String,
            #[serde(default = "default_limit")]
            limit: usize,
        }
        match serde_json::from_value::<Args>(args) {
            Ok(a) => match tools::query_knowledge_graph(self.tools, &a.search_term, a.limit).await {
                Ok(result) => serde_json::to_value(result).unwrap_or_default(),
                Err(err) => serde_json::json!({ "error": err.to_string() }),
            },
            Err(err) => serde_json::json!({ "error": format!("invalid args: {err}") }),
        }
    }

    async fn call_summarize_knowledge_graph(&self) -> Value {
        match tools::summarize_knowledge_graph(self.tools).await {
            Ok(summary) => serde_json::to_value(summary).unwrap_or_default(),
            Err(err) => serde_json::json!({ "error": err.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kg_adapter_in_memory::InMemoryStore;
    use kg_connector_external::{
        DiscoveryConfig, DownloaderConfig, HttpPaperDiscovery, HttpPdfDownloader, HttpPdfParser, ParserConfig,
    };
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingAdapter for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let sum: u32 = text.bytes().map(|b| b as u32).sum();
            Ok(vec![text.len() as f32, sum as f32])
        }
    }

    struct ScriptedLlm {
        responses: Mutex<Vec<serde_json::Value>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<serde_json::Value>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl LlmAdapter for ScriptedLlm {
        async fn json(&self, _req: JsonRequest) -> Result<serde_json::Value, LlmError> {
            Ok(self.responses.lock().unwrap().remove(0))
        }

        async fn chat(&self, _req: ChatRequest) -> Result<String, LlmError> {
            unimplemented!()
        }
    }

    fn test_context(dir: &std::path::Path) -> ToolContext {
        ToolContext {
            discovery: Arc::new(HttpPaperDiscovery::new(DiscoveryConfig::new("key", "http://localhost:1")).unwrap()),
            downloader: Arc::new(HttpPdfDownloader::new(DownloaderConfig::default()).unwrap()),
            parser: Arc::new(HttpPdfParser::new(ParserConfig::new("key", "http://localhost:1")).unwrap()),
            llm: Arc::new(ScriptedLlm::new(vec![])),
            embedder: Arc::new(FakeEmbedder),
            store: Arc::new(InMemoryStore::new(Arc::new(FakeEmbedder))),
            chunking: kg_core::config::ChunkingConfig::default(),
            debug_dir: dir.join("debug"),
            download_dir: dir.join("downloads"),
        }
    }

    #[tokio::test]
    async fn stops_immediately_on_a_final_answer() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());
        let llm = ScriptedLlm::new(vec![
            serde_json::json!({"thought": "nothing to do", "finalAnswer": "done"}),
        ]);
        let agent = ReactAgent::new(&llm, &ctx, 25);

        let outcome = agent.run("say hi").await;
        assert!(outcome.success);
        assert_eq!(outcome.final_answer.as_deref(), Some("done"));
        assert_eq!(outcome.steps.len(), 1);
    }

    #[tokio::test]
    async fn dispatches_a_tool_call_then_stops_on_final_answer() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());
        let llm = ScriptedLlm::new(vec![
            serde_json::json!({
                "thought": "check the graph first",
                "tool": "summarizeKnowledgeGraph",
                "args": {},
            }),
            serde_json::json!({"thought": "empty graph, nothing more to do", "finalAnswer": "graph is empty"}),
        ]);
        let agent = ReactAgent::new(&llm, &ctx, 25);

        let outcome = agent.run("summarize the graph").await;
        assert!(outcome.success);
        assert_eq!(outcome.steps.len(), 2);
        assert_eq!(outcome.steps[0].tool.as_deref(), Some("summarizeKnowledgeGraph"));
        let observation = outcome.steps[0].observation.as_ref().unwrap();
        assert_eq!(observation["total_entities"], 0);
    }

    #[tokio::test]
    async fn stops_at_the_step_cap_without_a_final_answer() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());
        let looping_step = serde_json::json!({
            "thought": "keep checking",
            "tool": "summarizeKnowledgeGraph",
            "args": {},
        });
        let llm = ScriptedLlm::new(vec![looping_step.clone(), looping_step.clone(), looping_step]);
        let agent = ReactAgent::new(&llm, &ctx, 3);

        let outcome = agent.run("loop forever").await;
        assert!(!outcome.success);
        assert!(outcome.final_answer.is_none());
        assert_eq!(outcome.steps.len(), 3);
    }
}
