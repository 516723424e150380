//! Two-stage LLM extraction (§4.4): entities, then relationships.

use std::collections::HashSet;
use std::str::FromStr;

use kg_core::config::ChunkingConfig;
use kg_core::prelude::*;
use tracing::warn;

use crate::dto::{ExtractedEntity, ExtractedRelationship, StageAResponse, StageBResponse};

const STAGE_A_SYSTEM_PROMPT: &str = "You are an expert knowledge graph extraction engine for academic papers. \
Identify the entities discussed in the text (methods, metrics, tasks, datasets, concepts, authors, conferences) \
and emit them as a JSON object. Use normalized, lowercase, underscore-separated ids. Include any alternate names \
for an entity under `aliases`. Return strictly JSON: {\"entities\": [{\"id\": ..., \"name\": ..., \"type\": ..., \
\"description\": ..., \"aliases\": [...]}]}.";

const STAGE_B_SYSTEM_PROMPT: &str = "Given the text and the list of entities already extracted from it, identify \
the relationships between them. Valid relationship types: improves_on, uses, evaluated_on, achieves, proposes, \
addresses, related_to, based_on, cites, extends, introduces. Return strictly JSON: {\"relationships\": \
[{\"source_id\": ..., \"target_id\": ..., \"type\": ..., \"description\": ..., \"confidence\": ...}]}.";

pub struct Extractor<'a> {
    llm: &'a dyn LlmAdapter,
    chunking: ChunkingConfig,
}

impl<'a> Extractor<'a> {
    pub fn new(llm: &'a dyn LlmAdapter, chunking: ChunkingConfig) -> Self {
        Self { llm, chunking }
    }

    pub async fn extract(
        &self,
        text: &str,
        context: Option<&PreparsedPaperContext>,
    ) -> Result<GraphData, EdcError> {
        if self.chunking.enabled && text.chars().count() > self.chunking.max_chars {
            let chunks = split_into_chunks(text, self.chunking.max_chars);
            let mut fragments = Vec::with_capacity(chunks.len());
            for chunk in &chunks {
                fragments.push(self.extract_single(chunk, context).await?);
            }
            Ok(union_fragments(fragments))
        } else {
            self.extract_single(text, context).await
        }
    }

    async fn extract_single(
        &self,
        text: &str,
        context: Option<&PreparsedPaperContext>,
    ) -> Result<GraphData, EdcError> {
        let entities = self.stage_a(text, context).await?;
        if entities.is_empty() {
            return Ok(GraphData::empty());
        }

        let relationships = self.stage_b(text, &entities).await?;
        Ok(GraphData {
            entities,
            relationships,
            referenced_entity_ids: None,
        })
    }

    async fn stage_a(&self, text: &str, context: Option<&PreparsedPaperContext>) -> Result<Vec<Entity>, EdcError> {
        let system = build_stage_a_prompt(context);
        let value = self
            .llm
            .json(JsonRequest {
                system,
                user: text.to_string(),
                schema_hint: serde_json::json!({"entities": "array"}),
            })
            .await
            .map_err(EdcError::ExtractionFailed)?;

        let parsed: StageAResponse = serde_json::from_value(value).map_err(|e| {
            EdcError::ExtractionFailed(LlmError::SchemaValidationError(format!(
                "stage A response did not match the entity schema: {e}"
            )))
        })?;

        Ok(parsed.entities.into_iter().map(from_extracted_entity).collect())
    }

    async fn stage_b(&self, text: &str, entities: &[Entity]) -> Result<Vec<Relationship>, EdcError> {
        let bullet_list = entities
            .iter()
            .map(|e| format!("- {}: {} ({})", e.id, e.name, e.entity_type))
            .collect::<Vec<_>>()
            .join("\n");

        let user = format!("Entities:\n{bullet_list}\n\nText:\n{text}");

        let value = self
            .llm
            .json(JsonRequest {
                system: STAGE_B_SYSTEM_PROMPT.to_string(),
                user,
                schema_hint: serde_json::json!({"relationships": "array"}),
            })
            .await
            .map_err(EdcError::ExtractionFailed)?;

        let parsed: StageBResponse = serde_json::from_value(value).map_err(|e| {
            EdcError::ExtractionFailed(LlmError::SchemaValidationError(format!(
                "stage B response did not match the relationship schema: {e}"
            )))
        })?;

        let known_ids: HashSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();
        Ok(parsed
            .relationships
            .into_iter()
            .filter_map(|r| filter_extracted_relationship(r, &known_ids))
            .collect())
    }
}

fn build_stage_a_prompt(context: Option<&PreparsedPaperContext>) -> String {
    match context {
        None => STAGE_A_SYSTEM_PROMPT.to_string(),
        Some(ctx) => {
            let mut preface = String::from("Known paper metadata:\n");
            if let Some(title) = &ctx.title {
                preface.push_str(&format!("Title: {title}\n"));
            }
            if let Some(abstract_text) = &ctx.abstract_text {
                preface.push_str(&format!("Abstract: {abstract_text}\n"));
            }
            if !ctx.keywords.is_empty() {
                preface.push_str(&format!("Keywords: {}\n", ctx.keywords.join(", ")));
            }
            if !ctx.main_findings.is_empty() {
                preface.push_str(&format!("Main findings: {}\n", ctx.main_findings.join("; ")));
            }
            if let Some(methodology) = &ctx.methodology {
                preface.push_str(&format!("Methodology: {methodology}\n"));
            }
            format!("{preface}\n{STAGE_A_SYSTEM_PROMPT}")
        }
    }
}

fn from_extracted_entity(e: ExtractedEntity) -> Entity {
    let mut entity = Entity::new(e.id, e.name, e.entity_type);
    if let Some(description) = e.description {
        entity = entity.with_description(description);
    }
    if let Some(aliases) = e.aliases {
        entity = entity.with_aliases(aliases);
    }
    entity
}

/// Drops relationships referencing unknown entities or forming a self-loop;
/// coerces unrecognized relationship types to `related_to` (§4.4).
fn filter_extracted_relationship(r: ExtractedRelationship, known_ids: &HashSet<&str>) -> Option<Relationship> {
    if !known_ids.contains(r.source_id.as_str()) || !known_ids.contains(r.target_id.as_str()) {
        return None;
    }
    if r.source_id == r.target_id {
        return None;
    }

    let relationship_type = RelationshipType::from_str(&r.relationship_type)
        .expect("RelationshipType::from_str is infallible, coercing to RelatedTo");

    let mut relationship = Relationship::new(r.source_id, r.target_id, relationship_type);
    relationship.description = r.description;
    relationship.confidence = r.confidence;
    Some(relationship)
}

/// Splits at paragraph boundaries (`"\n\n"`), keeping each chunk under
/// `max_chars` where the text allows it (§4.4 edge case).
fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        if !current.is_empty() && current.chars().count() + paragraph.chars().count() + 2 > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Unions per-chunk fragments: entities merged by id (first occurrence wins
/// for `type`/`description`, aliases deduplicated and concatenated
/// preserving first-seen order), relationships deduplicated on the triple
/// (§4.4 edge case).
fn union_fragments(fragments: Vec<GraphData>) -> GraphData {
    let mut entities: Vec<Entity> = Vec::new();
    let mut entity_index: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut seen_triples: HashSet<(String, String, RelationshipType)> = HashSet::new();
    let mut relationships = Vec::new();

    for fragment in fragments {
        for entity in fragment.entities {
            match entity_index.get(&entity.id) {
                None => {
                    entity_index.insert(entity.id.clone(), entities.len());
                    entities.push(entity);
                }
                Some(&idx) => {
                    let existing = &mut entities[idx];
                    let mut merged_aliases = existing.aliases.clone().unwrap_or_default();
                    for alias in entity.aliases.unwrap_or_default() {
                        if !merged_aliases.contains(&alias) {
                            merged_aliases.push(alias);
                        }
                    }
                    if !merged_aliases.is_empty() {
                        existing.aliases = Some(merged_aliases);
                    }
                }
            }
        }

        for relationship in fragment.relationships {
            let triple = (
                relationship.source_id.clone(),
                relationship.target_id.clone(),
                relationship.relationship_type,
            );
            if seen_triples.insert(triple) {
                relationships.push(relationship);
            } else {
                warn!(
                    source = %relationship.source_id,
                    target = %relationship.target_id,
                    "dropping duplicate relationship across chunks"
                );
            }
        }
    }

    GraphData {
        entities,
        relationships,
        referenced_entity_ids: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

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
            unimplemented!("extractor never falls back to chat, per the resolved open question")
        }
    }

    #[tokio::test]
    async fn zero_entities_short_circuits_stage_b() {
        let llm = ScriptedLlm::new(vec![serde_json::json!({"entities": []})]);
        let extractor = Extractor::new(&llm, ChunkingConfig::default());
        let graph = extractor.extract("some paper text", None).await.unwrap();
        assert!(graph.is_empty());
    }

    #[tokio::test]
    async fn drops_orphan_and_self_loop_relationships_and_coerces_unknown_types() {
        let llm = ScriptedLlm::new(vec![
            serde_json::json!({"entities": [
                {"id": "nerf", "name": "NeRF", "type": "Method"},
                {"id": "psnr", "name": "PSNR", "type": "Metric"}
            ]}),
            serde_json::json!({"relationships": [
                {"source_id": "nerf", "target_id": "psnr", "type": "evaluated_on"},
                {"source_id": "nerf", "target_id": "nerf", "type": "uses"},
                {"source_id": "nerf", "target_id": "ghost", "type": "uses"},
                {"source_id": "psnr", "target_id": "nerf", "type": "something_unknown"}
            ]}),
        ]);

        let extractor = Extractor::new(&llm, ChunkingConfig::default());
        let graph = extractor.extract("text", None).await.unwrap();

        assert_eq!(graph.entities.len(), 2);
        assert_eq!(graph.relationships.len(), 2);
        assert!(graph.relationships.iter().any(|r| r.relationship_type == RelationshipType::EvaluatedOn));
        assert!(graph.relationships.iter().any(|r| r.relationship_type == RelationshipType::RelatedTo));
    }

    #[tokio::test]
    async fn chunking_unions_entities_and_dedupes_relationships() {
        let llm = ScriptedLlm::new(vec![
            serde_json::json!({"entities": [{"id": "nerf", "name": "NeRF", "type": "Method", "aliases": ["neural radiance field"]}]}),
            serde_json::json!({"relationships": []}),
            serde_json::json!({"entities": [{"id": "nerf", "name": "NeRF", "type": "Method", "aliases": ["nrf"]}, {"id": "psnr", "name": "PSNR", "type": "Metric"}]}),
            serde_json::json!({"relationships": [{"source_id": "nerf", "target_id": "psnr", "type": "evaluated_on"}]}),
        ]);

        let mut chunking = ChunkingConfig::default();
        chunking.enabled = true;
        chunking.max_chars = 1;

        let extractor = Extractor::new(&llm, chunking);
        let text = format!("{}\n\n{}", "a".repeat(5), "b".repeat(5));
        let graph = extractor.extract(&text, None).await.unwrap();

        assert_eq!(graph.entities.len(), 2);
        let nerf = graph.entities.iter().find(|e| e.id == "nerf").unwrap();
        assert_eq!(nerf.aliases.as_ref().unwrap().len(), 2);
        assert_eq!(graph.relationships.len(), 1);
    }
}
