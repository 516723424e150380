//! Entity-type refinement in fixed-size batches (§4.5).

use std::collections::HashMap;

use kg_core::prelude::*;
use tracing::warn;

use crate::dto::DefinerResponse;

pub const DEFINER_BATCH_SIZE: usize = 50;

const DEFINER_SYSTEM_PROMPT: &str = "You are a taxonomist for an academic knowledge graph. Given a list of \
entities with their current name and type, refine each entity's `type` (and `name` if it is malformed) to one \
of the standardized types: Method, Metric, Task, Dataset, Concept, Author, Conference. Return strictly JSON: \
{\"entities\": [{\"id\": ..., \"name\": ..., \"type\": ...}]}.";

pub struct Definer<'a> {
    llm: &'a dyn LlmAdapter,
}

impl<'a> Definer<'a> {
    pub fn new(llm: &'a dyn LlmAdapter) -> Self {
        Self { llm }
    }

    pub async fn define(&self, graph: GraphData) -> Result<GraphData, EdcError> {
        let GraphData {
            mut entities,
            relationships,
            referenced_entity_ids,
        } = graph;

        for batch in entities.chunks_mut(DEFINER_BATCH_SIZE) {
            self.define_batch(batch).await?;
        }

        Ok(GraphData {
            entities,
            relationships,
            referenced_entity_ids,
        })
    }

    async fn define_batch(&self, batch: &mut [Entity]) -> Result<(), EdcError> {
        let refs: Vec<serde_json::Value> = batch
            .iter()
            .map(|e| serde_json::json!({"id": e.id, "name": e.name, "type": e.entity_type}))
            .collect();

        let value = self
            .llm
            .json(JsonRequest {
                system: DEFINER_SYSTEM_PROMPT.to_string(),
                user: serde_json::to_string(&refs)
                    .map_err(|e| EdcError::DefinitionFailed(format!("failed to serialize batch: {e}")))?,
                schema_hint: serde_json::json!({"entities": "array"}),
            })
            .await
            .map_err(|e| EdcError::DefinitionFailed(e.to_string()))?;

        let parsed: DefinerResponse = serde_json::from_value(value)
            .map_err(|e| EdcError::DefinitionFailed(format!("definer response did not match the schema: {e}")))?;

        let refined: HashMap<String, (String, String)> = parsed
            .entities
            .into_iter()
            .map(|r| (r.id, (r.name, r.entity_type)))
            .collect();

        for entity in batch.iter_mut() {
            match refined.get(&entity.id) {
                Some((name, entity_type)) => {
                    entity.name = name.clone();
                    entity.entity_type = entity_type.clone();
                }
                None => {
                    warn!(id = %entity.id, "definer did not return a refinement for this entity, keeping original");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct ScriptedLlm {
        response: serde_json::Value,
    }

    #[async_trait]
    impl LlmAdapter for ScriptedLlm {
        async fn json(&self, _req: JsonRequest) -> Result<serde_json::Value, LlmError> {
            Ok(self.response.clone())
        }

        async fn chat(&self, _req: ChatRequest) -> Result<String, LlmError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn adopts_refined_type_and_name_preserving_other_fields() {
        let llm = ScriptedLlm {
            response: serde_json::json!({"entities": [{"id": "e1", "name": "NeRF", "type": "Method"}]}),
        };
        let definer = Definer::new(&llm);

        let entity = Entity::new("e1", "nerf", "thing").with_description("a neural method");
        let graph = GraphData {
            entities: vec![entity],
            relationships: vec![],
            referenced_entity_ids: None,
        };

        let refined = definer.define(graph).await.unwrap();
        assert_eq!(refined.entities[0].name, "NeRF");
        assert_eq!(refined.entities[0].entity_type, "Method");
        assert_eq!(refined.entities[0].description.as_deref(), Some("a neural method"));
    }

    #[tokio::test]
    async fn keeps_original_when_definer_omits_an_id() {
        let llm = ScriptedLlm {
            response: serde_json::json!({"entities": []}),
        };
        let definer = Definer::new(&llm);

        let graph = GraphData {
            entities: vec![Entity::new("e1", "nerf", "thing")],
            relationships: vec![],
            referenced_entity_ids: None,
        };

        let refined = definer.define(graph).await.unwrap();
        assert_eq!(refined.entities[0].entity_type, "thing");
    }

    #[tokio::test]
    async fn malformed_response_is_fatal() {
        let llm = ScriptedLlm {
            response: serde_json::json!({"not_entities": []}),
        };
        let definer = Definer::new(&llm);

        let graph = GraphData {
            entities: vec![Entity::new("e1", "nerf", "thing")],
            relationships: vec![],
            referenced_entity_ids: None,
        };

        let err = definer.define(graph).await.unwrap_err();
        assert!(matches!(err, EdcError::DefinitionFailed(_)));
    }
}
