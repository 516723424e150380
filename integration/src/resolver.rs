//! Per-entity MERGE/CREATE adjudication (§4.9).

use futures::stream::{self, StreamExt};
use kg_core::prelude::*;
use tracing::warn;

use crate::dto::{ResolutionAction, ResolutionResponse};

const RESOLVER_CONCURRENCY: usize = 10;

const RESOLVER_SYSTEM_PROMPT: &str = "You are deduplicating entities in an academic knowledge graph. Given a \
new entity and a list of candidate entities already in the graph, decide whether the new entity refers to the \
same real-world thing as one of the candidates. Return strictly JSON: {\"action\": \"MERGE\"|\"CREATE\", \
\"targetId\": ... (required if MERGE, the id of the matching candidate), \"confidence\": 0.0-1.0, \
\"rationale\": \"...\"}.";

/// Resolve every new entity against its candidates with bounded
/// parallelism, returning the id remapping and the decision log in one
/// pass (§4.9's Resolve stage).
pub async fn resolve_all(
    entities: &[Entity],
    candidates: &CandidateMap,
    llm: &dyn LlmAdapter,
) -> (std::collections::HashMap<String, String>, Vec<MergeDecision>) {
    let decisions: Vec<MergeDecision> = stream::iter(entities.iter())
        .map(|entity| {
            let candidates = candidates.get(&entity.id);
            async move { resolve_one(entity, candidates, llm).await }
        })
        .buffer_unordered(RESOLVER_CONCURRENCY)
        .collect()
        .await;

    let id_mapping = decisions.iter().map(|d| (d.new_id.clone(), d.target_id.clone())).collect();
    (id_mapping, decisions)
}

async fn resolve_one(entity: &Entity, candidates: Option<&Vec<Entity>>, llm: &dyn LlmAdapter) -> MergeDecision {
    let candidates = match candidates {
        Some(candidates) if !candidates.is_empty() => candidates,
        _ => {
            return MergeDecision {
                new_id: entity.id.clone(),
                target_id: entity.id.clone(),
                action: MergeAction::Create,
                confidence: 1.0,
                rationale: "no similar".to_string(),
            }
        }
    };

    let prompt_entity = serde_json::json!({"id": entity.id, "rendering": entity.render()});
    let prompt_candidates: Vec<serde_json::Value> = candidates
        .iter()
        .map(|c| serde_json::json!({"id": c.id, "rendering": c.render()}))
        .collect();

    let user = match serde_json::to_string(&serde_json::json!({
        "newEntity": prompt_entity,
        "candidates": prompt_candidates,
    })) {
        Ok(user) => user,
        Err(err) => return default_create(entity, err.to_string()),
    };

    let response = match llm
        .json(JsonRequest {
            system: RESOLVER_SYSTEM_PROMPT.to_string(),
            user,
            schema_hint: serde_json::json!({"action": "MERGE|CREATE", "targetId": "string?", "confidence": "number", "rationale": "string"}),
        })
        .await
    {
        Ok(value) => value,
        Err(err) => return default_create(entity, err.to_string()),
    };

    let parsed: ResolutionResponse = match serde_json::from_value(response) {
        Ok(parsed) => parsed,
        Err(err) => return default_create(entity, err.to_string()),
    };

    match parsed.action {
        ResolutionAction::Merge => match parsed.target_id {
            Some(target_id) => MergeDecision {
                new_id: entity.id.clone(),
                target_id,
                action: MergeAction::Merge,
                confidence: parsed.confidence,
                rationale: parsed.rationale,
            },
            None => default_create(entity, "MERGE action missing targetId".to_string()),
        },
        ResolutionAction::Create => MergeDecision {
            new_id: entity.id.clone(),
            target_id: entity.id.clone(),
            action: MergeAction::Create,
            confidence: parsed.confidence,
            rationale: parsed.rationale,
        },
    }
}

/// The sum-type-not-exception fallback (§4.9, §7, §9): a malformed or
/// failed resolution never aborts the run, it just becomes a
/// zero-confidence CREATE.
fn default_create(entity: &Entity, reason: String) -> MergeDecision {
    warn!(id = %entity.id, reason = %reason, "resolution defaulted to CREATE");
    MergeDecision {
        new_id: entity.id.clone(),
        target_id: entity.id.clone(),
        action: MergeAction::Create,
        confidence: 0.0,
        rationale: format!("defaulted to CREATE: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

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
    async fn no_candidates_creates_without_calling_the_llm() {
        let llm = ScriptedLlm {
            response: serde_json::json!({"not": "used"}),
        };
        let entity = Entity::new("e1", "NeRF", "Method");
        let decision = resolve_one(&entity, None, &llm).await;
        assert_eq!(decision.action, MergeAction::Create);
        assert_eq!(decision.confidence, 1.0);
        assert_eq!(decision.target_id, "e1");
        assert_eq!(decision.rationale, "no similar");
    }

    #[tokio::test]
    async fn merge_response_rewrites_target_id() {
        let llm = ScriptedLlm {
            response: serde_json::json!({"action": "MERGE", "targetId": "store-7", "confidence": 0.92, "rationale": "same method"}),
        };
        let entity = Entity::new("e1", "NeRF", "Method");
        let candidate = Entity::new("store-7", "Neural Radiance Fields", "Method");
        let decision = resolve_one(&entity, Some(&vec![candidate]), &llm).await;
        assert_eq!(decision.action, MergeAction::Merge);
        assert_eq!(decision.target_id, "store-7");
        assert_eq!(decision.confidence, 0.92);
    }

    #[tokio::test]
    async fn malformed_response_defaults_to_zero_confidence_create() {
        let llm = ScriptedLlm {
            response: serde_json::json!({"not_an_action": true}),
        };
        let entity = Entity::new("e1", "NeRF", "Method");
        let candidate = Entity::new("store-7", "Neural Radiance Fields", "Method");
        let decision = resolve_one(&entity, Some(&vec![candidate]), &llm).await;
        assert_eq!(decision.action, MergeAction::Create);
        assert_eq!(decision.confidence, 0.0);
        assert_eq!(decision.target_id, "e1");
    }

    #[tokio::test]
    async fn merge_without_target_id_defaults_to_create() {
        let llm = ScriptedLlm {
            response: serde_json::json!({"action": "MERGE", "confidence": 0.8, "rationale": "oops"}),
        };
        let entity = Entity::new("e1", "NeRF", "Method");
        let candidate = Entity::new("store-7", "Neural Radiance Fields", "Method");
        let decision = resolve_one(&entity, Some(&vec![candidate]), &llm).await;
        assert_eq!(decision.action, MergeAction::Create);
        assert_eq!(decision.confidence, 0.0);
    }

    #[tokio::test]
    async fn resolve_all_builds_id_mapping_and_log() {
        let llm = ScriptedLlm {
            response: serde_json::json!({"action": "CREATE", "confidence": 1.0, "rationale": "distinct"}),
        };
        let entities = vec![Entity::new("e1", "NeRF", "Method"), Entity::new("e2", "PSNR", "Metric")];
        let candidates: HashMap<String, Vec<Entity>> = HashMap::new();
        let (mapping, log) = resolve_all(&entities, &candidates, &llm).await;
        assert_eq!(mapping.len(), 2);
        assert_eq!(log.len(), 2);
        assert_eq!(mapping.get("e1"), Some(&"e1".to_string()));
    }
}
