//! Pure, deterministic within-document deduplication (§4.6). No LLM calls.

use std::collections::HashMap;

use indexmap::IndexMap;
use kg_core::types::{Entity, GraphData};

pub fn canonicalize(graph: GraphData) -> GraphData {
    let mut unique_by_name: IndexMap<String, Entity> = IndexMap::new();
    let mut id_remap: HashMap<String, String> = HashMap::new();

    for entity in graph.entities {
        if entity.name.trim().is_empty() {
            continue;
        }
        let key = entity.name.trim().to_lowercase();
        match unique_by_name.get(&key) {
            Some(existing) => {
                id_remap.insert(entity.id.clone(), existing.id.clone());
            }
            None => {
                unique_by_name.insert(key, entity);
            }
        }
    }

    let entities: Vec<Entity> = unique_by_name.into_values().collect();

    let relationships = graph
        .relationships
        .into_iter()
        .map(|mut r| {
            r.source_id = id_remap.get(&r.source_id).cloned().unwrap_or(r.source_id);
            r.target_id = id_remap.get(&r.target_id).cloned().unwrap_or(r.target_id);
            r
        })
        .filter(|r| !r.is_self_loop())
        .collect();

    GraphData {
        entities,
        relationships,
        referenced_entity_ids: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kg_core::types::{Relationship, RelationshipType};

    #[test]
    fn dedupes_entities_by_lowercased_trimmed_name_preserving_insertion_order() {
        let graph = GraphData {
            entities: vec![
                Entity::new("e1", "NeRF", "Method"),
                Entity::new("e2", " nerf ", "Method"),
                Entity::new("e3", "PSNR", "Metric"),
            ],
            relationships: vec![],
            referenced_entity_ids: None,
        };

        let result = canonicalize(graph);
        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.entities[0].id, "e1");
        assert_eq!(result.entities[1].id, "e3");
    }

    #[test]
    fn rewrites_relationships_through_the_remap_and_drops_new_self_loops() {
        let graph = GraphData {
            entities: vec![Entity::new("e1", "NeRF", "Method"), Entity::new("e2", "nerf", "Method")],
            relationships: vec![Relationship::new("e2", "e1", RelationshipType::RelatedTo)],
            referenced_entity_ids: None,
        };

        let result = canonicalize(graph);
        assert_eq!(result.entities.len(), 1);
        assert!(result.relationships.is_empty());
    }

    #[test]
    fn skips_entities_with_empty_name() {
        let graph = GraphData {
            entities: vec![Entity::new("e1", "", "Method"), Entity::new("e2", "  ", "Method")],
            relationships: vec![],
            referenced_entity_ids: None,
        };

        let result = canonicalize(graph);
        assert!(result.entities.is_empty());
    }

    #[test]
    fn output_never_carries_referenced_entity_ids() {
        let graph = GraphData {
            entities: vec![Entity::new("e1", "NeRF", "Method")],
            relationships: vec![],
            referenced_entity_ids: Some(["foo".to_string()].into_iter().collect()),
        };

        let result = canonicalize(graph);
        assert!(result.referenced_entity_ids.is_none());
    }
}
