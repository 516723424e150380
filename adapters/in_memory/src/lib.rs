//! In-memory `GraphStore` for tests and local development. Brute-force
//! cosine similarity stands in for pgvector's HNSW index — fine at the
//! sizes this adapter is meant for.

use async_trait::async_trait;
use kg_core::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    pub max_entities: Option<usize>,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_entities: Some(100_000),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryStore {
    entities: HashMap<String, Entity>,
    relationships: HashMap<(String, String, RelationshipType), Relationship>,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl MemoryStore {
    /// Nearest `k` entities to `embedding` by cosine similarity, excluding
    /// `exclude_id` and any entity with no embedding.
    fn nearest(&self, embedding: &[f32], exclude_id: &str, k: usize) -> Vec<Entity> {
        let mut scored: Vec<(f32, &Entity)> = self
            .entities
            .values()
            .filter(|e| e.id != exclude_id)
            .filter_map(|e| e.embedding.as_ref().map(|emb| (cosine_similarity(embedding, emb), e)))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(k).map(|(_, e)| e.clone()).collect()
    }
}

/// `GraphStore` backed by an in-process `RwLock<MemoryStore>`, grounded on
/// the teacher's `adapters/in_memory` shape.
pub struct InMemoryStore {
    store: Arc<RwLock<MemoryStore>>,
    embedder: Arc<dyn EmbeddingAdapter>,
    config: InMemoryConfig,
}

impl InMemoryStore {
    pub fn new(embedder: Arc<dyn EmbeddingAdapter>) -> Self {
        Self::with_config(embedder, InMemoryConfig::default())
    }

    pub fn with_config(embedder: Arc<dyn EmbeddingAdapter>, config: InMemoryConfig) -> Self {
        Self {
            store: Arc::new(RwLock::new(MemoryStore::default())),
            embedder,
            config,
        }
    }

    pub async fn entity_count(&self) -> usize {
        self.store.read().await.entities.len()
    }

    pub async fn clear(&self) {
        let mut store = self.store.write().await;
        *store = MemoryStore::default();
    }
}

#[async_trait]
impl GraphStore for InMemoryStore {
    async fn init(&self) -> Result<(), GraphError> {
        Ok(())
    }

    async fn upsert_graph(&self, graph: GraphData) -> Result<UpsertSummary, GraphError> {
        let valid_ids = graph.valid_reference_ids();
        let mut precomputed = Vec::with_capacity(graph.entities.len());
        for entity in &graph.entities {
            let embedding = self
                .embedder
                .embed(&entity.render())
                .await
                .map_err(|e| GraphError::EmbeddingFailed(e.to_string()))?;
            precomputed.push(embedding);
        }

        if let Some(max) = self.config.max_entities {
            let store = self.store.read().await;
            if store.entities.len() + graph.entities.len() > max {
                return Err(GraphError::ConstraintViolation(format!(
                    "maximum entity limit ({max}) would be exceeded"
                )));
            }
        }

        let mut store = self.store.write().await;
        let mut entities_upserted = 0;
        for (entity, embedding) in graph.entities.into_iter().zip(precomputed) {
            let mut entity = entity;
            entity.embedding = Some(embedding);
            match store.entities.get(&entity.id) {
                Some(existing) => entity.version = existing.version + 1,
                None => entity.version = 1,
            }
            store.entities.insert(entity.id.clone(), entity);
            entities_upserted += 1;
        }

        let mut relationships_inserted = 0;
        let mut relationships_dropped_orphan = 0;
        for rel in graph.relationships {
            if rel.is_self_loop() {
                continue;
            }
            if !valid_ids.contains(rel.source_id.as_str()) || !valid_ids.contains(rel.target_id.as_str()) {
                warn!(
                    source = %rel.source_id,
                    target = %rel.target_id,
                    "dropping relationship referencing unknown entity"
                );
                relationships_dropped_orphan += 1;
                continue;
            }
            let key = (rel.source_id.clone(), rel.target_id.clone(), rel.relationship_type);
            if !store.relationships.contains_key(&key) {
                store.relationships.insert(key, rel);
                relationships_inserted += 1;
            }
        }

        debug!(entities_upserted, relationships_inserted, relationships_dropped_orphan, "upsert_graph complete");

        Ok(UpsertSummary {
            entities_upserted,
            relationships_inserted,
            relationships_dropped_orphan,
        })
    }

    async fn fetch_similar_entities(&self, entity: &Entity, k: usize) -> Result<Vec<Entity>, GraphError> {
        let embedding = match &entity.embedding {
            Some(e) => e.clone(),
            None => self
                .embedder
                .embed(&entity.render())
                .await
                .map_err(|e| GraphError::EmbeddingFailed(e.to_string()))?,
        };
        let store = self.store.read().await;
        Ok(store.nearest(&embedding, &entity.id, k))
    }

    async fn fetch_similar_entities_batch(&self, entities: &[Entity], k: usize) -> Result<CandidateMap, GraphError> {
        let mut map = CandidateMap::new();
        for entity in entities {
            let candidates = self.fetch_similar_entities(entity, k).await?;
            if !candidates.is_empty() {
                map.insert(entity.id.clone(), candidates);
            }
        }
        Ok(map)
    }

    async fn close(&self) -> Result<(), GraphError> {
        Ok(())
    }

    async fn graph_summary(&self) -> Result<GraphSummary, GraphError> {
        let store = self.store.read().await;

        let mut counts: HashMap<&str, i64> = HashMap::new();
        for entity in store.entities.values() {
            *counts.entry(entity.entity_type.as_str()).or_insert(0) += 1;
        }
        let mut top_entity_types: Vec<EntityTypeCount> = counts
            .into_iter()
            .map(|(entity_type, count)| EntityTypeCount {
                entity_type: entity_type.to_string(),
                count,
            })
            .collect();
        top_entity_types.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.entity_type.cmp(&b.entity_type)));
        top_entity_types.truncate(10);

        Ok(GraphSummary {
            total_entities: store.entities.len() as i64,
            total_relationships: store.relationships.len() as i64,
            top_entity_types,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait as at;

    struct FakeEmbedder;

    #[at]
    impl EmbeddingAdapter for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            // Deterministic, content-sensitive fake embedding: length and
            // byte sum, so identical renderings match and differing
            // renderings don't collapse to the same vector.
            let sum: u32 = text.bytes().map(|b| b as u32).sum();
            Ok(vec![text.len() as f32, sum as f32])
        }
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new(Arc::new(FakeEmbedder))
    }

    #[tokio::test]
    async fn upserts_entities_and_increments_version_on_conflict() {
        let store = store();
        let entity = Entity::new("e1", "NeRF", "Method");
        let graph = GraphData {
            entities: vec![entity.clone()],
            relationships: vec![],
            referenced_entity_ids: None,
        };

        let summary = store.upsert_graph(graph.clone()).await.unwrap();
        assert_eq!(summary.entities_upserted, 1);

        let summary2 = store.upsert_graph(graph).await.unwrap();
        assert_eq!(summary2.entities_upserted, 1);
        assert_eq!(store.entity_count().await, 1);
    }

    #[tokio::test]
    async fn drops_relationships_referencing_unknown_entities() {
        let store = store();
        let e1 = Entity::new("e1", "NeRF", "Method");
        let rel = Relationship::new("e1", "e2", RelationshipType::Uses);
        let graph = GraphData {
            entities: vec![e1],
            relationships: vec![rel],
            referenced_entity_ids: None,
        };

        let summary = store.upsert_graph(graph).await.unwrap();
        assert_eq!(summary.relationships_inserted, 0);
        assert_eq!(summary.relationships_dropped_orphan, 1);
    }

    #[tokio::test]
    async fn drops_self_loop_relationships_silently() {
        let store = store();
        let e1 = Entity::new("e1", "NeRF", "Method");
        let rel = Relationship::new("e1", "e1", RelationshipType::RelatedTo);
        let graph = GraphData {
            entities: vec![e1],
            relationships: vec![rel],
            referenced_entity_ids: None,
        };

        let summary = store.upsert_graph(graph).await.unwrap();
        assert_eq!(summary.relationships_inserted, 0);
        assert_eq!(summary.relationships_dropped_orphan, 0);
    }

    #[tokio::test]
    async fn fetch_similar_entities_excludes_self() {
        let store = store();
        let e1 = Entity::new("e1", "NeRF", "Method");
        let e2 = Entity::new("e2", "NeRF", "Method");
        let graph = GraphData {
            entities: vec![e1.clone(), e2.clone()],
            relationships: vec![],
            referenced_entity_ids: None,
        };
        store.upsert_graph(graph).await.unwrap();

        let results = store.fetch_similar_entities(&e1, 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "e2");
    }

    #[tokio::test]
    async fn batch_omits_entities_with_no_candidates() {
        let store = store();
        let e1 = Entity::new("e1", "Solo", "Concept");
        store
            .upsert_graph(GraphData {
                entities: vec![e1.clone()],
                relationships: vec![],
                referenced_entity_ids: None,
            })
            .await
            .unwrap();

        let map = store.fetch_similar_entities_batch(&[e1], 5).await.unwrap();
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn graph_summary_aggregates_entity_types() {
        let store = store();
        store
            .upsert_graph(GraphData {
                entities: vec![
                    Entity::new("e1", "NeRF", "Method"),
                    Entity::new("e2", "PSNR", "Metric"),
                    Entity::new("e3", "Mip-NeRF", "Method"),
                ],
                relationships: vec![Relationship::new("e1", "e2", RelationshipType::Achieves)],
                referenced_entity_ids: None,
            })
            .await
            .unwrap();

        let summary = store.graph_summary().await.unwrap();
        assert_eq!(summary.total_entities, 3);
        assert_eq!(summary.total_relationships, 1);
        assert_eq!(summary.top_entity_types[0].entity_type, "Method");
        assert_eq!(summary.top_entity_types[0].count, 2);
    }
}
