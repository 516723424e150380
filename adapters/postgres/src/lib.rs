//! `GraphStore` over PostgreSQL + pgvector (§4.1)

pub mod config;

use async_trait::async_trait;
use config::PgConfig;
use futures::stream::{self, StreamExt};
use kg_core::prelude::*;
use pgvector::Vector;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

const SERIALIZATION_FAILURE: &str = "40001";
const SIMILARITY_BATCH_CONCURRENCY: usize = 5;

fn is_serialization_failure(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(SERIALIZATION_FAILURE))
}

/// `GraphStore` implementation grounded on the pool-holding repository
/// pattern in `pg_repository.rs` and the transaction/retry discipline of
/// the teacher's Neo4j adapter.
pub struct PgGraphStore {
    pool: PgPool,
    embedder: std::sync::Arc<dyn EmbeddingAdapter>,
}

impl PgGraphStore {
    pub async fn connect(config: &PgConfig, embedder: std::sync::Arc<dyn EmbeddingAdapter>) -> Result<Self, GraphError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
            .connect(&config.dsn)
            .await
            .map_err(|e| GraphError::ConnectionFailed(e.to_string()))?;

        Ok(Self { pool, embedder })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// One attempt at `upsert_graph`, run inside a SERIALIZABLE
    /// transaction. Returns the raw sqlx error on failure so the caller
    /// can classify serialization failures for retry.
    async fn upsert_graph_once(
        &self,
        graph: &GraphData,
        precomputed: &[Vec<f32>],
    ) -> Result<UpsertSummary, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let mut entities_upserted = 0usize;
        for (entity, embedding) in graph.entities.iter().zip(precomputed) {
            let aliases = serde_json::to_value(&entity.aliases).unwrap_or(serde_json::Value::Null);
            sqlx::query(
                r#"
                INSERT INTO entities (id, name, type, description, aliases, metadata, embedding, version)
                VALUES ($1, $2, $3, $4, $5, $6, $7, 1)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    type = EXCLUDED.type,
                    description = EXCLUDED.description,
                    aliases = EXCLUDED.aliases,
                    metadata = EXCLUDED.metadata,
                    embedding = EXCLUDED.embedding,
                    version = entities.version + 1
                "#,
            )
            .bind(&entity.id)
            .bind(&entity.name)
            .bind(&entity.entity_type)
            .bind(&entity.description)
            .bind(aliases)
            .bind(&entity.metadata)
            .bind(Vector::from(embedding.clone()))
            .execute(&mut *tx)
            .await?;
            entities_upserted += 1;
        }

        let valid_ids: HashSet<&str> = graph.valid_reference_ids();
        let mut relationships_inserted = 0usize;
        let mut relationships_dropped_orphan = 0usize;
        for rel in &graph.relationships {
            if rel.is_self_loop() {
                continue;
            }
            if !valid_ids.contains(rel.source_id.as_str()) || !valid_ids.contains(rel.target_id.as_str()) {
                warn!(
                    source = %rel.source_id,
                    target = %rel.target_id,
                    "dropping relationship referencing an entity outside this fragment"
                );
                relationships_dropped_orphan += 1;
                continue;
            }

            let result = sqlx::query(
                r#"
                INSERT INTO relationships (source_id, target_id, type, description, confidence, source_paper_id, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (source_id, target_id, type) DO NOTHING
                "#,
            )
            .bind(&rel.source_id)
            .bind(&rel.target_id)
            .bind(rel.relationship_type.as_str())
            .bind(&rel.description)
            .bind(rel.confidence)
            .bind(&rel.source_paper_id)
            .bind(&rel.metadata)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                relationships_inserted += 1;
            }
        }

        tx.commit().await?;

        Ok(UpsertSummary {
            entities_upserted,
            relationships_inserted,
            relationships_dropped_orphan,
        })
    }

    fn row_to_entity(row: &sqlx::postgres::PgRow) -> Result<Entity, sqlx::Error> {
        let aliases: Option<serde_json::Value> = row.try_get("aliases")?;
        let aliases = aliases.and_then(|v| serde_json::from_value(v).ok());
        let embedding: Option<Vector> = row.try_get("embedding")?;

        Ok(Entity {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            entity_type: row.try_get("type")?,
            description: row.try_get("description")?,
            aliases,
            metadata: row.try_get("metadata")?,
            embedding: embedding.map(|v| v.to_vec()),
            version: row.try_get("version")?,
        })
    }
}

#[async_trait]
impl GraphStore for PgGraphStore {
    async fn init(&self) -> Result<(), GraphError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| GraphError::MigrationFailed(e.to_string()))
    }

    async fn upsert_graph(&self, graph: GraphData) -> Result<UpsertSummary, GraphError> {
        // Embeddings are computed before the transaction opens so a slow
        // provider never sits on the critical path (spec.md §4.1).
        let mut precomputed = Vec::with_capacity(graph.entities.len());
        for entity in &graph.entities {
            let embedding = self
                .embedder
                .embed(&entity.render())
                .await
                .map_err(|e| GraphError::EmbeddingFailed(e.to_string()))?;
            precomputed.push(embedding);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.upsert_graph_once(&graph, &precomputed).await {
                Ok(summary) => return Ok(summary),
                Err(err) if is_serialization_failure(&err) && attempt <= 3 => {
                    let delay = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                    let jitter = Duration::from_millis(rand::random::<u64>() % 50);
                    warn!(attempt, "serialization failure on upsert_graph, retrying in {:?}", delay + jitter);
                    tokio::time::sleep(delay + jitter).await;
                }
                Err(err) if is_serialization_failure(&err) => {
                    return Err(GraphError::SerializationRetriesExhausted(err.to_string()));
                }
                Err(err) => return Err(GraphError::TransactionFailed(err.to_string())),
            }
        }
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

        let rows = sqlx::query(
            r#"
            SELECT id, name, type, description, aliases, metadata, embedding, version
            FROM entities
            WHERE embedding IS NOT NULL AND id != $2
            ORDER BY embedding <=> $1
            LIMIT $3
            "#,
        )
        .bind(Vector::from(embedding))
        .bind(&entity.id)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GraphError::QueryFailed(e.to_string()))?;

        rows.iter()
            .map(Self::row_to_entity)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| GraphError::QueryFailed(e.to_string()))
    }

    async fn fetch_similar_entities_batch(&self, entities: &[Entity], k: usize) -> Result<CandidateMap, GraphError> {
        let results: Vec<(String, Vec<Entity>)> = stream::iter(entities.iter())
            .map(|entity| async move {
                let candidates = self.fetch_similar_entities(entity, k).await?;
                Ok::<_, GraphError>((entity.id.clone(), candidates))
            })
            .buffer_unordered(SIMILARITY_BATCH_CONCURRENCY)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        let mut map = CandidateMap::new();
        for (id, candidates) in results {
            if !candidates.is_empty() {
                map.insert(id, candidates);
            }
        }
        debug!(count = map.len(), "fetch_similar_entities_batch complete");
        Ok(map)
    }

    async fn close(&self) -> Result<(), GraphError> {
        self.pool.close().await;
        Ok(())
    }

    async fn graph_summary(&self) -> Result<GraphSummary, GraphError> {
        let total_entities: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entities")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| GraphError::QueryFailed(e.to_string()))?;

        let total_relationships: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM relationships")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| GraphError::QueryFailed(e.to_string()))?;

        let rows = sqlx::query(
            r#"
            SELECT type, COUNT(*) AS count
            FROM entities
            GROUP BY type
            ORDER BY count DESC, type ASC
            LIMIT 10
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GraphError::QueryFailed(e.to_string()))?;

        let top_entity_types = rows
            .iter()
            .map(|row| {
                Ok(EntityTypeCount {
                    entity_type: row.try_get("type")?,
                    count: row.try_get("count")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| GraphError::QueryFailed(e.to_string()))?;

        Ok(GraphSummary {
            total_entities,
            total_relationships,
            top_entity_types,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_failure_detection_matches_postgres_sqlstate() {
        // sqlx::Error has no public constructor for Database errors outside
        // a live connection, so this exercises the sibling non-DB variants
        // to confirm they're never misclassified as retryable.
        let io_err = sqlx::Error::PoolTimedOut;
        assert!(!is_serialization_failure(&io_err));
    }
}
