//! Core data model: Entity, Relationship, GraphData, PreparsedPaperContext

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Dimensionality every stored embedding must have (I6)
pub const EMBEDDING_DIM: usize = 768;

/// The standardized entity types the Definer normalizes toward (§4.5). The
/// set on `Entity::entity_type` itself stays open (spec.md §3, "...").
pub const STANDARD_ENTITY_TYPES: &[&str] = &[
    "Method",
    "Metric",
    "Task",
    "Dataset",
    "Concept",
    "Author",
    "Conference",
];

/// A node in the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default = "default_version")]
    pub version: i64,
}

fn default_version() -> i64 {
    1
}

impl Entity {
    /// Create a minimal entity with version 1, as produced fresh by the Extractor
    pub fn new(id: impl Into<String>, name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            entity_type: entity_type.into(),
            description: None,
            aliases: None,
            metadata: None,
            embedding: None,
            version: 1,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = Some(aliases);
        self
    }

    /// The deterministic rendering used for embeddings (§4.2, I6):
    /// "{name} ({type}): {description}", whitespace trimmed.
    pub fn render(&self) -> String {
        crate::render::render_entity(&self.name, &self.entity_type, self.description.as_deref())
    }
}

/// The closed relationship vocabulary from spec.md §3. Unknown types parsed
/// from an LLM response are coerced to `RelatedTo` (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    ImprovesOn,
    Uses,
    EvaluatedOn,
    Achieves,
    Proposes,
    Addresses,
    RelatedTo,
    BasedOn,
    Cites,
    Extends,
    Introduces,
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::ImprovesOn => "improves_on",
            RelationshipType::Uses => "uses",
            RelationshipType::EvaluatedOn => "evaluated_on",
            RelationshipType::Achieves => "achieves",
            RelationshipType::Proposes => "proposes",
            RelationshipType::Addresses => "addresses",
            RelationshipType::RelatedTo => "related_to",
            RelationshipType::BasedOn => "based_on",
            RelationshipType::Cites => "cites",
            RelationshipType::Extends => "extends",
            RelationshipType::Introduces => "introduces",
        }
    }
}

impl FromStr for RelationshipType {
    type Err = std::convert::Infallible;

    /// Unknown values coerce to `RelatedTo` rather than erroring, per
    /// spec.md §4.4 ("unknown types are coerced to related_to").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "improves_on" => RelationshipType::ImprovesOn,
            "uses" => RelationshipType::Uses,
            "evaluated_on" => RelationshipType::EvaluatedOn,
            "achieves" => RelationshipType::Achieves,
            "proposes" => RelationshipType::Proposes,
            "addresses" => RelationshipType::Addresses,
            "based_on" => RelationshipType::BasedOn,
            "cites" => RelationshipType::Cites,
            "extends" => RelationshipType::Extends,
            "introduces" => RelationshipType::Introduces,
            _ => RelationshipType::RelatedTo,
        })
    }
}

/// A directed edge between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_paper_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Relationship {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: RelationshipType,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type,
            description: None,
            confidence: None,
            source_paper_id: None,
            metadata: None,
        }
    }

    /// I4: a self-loop is never persisted
    pub fn is_self_loop(&self) -> bool {
        self.source_id == self.target_id
    }
}

/// A fragment produced by a single pipeline run (§3) — the unit of
/// exchange between Extractor, Definer, Canonicalizer, Integration, and
/// the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphData {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_entity_ids: Option<HashSet<String>>,
}

impl GraphData {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    /// The set of ids a relationship is allowed to reference without being
    /// dropped as an orphan at the store boundary (§4.1).
    pub fn valid_reference_ids(&self) -> HashSet<&str> {
        let mut ids: HashSet<&str> = self.entities.iter().map(|e| e.id.as_str()).collect();
        if let Some(referenced) = &self.referenced_entity_ids {
            ids.extend(referenced.iter().map(|s| s.as_str()));
        }
        ids
    }
}

/// An author entry inside pre-parsed paper metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperAuthor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Publication metadata inside pre-parsed paper context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicationInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
}

/// Structured paper metadata produced by the Pre-Parser (§4.7) and
/// consumed by the Extractor (§4.4) to steer extraction prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreparsedPaperContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<PaperAuthor>,
    #[serde(default, rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub main_findings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methodology: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discussion: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication: Option<PublicationInfo>,
}

/// Decision recorded by the Integration resolver for one new entity (§4.9)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeDecision {
    pub new_id: String,
    pub target_id: String,
    pub action: MergeAction,
    pub confidence: f32,
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MergeAction {
    Merge,
    Create,
}

/// Counters returned by `GraphStore::upsert_graph`, consumed by the CLI and
/// the agentic controller's `processPaper`/`summarizeKnowledgeGraph` tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpsertSummary {
    pub entities_upserted: usize,
    pub relationships_inserted: usize,
    pub relationships_dropped_orphan: usize,
}

/// Aggregate counters for the Integration workflow (§4.9, §8 Integration law)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrationStats {
    pub entities_processed: usize,
    pub entities_merged: usize,
    pub entities_created: usize,
}

pub type CandidateMap = HashMap<String, Vec<Entity>>;

/// One row of the entity-type breakdown in `GraphSummary`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTypeCount {
    pub entity_type: String,
    pub count: i64,
}

/// Aggregate counters backing the agentic controller's
/// `summarizeKnowledgeGraph` tool (§4.11).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSummary {
    pub total_entities: i64,
    pub total_relationships: i64,
    pub top_entity_types: Vec<EntityTypeCount>,
}
