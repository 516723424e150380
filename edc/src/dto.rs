//! Stage A/B and Definer response shapes. Field-alias tolerance
//! (`"entities"`/`"nodes"`, `"relationships"`/`"edges"`) lives here, not in
//! the LLM adapter (§4.3): the adapter only guarantees valid JSON.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct StageAResponse {
    #[serde(alias = "nodes")]
    pub entities: Vec<ExtractedEntity>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractedEntity {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub aliases: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct StageBResponse {
    #[serde(alias = "edges")]
    pub relationships: Vec<ExtractedRelationship>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractedRelationship {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct DefinerResponse {
    pub entities: Vec<RefinedEntity>,
}

#[derive(Debug, Deserialize)]
pub struct RefinedEntity {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}
