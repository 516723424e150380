//! Wire shape the resolver's LLM prompt is parsed back into (§4.9).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ResolutionResponse {
    pub action: ResolutionAction,
    #[serde(default)]
    pub target_id: Option<String>,
    pub confidence: f32,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResolutionAction {
    Merge,
    Create,
}
