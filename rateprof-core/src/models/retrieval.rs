use serde::{Deserialize, Serialize};

/// Metadata stored next to each professor vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfessorMetadata {
    pub subject: String,
    pub stars: serde_json::Number,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
}

/// One nearest-neighbour hit, in the order the index ranked it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMatch {
    pub id: String,
    #[serde(default)]
    pub score: Option<f32>,
    pub metadata: ProfessorMetadata,
}
