use serde::{Deserialize, Serialize};

/// Identifies a document that backed a generated answer. The first entry in
/// a response's source list is the primary attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAttribution {
    pub document_id: String,
    pub title: String,
    pub subject: String,
    pub similarity_score: f32,
    pub rerank_score: f32,
}
