pub mod chunker;
pub mod embedder;
pub mod generator;
pub mod index;
pub mod pipeline;
pub mod quiz;
pub mod repository;
pub mod reranker;

use common::types::{Chunk, DocumentMeta};

pub use pipeline::{PipelineStatus, PipelineTuning, QueryOutcome, RagPipeline, TuningUpdate};

/// A chunk surfaced by the vector index, scored by cosine similarity.
#[derive(Debug, Clone)]
pub struct RetrievalCandidate {
    pub chunk: Chunk,
    pub meta: DocumentMeta,
    pub similarity: f32,
}

/// A retrieval candidate after the second-pass lexical rerank.
#[derive(Debug, Clone)]
pub struct RerankedCandidate {
    pub chunk: Chunk,
    pub meta: DocumentMeta,
    pub similarity: f32,
    pub rerank_score: f32,
}

impl RerankedCandidate {
    pub fn from_candidate(candidate: RetrievalCandidate, rerank_score: f32) -> Self {
        Self {
            chunk: candidate.chunk,
            meta: candidate.meta,
            similarity: candidate.similarity,
            rerank_score,
        }
    }
}
