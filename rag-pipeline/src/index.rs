use std::sync::Arc;

use common::types::{Chunk, DocumentMeta};
use tracing::debug;

use crate::{
    embedder::{cosine_similarity, Embedder},
    RetrievalCandidate,
};

/// Results strictly below this cosine similarity are dropped from search
/// results unless overridden.
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.1;

#[derive(Debug, Clone)]
struct IndexEntry {
    chunk: Chunk,
    meta: DocumentMeta,
    embedding: Arc<Vec<f32>>,
}

/// Exhaustive in-memory vector store over the current corpus snapshot.
///
/// Search is O(N) per query by design: corpora are tens to low hundreds of
/// chunks, and the exhaustive scan keeps scoring exact and explainable. A
/// built index is treated as an immutable snapshot by the orchestrator and
/// replaced wholesale on rebuild.
#[derive(Debug)]
pub struct VectorIndex {
    embedder: Arc<Embedder>,
    entries: Vec<IndexEntry>,
    min_similarity: f32,
}

impl VectorIndex {
    pub fn new(embedder: Arc<Embedder>) -> Self {
        Self::with_min_similarity(embedder, DEFAULT_MIN_SIMILARITY)
    }

    pub fn with_min_similarity(embedder: Arc<Embedder>, min_similarity: f32) -> Self {
        Self {
            embedder,
            entries: Vec::new(),
            min_similarity,
        }
    }

    /// Embeds and stores every chunk. Vectors that do not conform to the
    /// embedder's dimensionality are skipped rather than poisoning search.
    pub fn add_all(&mut self, chunks: Vec<(Chunk, DocumentMeta)>) {
        let expected = crate::embedder::EMBEDDING_DIMENSION;
        for (chunk, meta) in chunks {
            let embedding = self.embedder.embed(&chunk.text);
            if embedding.len() != expected {
                debug!(chunk_id = %chunk.id, "Dropping chunk with malformed embedding");
                continue;
            }
            self.entries.push(IndexEntry {
                chunk,
                meta,
                embedding,
            });
        }
        debug!(size = self.entries.len(), "Vector index updated");
    }

    /// Top-K cosine similarity search. An empty index returns an empty list,
    /// never an error. Ties keep insertion order (stable sort).
    pub fn search(&self, query: &str, top_k: usize) -> Vec<RetrievalCandidate> {
        if self.entries.is_empty() {
            return Vec::new();
        }

        let query_embedding = self.embedder.embed(query);

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(&query_embedding, &entry.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .filter(|(_, similarity)| *similarity > self.min_similarity)
            .take(top_k)
            .map(|(i, similarity)| RetrievalCandidate {
                chunk: self.entries[i].chunk.clone(),
                meta: self.entries[i].meta.clone(),
                similarity,
            })
            .collect()
    }

    /// Drops all entries and the embedder cache. Cleared state is
    /// indistinguishable from a freshly built empty index.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.embedder.clear_cache();
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(document_id: &str, title: &str, subject: &str) -> DocumentMeta {
        DocumentMeta {
            document_id: document_id.into(),
            title: title.into(),
            subject: subject.into(),
        }
    }

    fn entry(document_id: &str, text: &str) -> (Chunk, DocumentMeta) {
        (
            Chunk::new(document_id, text.into(), 0, 1),
            meta(document_id, "Title", "Mathematics"),
        )
    }

    fn built_index(chunks: Vec<(Chunk, DocumentMeta)>) -> VectorIndex {
        let mut index = VectorIndex::new(Arc::new(Embedder::new()));
        index.add_all(chunks);
        index
    }

    #[test]
    fn empty_index_returns_no_results() {
        let index = VectorIndex::new(Arc::new(Embedder::new()));
        assert!(index.search("anything at all", 10).is_empty());
        assert_eq!(index.size(), 0);
    }

    #[test]
    fn search_ranks_the_relevant_chunk_first() {
        let index = built_index(vec![
            entry(
                "doc-math",
                "To study math you should practice every problem with a clear method.",
            ),
            entry(
                "doc-history",
                "History research depends on careful analysis of primary information.",
            ),
        ]);

        let results = index.search("What is the best method to practice math problems?", 10);

        assert!(!results.is_empty());
        assert_eq!(results[0].meta.document_id, "doc-math");
        assert!(results[0].similarity > DEFAULT_MIN_SIMILARITY);
    }

    #[test]
    fn threshold_filters_weak_matches() {
        let index = built_index(vec![entry(
            "doc-1",
            "Photosynthesis converts light into chemical energy in plants.",
        )]);

        // Tokens share no vocabulary terms with the stored chunk; only the
        // stat features overlap, which stays under the cutoff for a strict
        // threshold.
        let mut strict = built_index(vec![entry(
            "doc-1",
            "Photosynthesis converts light into chemical energy in plants.",
        )]);
        strict.min_similarity = 0.999;
        assert!(strict
            .search("completely unrelated nonsense query", 10)
            .is_empty());

        let results = index.search("completely unrelated nonsense query", 10);
        assert!(results.len() < 10);
    }

    #[test]
    fn search_returns_at_most_top_k() {
        let chunks = (0..8)
            .map(|i| {
                entry(
                    &format!("doc-{i}"),
                    "Study the method and practice the problem with an example solution.",
                )
            })
            .collect();
        let index = built_index(chunks);

        let results = index.search("How should I study and practice this problem?", 3);
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn clear_empties_the_index() {
        let mut index = built_index(vec![entry("doc-1", "Study the concept with an example.")]);
        assert_eq!(index.size(), 1);

        index.clear();

        assert_eq!(index.size(), 0);
        assert!(index.search("study concept", 5).is_empty());
    }
}
