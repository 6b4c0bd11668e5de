use serde::{Deserialize, Serialize};

/// Metadata carried alongside every chunk so retrieval results can be
/// attributed without a lookup back into the corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub document_id: String,
    pub title: String,
    pub subject: String,
}

/// A bounded-size span of a document's text, the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

impl Chunk {
    /// Chunk ids are a stable composite of document id and position, so
    /// re-chunking the same document yields the same ids.
    pub fn new(document_id: &str, text: String, chunk_index: usize, total_chunks: usize) -> Self {
        Self {
            id: format!("{document_id}-chunk-{chunk_index}"),
            document_id: document_id.to_owned(),
            text,
            chunk_index,
            total_chunks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ids_are_stable_composites() {
        let a = Chunk::new("doc-7", "first pass".into(), 2, 5);
        let b = Chunk::new("doc-7", "second pass".into(), 2, 5);

        assert_eq!(a.id, "doc-7-chunk-2");
        assert_eq!(a.id, b.id);
    }
}
