use common::{
    error::AppError,
    types::{Chunk, Document, DocumentContent},
};
use tracing::debug;

/// Splits one document's extracted text into overlapping passages bounded by
/// a character budget. Deterministic: the same document always produces the
/// same ordered chunk sequence with the same ids.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, AppError> {
        if chunk_size == 0 {
            return Err(AppError::Validation(
                "chunk_size must be greater than zero".into(),
            ));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let content = extract_content(document);
        let pieces = self.split_into_pieces(&content);
        let total = pieces.len();

        debug!(
            document_id = %document.id,
            chunk_count = total,
            "Chunked document"
        );

        pieces
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk::new(&document.id, text, index, total))
            .collect()
    }

    /// Greedy sentence accumulation: close a chunk when the next sentence
    /// would blow the character budget, then seed the next chunk with the
    /// trailing words of the previous one to preserve boundary context.
    fn split_into_pieces(&self, content: &str) -> Vec<String> {
        let sentences: Vec<&str> = content
            .split(['.', '!', '?'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        for sentence in sentences {
            if current.len() + sentence.len() > self.chunk_size && !current.is_empty() {
                let overlap = trailing_words(&current, self.chunk_overlap / 10);
                chunks.push(std::mem::take(&mut current));

                current = overlap;
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(sentence);
            } else {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(sentence);
            }
        }

        if !current.trim().is_empty() {
            chunks.push(current);
        }

        // A document with no extractable sentences still yields one chunk.
        if chunks.is_empty() {
            chunks.push(content.to_owned());
        }

        chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

/// Plain text for chunking. Opaque attachments degrade to a synthetic
/// description built from metadata; real extraction is out of scope here.
pub(crate) fn extract_content(document: &Document) -> String {
    match &document.content {
        DocumentContent::Text(text) if !text.trim().is_empty() => text.clone(),
        _ => synthetic_description(document),
    }
}

fn synthetic_description(document: &Document) -> String {
    format!(
        "Document Title: {}\nSubject: {}\nThis document contains educational content about {}.",
        document.title, document.subject, document.subject
    )
}

fn trailing_words(text: &str, count: usize) -> String {
    if count == 0 {
        return String::new();
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(count);
    words[start..].join(" ")
}
