use async_trait::async_trait;
use common::{error::AppError, types::Document};

/// Source of the corpus. The pipeline only ever reads from it; failures
/// during a rebuild leave the previous index snapshot intact.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Document>, AppError>;
}

/// Fixed in-memory corpus, for embedding callers that already hold their
/// documents and for tests.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    documents: Vec<Document>,
}

impl InMemoryRepository {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl DocumentRepository for InMemoryRepository {
    async fn list(&self) -> Result<Vec<Document>, AppError> {
        Ok(self.documents.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::DocumentContent;

    #[tokio::test]
    async fn in_memory_repository_lists_its_documents() {
        let repository = InMemoryRepository::new(vec![Document::new(
            "doc-1",
            "Algebra Basics",
            "Mathematics",
            DocumentContent::Text("Equations balance both sides.".into()),
        )]);

        let documents = repository.list().await.expect("list should succeed");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, "doc-1");
    }
}
