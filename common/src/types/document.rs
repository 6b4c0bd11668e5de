use serde::{Deserialize, Serialize};

/// Raw material of a corpus document. Attachments are opaque references
/// (data URLs, storage keys); the pipeline never extracts text from them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentContent {
    Text(String),
    Attachment(String),
}

/// A corpus document as supplied by the document repository. Immutable from
/// the pipeline's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub subject: String,
    pub content: DocumentContent,
}

impl Document {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        subject: impl Into<String>,
        content: DocumentContent,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            subject: subject.into(),
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_roundtrips_through_json() {
        let document = Document::new(
            "doc-1",
            "Algebra Basics",
            "Mathematics",
            DocumentContent::Text("A variable represents an unknown value.".into()),
        );

        let json = serde_json::to_string(&document).expect("serialize document");
        let back: Document = serde_json::from_str(&json).expect("deserialize document");

        assert_eq!(back.id, document.id);
        assert_eq!(back.content, document.content);
    }
}
