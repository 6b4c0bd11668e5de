use tracing::debug;

use crate::{RerankedCandidate, RetrievalCandidate};

/// Flat bonus subjects: documents filed under a core academic subject get a
/// small boost regardless of query overlap.
const CORE_SUBJECTS: [&str; 5] = [
    "mathematics",
    "science",
    "history",
    "english",
    "computer science",
];

/// Score boost when a query token appears in the document title.
const TITLE_MATCH_BONUS: f32 = 0.3;
/// Score boost when a query token appears in the document subject.
const SUBJECT_MATCH_BONUS: f32 = 0.2;
/// Score boost per literal occurrence of a query token in the chunk text.
/// Deliberately unbounded; repeated keywords keep accumulating.
const CONTENT_MATCH_BONUS: f32 = 0.1;
const CORE_SUBJECT_BONUS: f32 = 0.1;
/// Chunks under this many characters are treated as near-empty.
const SHORT_CHUNK_CHARS: usize = 50;
const SHORT_CHUNK_PENALTY: f32 = 0.8;

/// Second-pass scorer over the index's candidates, layering lexical and
/// metadata signals the cosine search ignores.
#[derive(Debug, Clone)]
pub struct Reranker {
    top_n: usize,
}

impl Reranker {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    /// Re-scores candidates and returns the best `top_n`, sorted descending
    /// by rerank score. The sort is stable: equal scores keep the index's
    /// candidate order.
    pub fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievalCandidate>,
    ) -> Vec<RerankedCandidate> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let query_tokens: Vec<String> = tokenize(query).collect();
        let total = candidates.len();

        let mut scored: Vec<RerankedCandidate> = candidates
            .into_iter()
            .map(|candidate| {
                let score = score_candidate(&candidate, &query_tokens);
                RerankedCandidate::from_candidate(candidate, score)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(self.top_n);

        debug!(
            candidates = total,
            kept = scored.len(),
            "Reranked retrieval candidates"
        );

        scored
    }
}

impl Default for Reranker {
    fn default() -> Self {
        Self::new(3)
    }
}

fn score_candidate(candidate: &RetrievalCandidate, query_tokens: &[String]) -> f32 {
    let mut score = candidate.similarity;

    let content = candidate.chunk.text.to_lowercase();
    let title = candidate.meta.title.to_lowercase();
    let subject = candidate.meta.subject.to_lowercase();

    for token in query_tokens {
        if title.contains(token.as_str()) {
            score += TITLE_MATCH_BONUS;
        }
        if subject.contains(token.as_str()) {
            score += SUBJECT_MATCH_BONUS;
        }
        score += content.matches(token.as_str()).count() as f32 * CONTENT_MATCH_BONUS;
    }

    if CORE_SUBJECTS.iter().any(|core| subject.contains(core)) {
        score += CORE_SUBJECT_BONUS;
    }

    if candidate.chunk.text.len() < SHORT_CHUNK_CHARS {
        score *= SHORT_CHUNK_PENALTY;
    }

    score
}

/// Same token shape the embedder uses: lowercase, punctuation stripped,
/// tokens under three characters dropped.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.len() > 2)
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::{Chunk, DocumentMeta};

    fn candidate(
        document_id: &str,
        title: &str,
        subject: &str,
        text: &str,
        similarity: f32,
    ) -> RetrievalCandidate {
        RetrievalCandidate {
            chunk: Chunk::new(document_id, text.into(), 0, 1),
            meta: DocumentMeta {
                document_id: document_id.into(),
                title: title.into(),
                subject: subject.into(),
            },
            similarity,
        }
    }

    #[test]
    fn empty_input_returns_empty() {
        assert!(Reranker::default().rerank("any question", Vec::new()).is_empty());
    }

    #[test]
    fn never_returns_more_than_top_n() {
        let candidates = (0..10)
            .map(|i| {
                candidate(
                    &format!("doc-{i}"),
                    "Some Notes",
                    "General",
                    "A reasonably long chunk of text about studying for exams properly.",
                    0.5,
                )
            })
            .collect();

        let reranked = Reranker::new(3).rerank("studying for exams", candidates);

        assert_eq!(reranked.len(), 3);
        for pair in reranked.windows(2) {
            assert!(pair[0].rerank_score >= pair[1].rerank_score);
        }
    }

    #[test]
    fn title_and_subject_matches_outrank_plain_similarity() {
        let plain = candidate(
            "doc-plain",
            "Miscellaneous Notes",
            "General",
            "Unrelated chunk text that happens to be long enough to avoid penalties.",
            0.5,
        );
        let boosted = candidate(
            "doc-algebra",
            "Algebra Basics",
            "Mathematics",
            "A variable represents an unknown value in algebra equations and more.",
            0.4,
        );

        let reranked =
            Reranker::new(2).rerank("what is a variable in algebra", vec![plain, boosted]);

        assert_eq!(reranked[0].meta.document_id, "doc-algebra");
        assert!(reranked[0].rerank_score > reranked[1].rerank_score);
    }

    #[test]
    fn repeated_content_matches_accumulate() {
        let once = candidate(
            "doc-once",
            "Notes",
            "General",
            "The variable appears here just once in this long enough sentence.",
            0.5,
        );
        let stuffed = candidate(
            "doc-stuffed",
            "Notes",
            "General",
            "variable variable variable variable padding words to exceed fifty characters",
            0.5,
        );

        let reranked = Reranker::new(2).rerank("variable", vec![once, stuffed]);

        assert_eq!(reranked[0].meta.document_id, "doc-stuffed");
    }

    #[test]
    fn short_chunks_are_penalized() {
        let short = candidate("doc-short", "Notes", "General", "Tiny chunk.", 1.0);
        let long = candidate(
            "doc-long",
            "Notes",
            "General",
            "This chunk is comfortably longer than fifty characters of content.",
            1.0,
        );

        let reranked = Reranker::new(2).rerank("anything", vec![short, long]);

        assert_eq!(reranked[0].meta.document_id, "doc-long");
        assert!((reranked[1].rerank_score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn core_subject_gets_flat_bonus() {
        let general = candidate(
            "doc-general",
            "Notes",
            "Philosophy",
            "Identical chunk text long enough to dodge the short-chunk penalty.",
            0.5,
        );
        let core = candidate(
            "doc-core",
            "Notes",
            "Mathematics",
            "Identical chunk text long enough to dodge the short-chunk penalty.",
            0.5,
        );

        let reranked = Reranker::new(2).rerank("unmatched tokens", vec![general, core]);

        assert_eq!(reranked[0].meta.document_id, "doc-core");
        assert!((reranked[0].rerank_score - reranked[1].rerank_score - 0.1).abs() < 1e-6);
    }

    #[test]
    fn equal_scores_keep_candidate_order() {
        let first = candidate(
            "doc-first",
            "Notes",
            "General",
            "Identical chunk text long enough to dodge the short-chunk penalty.",
            0.5,
        );
        let second = candidate(
            "doc-second",
            "Notes",
            "General",
            "Identical chunk text long enough to dodge the short-chunk penalty.",
            0.5,
        );

        let reranked = Reranker::new(2).rerank("unmatched tokens", vec![first, second]);

        assert_eq!(reranked[0].meta.document_id, "doc-first");
        assert_eq!(reranked[1].meta.document_id, "doc-second");
    }
}
