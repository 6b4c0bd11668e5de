use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::{
    error::AppError,
    types::{Document, DocumentMeta, SourceAttribution},
};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    chunker::{self, Chunker},
    embedder::Embedder,
    generator::AnswerGenerator,
    index::VectorIndex,
    quiz::{self, QuizQuestion},
    repository::DocumentRepository,
    reranker::Reranker,
};

/// Tunable parameters governing each pipeline stage. Chunking parameters
/// apply on the next rebuild; retrieval parameters apply on the next query.
#[derive(Debug, Clone)]
pub struct PipelineTuning {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retrieval_top_k: usize,
    pub reranker_top_n: usize,
    pub min_similarity: f32,
    /// A corpus older than this is rebuilt even when its fingerprint is
    /// unchanged, guarding against repositories that drift silently.
    pub staleness_window: ChronoDuration,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            retrieval_top_k: 10,
            reranker_top_n: 3,
            min_similarity: crate::index::DEFAULT_MIN_SIMILARITY,
            staleness_window: ChronoDuration::minutes(30),
        }
    }
}

/// Partial tuning override for `update_config`; unset fields keep their
/// current values.
#[derive(Debug, Clone, Copy, Default)]
pub struct TuningUpdate {
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub retrieval_top_k: Option<usize>,
    pub reranker_top_n: Option<usize>,
}

/// Answer plus provenance. The first source, when present, is the primary
/// attribution for the answer.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub response: String,
    pub sources: Vec<SourceAttribution>,
}

/// Read-only observability snapshot.
#[derive(Debug, Clone)]
pub struct PipelineStatus {
    pub ready: bool,
    pub chunk_count: usize,
    pub last_build_time: Option<DateTime<Utc>>,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Default)]
struct BuildState {
    ready: bool,
    fingerprint: Option<String>,
    last_build: Option<DateTime<Utc>>,
    builds: u64,
}

/// Owns the pipeline lifecycle: rebuilds the index snapshot when the corpus
/// changes or goes stale, and drives retrieve → rerank → generate per query.
///
/// All components are constructor-injected; there is no ambient state. The
/// index snapshot is replaced atomically: builds happen entirely off to the
/// side and a single `Arc` swap publishes them, so in-flight queries see
/// either the old corpus or the new one, never a mix.
pub struct RagPipeline {
    repository: Arc<dyn DocumentRepository>,
    generator: AnswerGenerator,
    embedder: Arc<Embedder>,
    tuning: RwLock<PipelineTuning>,
    index: RwLock<Arc<VectorIndex>>,
    state: Mutex<BuildState>,
    // Supersession token: a newer query cancels the stale in-flight one.
    active_query: Mutex<CancellationToken>,
}

impl RagPipeline {
    pub fn new(repository: Arc<dyn DocumentRepository>, generator: AnswerGenerator) -> Self {
        Self::with_tuning(repository, generator, PipelineTuning::default())
    }

    pub fn with_tuning(
        repository: Arc<dyn DocumentRepository>,
        generator: AnswerGenerator,
        tuning: PipelineTuning,
    ) -> Self {
        let embedder = Arc::new(Embedder::new());
        let index = VectorIndex::with_min_similarity(Arc::clone(&embedder), tuning.min_similarity);
        Self {
            repository,
            generator,
            embedder,
            tuning: RwLock::new(tuning),
            index: RwLock::new(Arc::new(index)),
            state: Mutex::new(BuildState::default()),
            active_query: Mutex::new(CancellationToken::new()),
        }
    }

    /// Builds the index from `documents`, or from the repository when none
    /// are supplied. A no-op when the corpus fingerprint is unchanged and
    /// the pipeline is already ready. A repository failure is the only error
    /// that escapes, and it leaves the previous snapshot intact.
    #[instrument(skip_all)]
    pub async fn initialize(&self, documents: Option<Vec<Document>>) -> Result<(), AppError> {
        self.initialize_inner(documents, false).await
    }

    /// Forces a rebuild regardless of fingerprint and staleness.
    #[instrument(skip_all)]
    pub async fn reinitialize(&self, documents: Option<Vec<Document>>) -> Result<(), AppError> {
        self.initialize_inner(documents, true).await
    }

    async fn initialize_inner(
        &self,
        documents: Option<Vec<Document>>,
        force: bool,
    ) -> Result<(), AppError> {
        let documents = match documents {
            Some(documents) => documents,
            None => self.repository.list().await?,
        };
        let fingerprint = corpus_fingerprint(&documents);

        // Holding the state lock for the whole build serializes rebuilds;
        // queries only touch the index lock and keep flowing.
        let mut state = self.state.lock().await;
        if !force && state.ready && state.fingerprint.as_deref() == Some(fingerprint.as_str()) {
            info!(%fingerprint, "Corpus unchanged, skipping rebuild");
            return Ok(());
        }

        let tuning = self.tuning.read().await.clone();
        let chunker = Chunker::new(tuning.chunk_size, tuning.chunk_overlap)?;

        self.embedder.clear_cache();
        let mut next =
            VectorIndex::with_min_similarity(Arc::clone(&self.embedder), tuning.min_similarity);

        let mut pairs = Vec::new();
        for document in &documents {
            let meta = DocumentMeta {
                document_id: document.id.clone(),
                title: document.title.clone(),
                subject: document.subject.clone(),
            };
            for chunk in chunker.chunk(document) {
                pairs.push((chunk, meta.clone()));
            }
        }
        next.add_all(pairs);

        info!(
            documents = documents.len(),
            chunks = next.size(),
            %fingerprint,
            "Built index snapshot"
        );

        *self.index.write().await = Arc::new(next);
        state.ready = true;
        state.fingerprint = Some(fingerprint);
        state.last_build = Some(Utc::now());
        state.builds += 1;

        Ok(())
    }

    /// True when the index has never been built, when a supplied document
    /// list no longer matches the stored fingerprint, or when the staleness
    /// window has lapsed since the last successful build.
    pub async fn should_reinitialize(&self, documents: Option<&[Document]>) -> bool {
        let staleness_window = self.tuning.read().await.staleness_window;
        let state = self.state.lock().await;

        if !state.ready {
            return true;
        }

        if let Some(documents) = documents {
            let fingerprint = corpus_fingerprint(documents);
            if state.fingerprint.as_deref() != Some(fingerprint.as_str()) {
                info!("Document changes detected, reinitialization needed");
                return true;
            }
        }

        match state.last_build {
            Some(last_build) => {
                let stale = Utc::now() - last_build > staleness_window;
                if stale {
                    info!("Staleness window elapsed, reinitialization needed");
                }
                stale
            }
            None => true,
        }
    }

    /// Answers a question from the current corpus. A newer call supersedes
    /// any query still waiting on the generation service: the stale one is
    /// cancelled and returns `AppError::Cancelled`.
    #[instrument(skip_all, fields(question_chars = question.chars().count()))]
    pub async fn query(
        &self,
        question: &str,
        documents: Option<Vec<Document>>,
    ) -> Result<QueryOutcome, AppError> {
        let token = {
            let mut active = self.active_query.lock().await;
            active.cancel();
            *active = CancellationToken::new();
            active.clone()
        };
        self.query_with_cancellation(question, documents, &token)
            .await
    }

    /// Like `query`, but waits on a caller-owned token instead of the
    /// supersession token. Cancelling it abandons the generation call
    /// without applying its result.
    pub async fn query_with_cancellation(
        &self,
        question: &str,
        documents: Option<Vec<Document>>,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome, AppError> {
        if self.should_reinitialize(documents.as_deref()).await {
            self.initialize(documents).await?;
        }

        let index = Arc::clone(&*self.index.read().await);
        let (top_k, top_n) = {
            let tuning = self.tuning.read().await;
            (tuning.retrieval_top_k, tuning.reranker_top_n)
        };

        if index.is_empty() {
            info!("Index is empty, answering without context");
            let response = self.generator.generate(&[], question, cancel).await?;
            return Ok(QueryOutcome {
                response,
                sources: Vec::new(),
            });
        }

        let candidates = index.search(question, top_k);
        info!(
            index_size = index.size(),
            retrieved = candidates.len(),
            "Retrieved candidates"
        );

        if candidates.is_empty() {
            let response = self.generator.generate(&[], question, cancel).await?;
            return Ok(QueryOutcome {
                response,
                sources: Vec::new(),
            });
        }

        let reranked = Reranker::new(top_n).rerank(question, candidates);
        let response = self.generator.generate(&reranked, question, cancel).await?;

        let sources = reranked
            .iter()
            .map(|candidate| SourceAttribution {
                document_id: candidate.meta.document_id.clone(),
                title: candidate.meta.title.clone(),
                subject: candidate.meta.subject.clone(),
                similarity_score: candidate.similarity,
                rerank_score: candidate.rerank_score,
            })
            .collect();

        Ok(QueryOutcome { response, sources })
    }

    /// Generates a multiple-choice quiz for one document. Generation or
    /// parse failures degrade to the deterministic metadata quiz.
    #[instrument(skip_all, fields(document_id = %document.id))]
    pub async fn generate_quiz(&self, document: &Document) -> Vec<QuizQuestion> {
        let context = chunker::extract_content(document);
        let prompt = quiz::build_quiz_prompt(document, &context);

        match self.generator.complete_raw(&prompt).await {
            Ok(raw) => match quiz::parse_quiz_questions(&raw) {
                Ok(questions) => questions,
                Err(error) => {
                    warn!(%error, "Quiz output failed validation, using fallback quiz");
                    quiz::fallback_quiz(document)
                }
            },
            Err(error) => {
                warn!(%error, "Quiz generation failed, using fallback quiz");
                quiz::fallback_quiz(document)
            }
        }
    }

    /// Read-only state snapshot; never mutates the pipeline.
    pub async fn status(&self) -> PipelineStatus {
        let state = self.state.lock().await;
        let index = self.index.read().await;
        PipelineStatus {
            ready: state.ready,
            chunk_count: index.size(),
            last_build_time: state.last_build,
            fingerprint: state.fingerprint.clone(),
        }
    }

    pub async fn update_config(&self, update: TuningUpdate) {
        let mut tuning = self.tuning.write().await;
        if let Some(chunk_size) = update.chunk_size {
            tuning.chunk_size = chunk_size;
        }
        if let Some(chunk_overlap) = update.chunk_overlap {
            tuning.chunk_overlap = chunk_overlap;
        }
        if let Some(retrieval_top_k) = update.retrieval_top_k {
            tuning.retrieval_top_k = retrieval_top_k;
        }
        if let Some(reranker_top_n) = update.reranker_top_n {
            tuning.reranker_top_n = reranker_top_n;
        }
        info!("Pipeline configuration updated");
    }
}

/// Deterministic digest over the ordered `(id, title, subject)` tuples.
/// Deliberately metadata-only: body edits are caught by the staleness
/// window, not the fingerprint.
pub fn corpus_fingerprint(documents: &[Document]) -> String {
    if documents.is_empty() {
        return "empty".to_owned();
    }

    let mut hasher = Sha256::new();
    for document in documents {
        hasher.update(document.id.as_bytes());
        hasher.update([0x1f]);
        hasher.update(document.title.as_bytes());
        hasher.update([0x1f]);
        hasher.update(document.subject.as_bytes());
        hasher.update([0x1e]);
    }
    let digest = hasher.finalize();
    let truncated = digest[..8]
        .try_into()
        .map(u64::from_be_bytes)
        .unwrap_or_default();
    format!("{truncated:016x}")
}
