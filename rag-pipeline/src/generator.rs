use std::{sync::Arc, time::Duration};

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use common::error::AppError;
use thiserror::Error;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::RerankedCandidate;

/// System framing sent with every generation request.
const SYSTEM_PROMPT: &str = "You are a helpful educational assistant. Always provide clear, \
educational responses using markdown formatting. Focus on helping students learn with \
explanations, examples, and encouraging content. Keep responses concise but informative. If you \
cannot answer based on available information, say so and suggest alternative learning approaches.";

/// Completions shorter than this get an encouragement suffix appended.
const SHORT_COMPLETION_CHARS: usize = 50;

const ENCOURAGEMENT_SUFFIX: &str =
    "\n\nFeel free to ask follow-up questions or request more details about this topic!";

/// Failure taxonomy for a single generation call. Only used for logging and
/// retry classification; callers always receive an answer string.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation call timed out")]
    Timeout,
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("service returned an empty completion")]
    EmptyCompletion,
}

impl GenerationError {
    /// Auth failures and timeouts are terminal for the attempt sequence;
    /// everything else is worth retrying.
    fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Transport(_))
    }
}

/// The consumed text-generation service, reduced to its interface so tests
/// can swap in mocks.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// OpenAI-compatible chat-completions backend.
pub struct OpenAiGenerator {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessage::from(SYSTEM_PROMPT).into(),
                ChatCompletionRequestUserMessage::from(prompt).into(),
            ])
            .max_tokens(800u32)
            .temperature(0.7)
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(classify_openai_error)?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(str::trim)
            .unwrap_or_default();

        if content.is_empty() {
            return Err(GenerationError::EmptyCompletion);
        }

        Ok(content.to_owned())
    }
}

fn classify_openai_error(error: OpenAIError) -> GenerationError {
    match error {
        OpenAIError::ApiError(api) => {
            let code = api.code.as_deref().unwrap_or_default();
            let message = api.message.clone();
            if code.contains("invalid_api_key")
                || message.contains("401")
                || message.contains("403")
            {
                GenerationError::Auth(message)
            } else if code.contains("rate_limit") || message.contains("429") {
                GenerationError::RateLimited(message)
            } else {
                GenerationError::Transport(message)
            }
        }
        other => GenerationError::Transport(other.to_string()),
    }
}

/// Explicit retry policy for the generation call: total attempt count and
/// exponential backoff base delay. Auth failures and timeouts never retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// base, 2*base, 4*base, ... with jitter, capped at max_attempts - 1
    /// retries.
    fn backoff(&self) -> impl Iterator<Item = Duration> {
        let factor = (self.base_delay.as_millis() as u64 / 2).max(1);
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .map(jitter)
            .take(self.max_attempts.saturating_sub(1))
    }
}

/// Renders a prompt from reranked chunks and the question, calls the
/// generation service with a bounded, retried request, and degrades to a
/// deterministic study-guidance answer on any failure.
pub struct AnswerGenerator {
    service: Arc<dyn TextGenerator>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl AnswerGenerator {
    pub fn new(service: Arc<dyn TextGenerator>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            service,
            timeout,
            retry,
        }
    }

    /// The only error this can return is `AppError::Cancelled`; every
    /// service failure is absorbed into the fallback answer.
    pub async fn generate(
        &self,
        chunks: &[RerankedCandidate],
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AppError> {
        let context = format_context(chunks);
        let prompt = build_prompt(&context, question);

        debug!(
            context_chunks = chunks.len(),
            prompt_chars = prompt.len(),
            "Generating answer"
        );

        let outcome = tokio::select! {
            () = cancel.cancelled() => return Err(AppError::Cancelled),
            outcome = self.complete_raw(&prompt) => outcome,
        };

        match outcome {
            Ok(content) => Ok(finish_completion(content)),
            Err(error) => {
                warn!(%error, "Generation failed; returning fallback answer");
                Ok(fallback_response(question))
            }
        }
    }

    /// One bounded, retried call to the generation service. Every attempt
    /// carries the configured timeout; the retry policy governs how many
    /// attempts are made.
    pub(crate) async fn complete_raw(&self, prompt: &str) -> Result<String, GenerationError> {
        let attempt = || async {
            match tokio::time::timeout(self.timeout, self.service.complete(prompt)).await {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout),
            }
        };

        RetryIf::spawn(self.retry.backoff(), attempt, GenerationError::is_retryable).await
    }
}

/// Context block for the prompt: each chunk prefixed by its document title
/// and subject, separated by a visible delimiter.
pub fn format_context(chunks: &[RerankedCandidate]) -> String {
    if chunks.is_empty() {
        return "No specific documents found for this query.".to_owned();
    }

    chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| {
            format!(
                "Document {} ({} - {}):\n{}",
                index + 1,
                chunk.meta.subject,
                chunk.meta.title,
                chunk.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "Use the provided context to answer the student's question accurately and educationally.\n\
         \n\
         Context from documents:\n\
         {context}\n\
         \n\
         Student question: {question}\n\
         \n\
         Instructions:\n\
         - Provide clear, educational responses using the context above\n\
         - If the context doesn't contain relevant information, say so and provide general educational guidance\n\
         - Use markdown formatting for better readability\n\
         - Keep responses concise but informative\n\
         - Encourage further learning and questions\n\
         \n\
         Answer:"
    )
}

fn finish_completion(content: String) -> String {
    if content.len() < SHORT_COMPLETION_CHARS {
        format!("{content}{ENCOURAGEMENT_SUFFIX}")
    } else {
        content
    }
}

/// Deterministic study-guidance answer used whenever the generation service
/// is unavailable. References the literal question so the reply never reads
/// as a blank error.
pub fn fallback_response(question: &str) -> String {
    format!(
        "I'm having trouble accessing the AI service right now. Here's some general guidance \
         for your question about \"{question}\":\n\
         \n\
         **Study Tips:**\n\
         - Break down complex topics into smaller, manageable parts\n\
         - Use multiple sources to understand different perspectives\n\
         - Practice applying concepts through examples and exercises\n\
         - Don't hesitate to ask follow-up questions\n\
         \n\
         **Next Steps:**\n\
         - Review your course materials for related information\n\
         - Try rephrasing your question in different ways\n\
         - Ask your teacher or classmates for additional insights\n\
         \n\
         Please try asking your question again in a moment!"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::{Chunk, DocumentMeta};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn reranked(document_id: &str, title: &str, subject: &str, text: &str) -> RerankedCandidate {
        RerankedCandidate {
            chunk: Chunk::new(document_id, text.into(), 0, 1),
            meta: DocumentMeta {
                document_id: document_id.into(),
                title: title.into(),
                subject: subject.into(),
            },
            similarity: 0.5,
            rerank_score: 0.9,
        }
    }

    struct StaticGenerator {
        reply: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for StaticGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.to_owned())
        }
    }

    struct FailingGenerator {
        error: fn() -> GenerationError,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(2),
        }
    }

    fn generator(service: Arc<dyn TextGenerator>) -> AnswerGenerator {
        AnswerGenerator::new(service, Duration::from_secs(5), fast_retry())
    }

    #[test]
    fn context_includes_title_and_subject() {
        let chunks = vec![reranked(
            "doc-1",
            "Algebra Basics",
            "Mathematics",
            "A variable represents an unknown value.",
        )];
        let context = format_context(&chunks);

        assert!(context.contains("Document 1 (Mathematics - Algebra Basics):"));
        assert!(context.contains("A variable represents an unknown value."));
    }

    #[test]
    fn empty_context_states_no_documents() {
        assert_eq!(
            format_context(&[]),
            "No specific documents found for this query."
        );
    }

    #[tokio::test]
    async fn successful_generation_returns_completion() {
        let service = Arc::new(StaticGenerator {
            reply: "Variables are symbols standing in for values we have not pinned down yet.",
            calls: AtomicUsize::new(0),
        });
        let generator = generator(Arc::<StaticGenerator>::clone(&service));

        let answer = generator
            .generate(&[], "What is a variable?", &CancellationToken::new())
            .await
            .expect("not cancelled");

        assert!(answer.starts_with("Variables are symbols"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn short_completion_gets_encouragement_suffix() {
        let service = Arc::new(StaticGenerator {
            reply: "Yes.",
            calls: AtomicUsize::new(0),
        });
        let generator = generator(service);

        let answer = generator
            .generate(&[], "Is algebra useful?", &CancellationToken::new())
            .await
            .expect("not cancelled");

        assert!(answer.starts_with("Yes."));
        assert!(answer.contains("follow-up questions"));
    }

    #[tokio::test]
    async fn transport_failure_retries_then_falls_back() {
        let service = Arc::new(FailingGenerator {
            error: || GenerationError::Transport("connection reset".into()),
            calls: AtomicUsize::new(0),
        });
        let generator = generator(Arc::<FailingGenerator>::clone(&service));

        let answer = generator
            .generate(&[], "What is a variable?", &CancellationToken::new())
            .await
            .expect("not cancelled");

        assert_eq!(answer, fallback_response("What is a variable?"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 2, "one retry expected");
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let service = Arc::new(FailingGenerator {
            error: || GenerationError::Auth("invalid key".into()),
            calls: AtomicUsize::new(0),
        });
        let generator = generator(Arc::<FailingGenerator>::clone(&service));

        let answer = generator
            .generate(&[], "What is a variable?", &CancellationToken::new())
            .await
            .expect("not cancelled");

        assert!(answer.contains("What is a variable?"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1, "auth must not retry");
    }

    #[tokio::test]
    async fn hung_service_times_out_into_fallback() {
        struct HangingGenerator;

        #[async_trait]
        impl TextGenerator for HangingGenerator {
            async fn complete(&self, _prompt: &str) -> Result<String, GenerationError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("too late".into())
            }
        }

        let generator = AnswerGenerator::new(
            Arc::new(HangingGenerator),
            Duration::from_millis(20),
            RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
            },
        );

        let answer = generator
            .generate(&[], "anything", &CancellationToken::new())
            .await
            .expect("not cancelled");

        assert_eq!(answer, fallback_response("anything"));
    }

    #[tokio::test]
    async fn cancellation_stops_waiting_on_the_service() {
        struct HangingGenerator;

        #[async_trait]
        impl TextGenerator for HangingGenerator {
            async fn complete(&self, _prompt: &str) -> Result<String, GenerationError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("too late".into())
            }
        }

        let generator = AnswerGenerator::new(
            Arc::new(HangingGenerator),
            Duration::from_secs(60),
            RetryPolicy::default(),
        );
        let token = CancellationToken::new();
        token.cancel();

        let result = generator.generate(&[], "anything", &token).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }
}
