use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tracing::debug;

/// Fixed vocabulary of general academic terms. One vector component per
/// term; the embedding dimensionality is `VOCABULARY.len() + 2`.
const VOCABULARY: [&str; 24] = [
    "learn",
    "study",
    "education",
    "knowledge",
    "understand",
    "concept",
    "theory",
    "practice",
    "example",
    "problem",
    "solution",
    "method",
    "analysis",
    "research",
    "data",
    "information",
    "science",
    "math",
    "history",
    "english",
    "computer",
    "technology",
    "skill",
    "development",
];

/// Normalization scale for the auxiliary token-count feature.
const TOKEN_COUNT_SCALE: f32 = 100.0;
/// Normalization scale for the auxiliary character-count feature.
const CHAR_COUNT_SCALE: f32 = 1000.0;

/// Embedding cache keys are a prefix of the input text.
const CACHE_KEY_PREFIX_CHARS: usize = 100;

/// Vocabulary components plus the two auxiliary stat features.
pub const EMBEDDING_DIMENSION: usize = VOCABULARY.len() + 2;

/// Deterministic term-frequency embedder over a hard-coded vocabulary.
/// All embeddings produced by one instance have identical length; vectors
/// from differently configured embedders are not comparable.
#[derive(Debug, Default)]
pub struct Embedder {
    cache: Mutex<HashMap<String, Arc<Vec<f32>>>>,
}

impl Embedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Embeds `text`, reusing a cached vector when the text prefix was seen
    /// before. The cache is purely an optimization; clearing it never
    /// changes results.
    pub fn embed(&self, text: &str) -> Arc<Vec<f32>> {
        let key: String = text.chars().take(CACHE_KEY_PREFIX_CHARS).collect();

        if let Ok(cache) = self.cache.lock() {
            if let Some(cached) = cache.get(&key) {
                return Arc::clone(cached);
            }
        }

        let embedding = Arc::new(self.compute(text));

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, Arc::clone(&embedding));
        }

        embedding
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            let evicted = cache.len();
            cache.clear();
            debug!(evicted, "Cleared embedding cache");
        }
    }

    fn compute(&self, text: &str) -> Vec<f32> {
        let tokens: Vec<String> = tokenize(text).collect();
        let total = tokens.len() as f32;

        let mut frequencies: HashMap<&str, f32> = HashMap::new();
        for token in &tokens {
            *frequencies.entry(token.as_str()).or_insert(0.0) += 1.0;
        }

        let mut embedding = Vec::with_capacity(EMBEDDING_DIMENSION);
        for term in VOCABULARY {
            let frequency = frequencies.get(term).copied().unwrap_or(0.0);
            embedding.push(if total > 0.0 { frequency / total } else { 0.0 });
        }

        // Auxiliary normalized text statistics.
        embedding.push(tokens.len() as f32 / TOKEN_COUNT_SCALE);
        embedding.push(text.len() as f32 / CHAR_COUNT_SCALE);

        embedding
    }
}

/// Lowercases, strips non-word characters, splits on whitespace, and drops
/// tokens shorter than three characters.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.len() > 2)
        .map(str::to_lowercase)
}

/// Cosine similarity in [-1, 1]; zero-magnitude vectors compare as 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let magnitude = norm_a.sqrt() * norm_b.sqrt();
    if magnitude == 0.0 {
        0.0
    } else {
        dot / magnitude
    }
}
