use common::types::Document;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Upper bound on questions returned per document.
pub const MAX_QUESTIONS: usize = 5;

const OPTIONS_PER_QUESTION: usize = 4;

/// One multiple-choice question. `correct_answer` indexes into `options`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
}

/// Typed failure for model-output parsing. Parse failures are surfaced to
/// the caller as errors, never silently swallowed into defaults.
#[derive(Debug, Error)]
pub enum QuizParseError {
    #[error("no JSON array found in model output")]
    MissingArray,
    #[error("model output is not valid quiz JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("model output contained no valid questions")]
    NoValidQuestions,
}

/// Prompt asking the model for a strict JSON quiz over one document.
pub fn build_quiz_prompt(document: &Document, context: &str) -> String {
    format!(
        "Based on the following document information, create {MAX_QUESTIONS} multiple choice questions:\n\
         \n\
         {context}\n\
         \n\
         Create educational questions that test understanding of {subject} concepts.\n\
         \n\
         IMPORTANT: Respond with ONLY a valid JSON array in this exact format:\n\
         [\n\
           {{\n\
             \"question\": \"What is the main concept discussed in this {subject} material?\",\n\
             \"options\": [\"Option A\", \"Option B\", \"Option C\", \"Option D\"],\n\
             \"correct_answer\": 0\n\
           }}\n\
         ]\n\
         \n\
         Requirements:\n\
         - Each question should test understanding of {subject}\n\
         - All 4 options must be plausible but only one correct\n\
         - correct_answer is the index (0-3) of the correct option\n\
         - Return ONLY the JSON array, no other text",
        subject = document.subject,
    )
}

/// Parses a model completion into validated quiz questions.
///
/// Tolerates markdown code fences and prose around the array, but decodes
/// the array itself against the strict schema: exactly four options and a
/// correct-answer index inside them. Invalid entries are dropped; an output
/// with no valid entries is an error.
pub fn parse_quiz_questions(raw: &str) -> Result<Vec<QuizQuestion>, QuizParseError> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let array = extract_json_array(&cleaned).ok_or(QuizParseError::MissingArray)?;

    let decoded: Vec<QuizQuestion> = serde_json::from_str(array)?;
    let total = decoded.len();

    let valid: Vec<QuizQuestion> = decoded
        .into_iter()
        .filter(|q| {
            !q.question.trim().is_empty()
                && q.options.len() == OPTIONS_PER_QUESTION
                && q.correct_answer < OPTIONS_PER_QUESTION
        })
        .take(MAX_QUESTIONS)
        .collect();

    debug!(total, valid = valid.len(), "Parsed quiz questions from model output");

    if valid.is_empty() {
        return Err(QuizParseError::NoValidQuestions);
    }
    Ok(valid)
}

fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

/// Deterministic quiz built from document metadata, used when generation or
/// parsing fails.
pub fn fallback_quiz(document: &Document) -> Vec<QuizQuestion> {
    let mut questions = vec![
        QuizQuestion {
            question: format!(
                "Based on the title \"{}\", what would you expect to learn?",
                document.title
            ),
            options: vec![
                format!("{} fundamentals", document.subject),
                "Unrelated topics".into(),
                "Historical facts only".into(),
                "Mathematical formulas only".into(),
            ],
            correct_answer: 0,
        },
        QuizQuestion {
            question: format!("What is the main focus of the document \"{}\"?", document.title),
            options: vec![
                "Basic concepts".into(),
                "Advanced theory".into(),
                "Practical applications".into(),
                "All of the above".into(),
            ],
            correct_answer: 3,
        },
        QuizQuestion {
            question: "This document belongs to which subject area?".into(),
            options: vec![
                document.subject.clone(),
                "General studies".into(),
                "Mixed topics".into(),
                "Unknown".into(),
            ],
            correct_answer: 0,
        },
        QuizQuestion {
            question: "When studying this material, what approach is most effective?".into(),
            options: vec![
                "Memorization only".into(),
                "Understanding concepts".into(),
                "Skipping difficult parts".into(),
                "Reading once".into(),
            ],
            correct_answer: 1,
        },
    ];

    questions.truncate(MAX_QUESTIONS);
    questions
}
