//! EduMate Content Generation
//!
//! The content-generation collaborator consumed by the conversation and quiz
//! sessions.
//!
//! This crate provides the shared transcript and question types, the
//! [`ContentGenerator`] trait, and two implementations: a canned generator
//! with fixed filler text and an LLM-backed generator speaking the `OpenAI`
//! chat-completions protocol.

pub mod canned;
pub mod openai;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use canned::CannedGenerator;
pub use openai::{OpenAiConfig, OpenAiGenerator};

/// Number of answer options every quiz question carries.
pub const OPTION_COUNT: usize = 4;

/// A specialized `Result` type for content generation.
pub type Result<T> = std::result::Result<T, GeneratorError>;

/// Errors that can occur while generating content.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The content API answered with an error status.
    #[error("content API error ({kind}): {message}")]
    Api {
        /// Category of the failure.
        kind: GeneratorErrorKind,
        /// Detail returned by the API.
        message: String,
    },

    /// The generator answered, but the content could not be understood.
    #[error("malformed generator output: {0}")]
    Malformed(String),

    /// The generator produced no questions at all.
    #[error("generator returned no questions")]
    NoQuestions,

    /// The generator returned fewer questions than requested.
    #[error("generator returned {returned} questions, expected {expected}")]
    TooFewQuestions {
        /// Number of questions requested.
        expected: usize,
        /// Number of questions received.
        returned: usize,
    },

    /// A generated question violates the question invariants.
    #[error("invalid question #{position}: {reason}")]
    InvalidQuestion {
        /// 1-based position of the question in the generated list.
        position: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl GeneratorError {
    /// Creates a new `Api` error.
    #[must_use]
    pub fn api(kind: GeneratorErrorKind, message: impl Into<String>) -> Self {
        Self::Api {
            kind,
            message: message.into(),
        }
    }

    /// Creates a new `Malformed` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Creates a new `InvalidQuestion` error.
    #[must_use]
    pub fn invalid_question(position: usize, reason: impl Into<String>) -> Self {
        Self::InvalidQuestion {
            position,
            reason: reason.into(),
        }
    }

    /// Returns `true` if retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { kind, .. } => matches!(
                kind,
                GeneratorErrorKind::RateLimit
                    | GeneratorErrorKind::Server
                    | GeneratorErrorKind::Network
            ),
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Categories of content API failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorErrorKind {
    /// Invalid or missing credentials.
    Authentication,
    /// Rate limit exceeded.
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues.
    Network,
    /// Other unclassified errors.
    Other,
}

impl GeneratorErrorKind {
    /// Classifies an HTTP status code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for GeneratorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::Other => write!(f, "other"),
        }
    }
}

// ============================================================================
// Transcript types
// ============================================================================

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The person studying.
    Learner,
    /// The assistant answering.
    Assistant,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Learner => write!(f, "learner"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One authored message in a conversation.
///
/// Turns are immutable: the fields are only readable through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    speaker: Speaker,
    text: String,
}

impl Turn {
    /// Creates a turn authored by the learner.
    #[must_use]
    pub fn learner(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Learner,
            text: text.into(),
        }
    }

    /// Creates a turn authored by the assistant.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
        }
    }

    /// Returns the author of this turn.
    #[must_use]
    pub const fn speaker(&self) -> Speaker {
        self.speaker
    }

    /// Returns the text of this turn.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

// ============================================================================
// Generated questions
// ============================================================================

/// A quiz question as produced by a generator, before it joins a session.
///
/// Serialized in the `{"question", "options", "correctAnswer"}` shape that LLM
/// prompts ask for. A list of anything other than four options fails to
/// deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    /// The question text.
    #[serde(rename = "question")]
    pub prompt: String,
    /// The four answer options, in display order.
    pub options: [String; OPTION_COUNT],
    /// Index of the correct option.
    #[serde(rename = "correctAnswer")]
    pub correct_option_index: usize,
}

impl GeneratedQuestion {
    /// Creates a new generated question.
    #[must_use]
    pub fn new(
        prompt: impl Into<String>,
        options: [String; OPTION_COUNT],
        correct_option_index: usize,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            options,
            correct_option_index,
        }
    }

    /// Checks the question invariants.
    ///
    /// `position` is the 1-based place of the question in its batch and is
    /// only used in the error.
    pub fn validate(&self, position: usize) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(GeneratorError::invalid_question(position, "empty prompt"));
        }
        if let Some(blank) = self.options.iter().position(|o| o.trim().is_empty()) {
            return Err(GeneratorError::invalid_question(
                position,
                format!("option {blank} is empty"),
            ));
        }
        if self.correct_option_index >= OPTION_COUNT {
            return Err(GeneratorError::invalid_question(
                position,
                format!(
                    "correct option index {} is outside 0..{OPTION_COUNT}",
                    self.correct_option_index
                ),
            ));
        }
        Ok(())
    }
}

/// Validates a generated batch and trims it to `count` questions.
///
/// Surplus questions are dropped; a short or empty batch is rejected so a
/// session never installs a partial set.
pub fn validate_batch(
    mut questions: Vec<GeneratedQuestion>,
    count: usize,
) -> Result<Vec<GeneratedQuestion>> {
    if questions.is_empty() {
        return Err(GeneratorError::NoQuestions);
    }
    if questions.len() < count {
        return Err(GeneratorError::TooFewQuestions {
            expected: count,
            returned: questions.len(),
        });
    }
    questions.truncate(count);
    for (i, question) in questions.iter().enumerate() {
        question.validate(i + 1)?;
    }
    Ok(questions)
}

// ============================================================================
// Generator trait
// ============================================================================

/// Produces assistant replies and quiz questions.
///
/// Implementations must either return a well-formed result or an error; the
/// sessions handle errors by falling back to visible placeholder content.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Produces the next assistant reply for a transcript ending in a
    /// learner turn.
    async fn generate_reply(&self, transcript: &[Turn]) -> Result<String>;

    /// Produces `count` questions about `topic`.
    async fn generate_questions(&self, topic: &str, count: usize)
        -> Result<Vec<GeneratedQuestion>>;
}
