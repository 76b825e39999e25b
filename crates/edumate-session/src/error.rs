//! Error types for the EduMate session core.
//!
//! [`SessionError`] covers rejected learner input: the session is left
//! untouched and callers may ignore the error or report it. [`EduError`] is
//! the error for configuration and startup failures.

use std::path::PathBuf;

/// A specialized `Result` type for EduMate operations.
pub type Result<T> = std::result::Result<T, EduError>;

/// Input rejected by a session. A rejected call never mutates the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Learner message or quiz topic was blank after trimming.
    #[error("{field} must not be blank")]
    EmptyInput {
        /// Which input was blank.
        field: &'static str,
    },

    /// No question with this id exists in the current generation.
    #[error("question {id} does not exist in quiz generation {generation}")]
    UnknownQuestion {
        /// The requested question id.
        id: u32,
        /// The generation the caller aimed at.
        generation: u64,
    },

    /// Option index outside `0..4`.
    #[error("option index {index} is out of range (expected 0-3)")]
    OptionOutOfRange {
        /// The requested option index.
        index: usize,
    },

    /// A quiz submitted later was installed before this one finished.
    #[error("quiz request {ticket} was superseded by request {installed}")]
    Superseded {
        /// Ticket of the late draft.
        ticket: u64,
        /// Ticket of the installed set.
        installed: u64,
    },
}

impl SessionError {
    /// Creates a new `EmptyInput` error.
    #[must_use]
    pub const fn empty_input(field: &'static str) -> Self {
        Self::EmptyInput { field }
    }

    /// Creates a new `UnknownQuestion` error.
    #[must_use]
    pub const fn unknown_question(id: u32, generation: u64) -> Self {
        Self::UnknownQuestion { id, generation }
    }

    /// Creates a new `Superseded` error.
    #[must_use]
    pub const fn superseded(ticket: u64, installed: u64) -> Self {
        Self::Superseded { ticket, installed }
    }
}

/// Errors that can occur while running EduMate.
///
/// Variants carry an actionable suggestion where one exists.
#[derive(Debug, thiserror::Error)]
pub enum EduError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your edumate.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// The LLM generator was selected but its API key is not set.
    #[error("API key not configured: environment variable '{env_var}' is not set\n\nSuggestion: Export {env_var} or switch \"generator\" to \"canned\" in edumate.json")]
    MissingApiKey {
        /// Name of the environment variable that was read.
        env_var: String,
    },
}

impl EduError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `MissingApiKey` error.
    #[must_use]
    pub fn missing_api_key(env_var: impl Into<String>) -> Self {
        Self::MissingApiKey {
            env_var: env_var.into(),
        }
    }
}
