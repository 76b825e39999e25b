//! Configuration types for the EduMate session service.
//!
//! This module provides the configuration structures controlling the
//! conversation greeting and reply latency, quiz size, content generator
//! selection, and the LLM connection settings.

use std::path::Path;
use std::time::Duration;

use edumate_content::OpenAiConfig;
use serde::{Deserialize, Serialize};

use crate::error::{EduError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "edumate.json";

/// Largest quiz the service will generate in one go.
const MAX_QUESTIONS_PER_QUIZ: usize = 20;

/// Default assistant greeting seeded into every conversation.
fn default_greeting() -> String {
    "Hi! I'm your AI learning assistant. Ask me anything!".to_string()
}

/// Default reply used when the generator cannot produce one.
fn default_fallback_reply() -> String {
    "Sorry, I couldn't come up with an answer right now. Could you rephrase the question?"
        .to_string()
}

/// Default delay before the assistant reply lands, in milliseconds.
const fn default_reply_delay_ms() -> u64 {
    1000
}

/// Default number of questions per generated quiz.
const fn default_questions_per_quiz() -> usize {
    3
}

/// Default per-subscriber WebSocket event buffer.
const fn default_event_buffer_size() -> usize {
    100
}

fn default_model() -> String {
    edumate_content::openai::DEFAULT_MODEL.to_string()
}

fn default_base_url() -> String {
    edumate_content::openai::DEFAULT_BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

const fn default_temperature() -> f32 {
    0.7
}

const fn default_max_tokens() -> u32 {
    2000
}

const fn default_timeout_secs() -> u64 {
    30
}

/// Main configuration for the EduMate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Assistant greeting that opens every conversation.
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Reply appended when the generator fails.
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,

    /// Delay between a learner message and the assistant reply.
    #[serde(default = "default_reply_delay_ms")]
    pub reply_delay_ms: u64,

    /// Number of questions in every generated quiz.
    #[serde(default = "default_questions_per_quiz")]
    pub questions_per_quiz: usize,

    /// Which content generator to use.
    #[serde(default)]
    pub generator: GeneratorKind,

    /// Settings for the `OpenAI` generator.
    #[serde(default)]
    pub openai: OpenAiSettings,

    /// Events buffered per WebSocket subscriber before old ones are dropped.
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
            fallback_reply: default_fallback_reply(),
            reply_delay_ms: default_reply_delay_ms(),
            questions_per_quiz: default_questions_per_quiz(),
            generator: GeneratorKind::default(),
            openai: OpenAiSettings::default(),
            event_buffer_size: default_event_buffer_size(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `edumate.json` in the current directory; falls back to the
    /// defaults when it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            EduError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `edumate.json` inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `EduError::ConfigParseError` for unreadable files, invalid JSON
    /// or invalid enum values, and `EduError::ConfigValidationError` when a
    /// value is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(EduError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| EduError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `EduError::ConfigValidationError` naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.greeting.trim().is_empty() {
            return Err(EduError::config_validation(
                "greeting must not be empty",
                "Set a greeting text in your edumate.json",
            ));
        }

        if self.fallback_reply.trim().is_empty() {
            return Err(EduError::config_validation(
                "fallbackReply must not be empty",
                "Set a fallbackReply text in your edumate.json",
            ));
        }

        if self.reply_delay_ms == 0 {
            return Err(EduError::config_validation(
                "replyDelayMs must be greater than 0",
                "Set replyDelayMs to at least 1 in your edumate.json",
            ));
        }

        if self.questions_per_quiz == 0 || self.questions_per_quiz > MAX_QUESTIONS_PER_QUIZ {
            return Err(EduError::config_validation(
                format!(
                    "questionsPerQuiz must be between 1 and {MAX_QUESTIONS_PER_QUIZ}, got {}",
                    self.questions_per_quiz
                ),
                "Set questionsPerQuiz to a value such as 3 or 5 in your edumate.json",
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(EduError::config_validation(
                "eventBufferSize must be greater than 0",
                "Set eventBufferSize to at least 1 (100 is typical) in your edumate.json",
            ));
        }

        self.openai.validate()
    }

    /// Returns the reply delay as a [`Duration`].
    #[must_use]
    pub const fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }
}

/// Supported content generators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeneratorKind {
    /// Fixed filler replies and templated questions (default).
    #[default]
    Canned,
    /// `OpenAI` chat-completions.
    OpenAi,
}

impl GeneratorKind {
    /// Parses a string into a `GeneratorKind`, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "canned" => Some(Self::Canned),
            "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }

    /// Returns the config spelling of this generator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Canned => "canned",
            Self::OpenAi => "openai",
        }
    }
}

impl std::fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for GeneratorKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid generator '{s}': expected one of 'canned', 'openai'"
            ))
        })
    }
}

impl Serialize for GeneratorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Connection settings for the `OpenAI` generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAiSettings {
    /// Chat model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// API root URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Sampling temperature (0.0 to 2.0).
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on generated tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl OpenAiSettings {
    fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(EduError::config_validation(
                "openai.model must not be empty",
                "Set openai.model (e.g. \"gpt-4o-mini\") in your edumate.json",
            ));
        }

        if self.base_url.trim().is_empty() {
            return Err(EduError::config_validation(
                "openai.baseUrl must not be empty",
                "Remove openai.baseUrl to use the default endpoint",
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(EduError::config_validation(
                format!(
                    "openai.temperature must be between 0.0 and 2.0, got {}",
                    self.temperature
                ),
                "Set openai.temperature to a value such as 0.7 in your edumate.json",
            ));
        }

        if self.max_tokens == 0 {
            return Err(EduError::config_validation(
                "openai.maxTokens must be greater than 0",
                "Set openai.maxTokens to at least 1 (2000 is typical) in your edumate.json",
            ));
        }

        if self.timeout_secs == 0 {
            return Err(EduError::config_validation(
                "openai.timeoutSecs must be greater than 0",
                "Set openai.timeoutSecs to at least 1 second in your edumate.json",
            ));
        }

        Ok(())
    }

    /// Builds the generator config, reading the API key from the environment.
    ///
    /// # Errors
    ///
    /// Returns `EduError::MissingApiKey` if the variable is unset or blank.
    pub fn resolve(&self) -> Result<OpenAiConfig> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(self.with_api_key(key)),
            _ => Err(EduError::missing_api_key(&self.api_key_env)),
        }
    }

    /// Builds the generator config with an explicit API key.
    #[must_use]
    pub fn with_api_key(&self, api_key: impl Into<String>) -> OpenAiConfig {
        OpenAiConfig {
            base_url: self.base_url.clone(),
            api_key: api_key.into(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}
