//! LLM-backed content generator using the `OpenAI` chat-completions API.
//!
//! This module provides [`OpenAiGenerator`], which asks a chat model for
//! tutoring replies and for quiz questions returned as a JSON array.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::{
    ContentGenerator, GeneratedQuestion, GeneratorError, GeneratorErrorKind, Result, Speaker, Turn,
};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const QUESTIONS_SYSTEM_PROMPT: &str =
    "You are an assistant that writes educational tests. Respond with valid JSON only.";

const TUTOR_SYSTEM_PROMPT: &str = "You are EduMate, a friendly AI learning assistant. \
Explain concepts plainly, check understanding, and keep answers brief.";

/// Connection and sampling settings for [`OpenAiGenerator`].
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Bearer token.
    pub api_key: String,
    /// Chat model name.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl OpenAiConfig {
    /// Creates a config with the default endpoint, model and sampling.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            timeout: Duration::from_secs(30),
        }
    }

    /// Overrides the API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Content generator backed by a chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    config: OpenAiConfig,
    http: reqwest::Client,
}

impl OpenAiGenerator {
    /// Creates a generator with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, http })
    }

    /// Returns the generator configuration.
    #[must_use]
    pub const fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Builds the request body for a list of chat messages.
    fn build_request_body(&self, messages: Vec<Value>) -> Value {
        json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        })
    }

    /// Sends a completion request and returns the assistant content.
    async fn complete(&self, body: &Value) -> Result<String> {
        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    GeneratorError::api(GeneratorErrorKind::Network, e.to_string())
                } else {
                    GeneratorError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Content API returned an error");
            return Err(GeneratorError::api(
                GeneratorErrorKind::from_status(status.as_u16()),
                text,
            ));
        }

        let json: Value = response.json().await?;
        extract_content(&json)
    }
}

/// Builds the chat messages asking for `count` questions about `topic`.
fn question_messages(topic: &str, count: usize) -> Vec<Value> {
    let prompt = format!(
        "Create a test on the topic: {topic}\n\n\
Requirements:\n\
- Write exactly {count} questions\n\
- Give every question exactly 4 answer options\n\
- Match the learning level mentioned in the request (if a grade is given)\n\
- The questions must check understanding of the topic\n\n\
Answer format: a strict JSON array of objects:\n\
[\n  {{\n    \"question\": \"Question text?\",\n    \"options\": [\"Option 1\", \"Option 2\", \"Option 3\", \"Option 4\"],\n    \"correctAnswer\": 0\n  }}\n]\n\n\
where correctAnswer is the index of the correct option (0-3).\n\n\
Return ONLY the JSON, with no extra text."
    );
    vec![
        json!({ "role": "system", "content": QUESTIONS_SYSTEM_PROMPT }),
        json!({ "role": "user", "content": prompt }),
    ]
}

/// Maps a transcript onto chat messages behind the tutoring system prompt.
fn reply_messages(transcript: &[Turn]) -> Vec<Value> {
    std::iter::once(json!({ "role": "system", "content": TUTOR_SYSTEM_PROMPT }))
        .chain(transcript.iter().map(|turn| {
            let role = match turn.speaker() {
                Speaker::Learner => "user",
                Speaker::Assistant => "assistant",
            };
            json!({ "role": role, "content": turn.text() })
        }))
        .collect()
}

/// Pulls `choices[0].message.content` out of a completion response.
fn extract_content(json: &Value) -> Result<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| GeneratorError::malformed("response has no choices[0].message.content"))
}

/// Returns the body of the first Markdown code fence, or the trimmed input.
fn strip_code_fence(content: &str) -> &str {
    let Ok(re) = Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```") else {
        return content.trim();
    };

    re.captures(content)
        .and_then(|cap| cap.get(1))
        .map_or_else(|| content.trim(), |m| m.as_str())
}

/// Parses model output into questions.
///
/// Accepts a bare JSON array or one wrapped in a Markdown code fence.
pub fn parse_questions(content: &str) -> Result<Vec<GeneratedQuestion>> {
    let body = strip_code_fence(content);
    serde_json::from_str(body)
        .map_err(|e| GeneratorError::malformed(format!("failed to parse questions: {e}")))
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    fn name(&self) -> &'static str {
        "openai"
    }

    #[instrument(skip(self, transcript), fields(turns = transcript.len()))]
    async fn generate_reply(&self, transcript: &[Turn]) -> Result<String> {
        let body = self.build_request_body(reply_messages(transcript));
        let reply = self.complete(&body).await?;
        if reply.is_empty() {
            return Err(GeneratorError::malformed("empty reply"));
        }
        debug!(chars = reply.len(), "Reply generated");
        Ok(reply)
    }

    #[instrument(skip(self))]
    async fn generate_questions(
        &self,
        topic: &str,
        count: usize,
    ) -> Result<Vec<GeneratedQuestion>> {
        let body = self.build_request_body(question_messages(topic, count));
        let content = self.complete(&body).await?;
        let questions = parse_questions(&content)?;
        debug!(returned = questions.len(), "Questions generated");
        Ok(questions)
    }
}
