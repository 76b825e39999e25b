//! Canned content generator.
//!
//! Replies with a random acknowledgement from a fixed pool and builds quiz
//! questions from templates parameterized by the topic. Used when no LLM is
//! configured and as the fallback when the LLM is unavailable.

use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{ContentGenerator, GeneratedQuestion, Result, Turn};

/// Filler acknowledgements the canned generator replies with.
pub const REPLY_POOL: [&str; 3] = [
    "Great question! Let's break it down in more detail...",
    "I can help with that. Here is a simple explanation...",
    "I see what you're working on. Here is one way to approach it...",
];

/// Prompt template, option labels and correct index for each canned question.
const QUESTION_TEMPLATES: [(&str, [&str; 4], usize); 3] = [
    (
        "What is the foundation of {topic}?",
        ["Option A", "Option B", "Option C", "Option D"],
        1,
    ),
    (
        "Which principle is important in {topic}?",
        ["Principle 1", "Principle 2", "Principle 3", "Principle 4"],
        2,
    ),
    (
        "How is {topic} applied in practice?",
        ["Method A", "Method B", "Method C", "Method D"],
        0,
    ),
];

/// Generator producing fixed placeholder content.
#[derive(Debug)]
pub struct CannedGenerator {
    rng: Mutex<StdRng>,
}

impl Default for CannedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CannedGenerator {
    /// Creates a canned generator seeded from the OS.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Creates a canned generator with a fixed seed, for reproducible replies.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Picks a reply uniformly from [`REPLY_POOL`].
    pub fn pick_reply(&self) -> &'static str {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        REPLY_POOL[rng.gen_range(0..REPLY_POOL.len())]
    }

    /// Builds `count` templated questions about `topic`.
    ///
    /// Templates repeat when more than three questions are requested; repeats
    /// carry a round number so prompts stay distinct.
    #[must_use]
    pub fn questions_for(topic: &str, count: usize) -> Vec<GeneratedQuestion> {
        (0..count)
            .map(|i| {
                let (template, labels, correct) = QUESTION_TEMPLATES[i % QUESTION_TEMPLATES.len()];
                let mut prompt = template.replace("{topic}", topic);
                let round = i / QUESTION_TEMPLATES.len();
                if round > 0 {
                    prompt = format!("{prompt} (round {})", round + 1);
                }
                GeneratedQuestion::new(prompt, labels.map(String::from), correct)
            })
            .collect()
    }
}

#[async_trait]
impl ContentGenerator for CannedGenerator {
    fn name(&self) -> &'static str {
        "canned"
    }

    async fn generate_reply(&self, _transcript: &[Turn]) -> Result<String> {
        Ok(self.pick_reply().to_string())
    }

    async fn generate_questions(
        &self,
        topic: &str,
        count: usize,
    ) -> Result<Vec<GeneratedQuestion>> {
        Ok(Self::questions_for(topic, count))
    }
}
