//! Quiz lifecycle: generate a question set for a topic, record answers and
//! score them.
//!
//! Questions are held as `Arc<QuizQuestion>` in an id-indexed map with a
//! parallel ordered id list. Recording an answer swaps in a new `Arc` for the
//! touched question only; its siblings keep their identity.
//!
//! ```text
//! Empty --generate--> Generated --select_answer--> Generated
//!                         ^                            |
//!                         +---------generate-----------+
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use edumate_content::{
    validate_batch, CannedGenerator, ContentGenerator, GeneratedQuestion, OPTION_COUNT,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::SessionError;

/// Number of questions per quiz when nothing else is configured.
pub const DEFAULT_QUESTIONS_PER_QUIZ: usize = 3;

/// One question of an installed quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    id: u32,
    prompt: String,
    options: [String; OPTION_COUNT],
    correct_option_index: usize,
    user_answer_index: Option<usize>,
}

impl QuizQuestion {
    fn from_generated(id: u32, generated: GeneratedQuestion) -> Self {
        Self {
            id,
            prompt: generated.prompt,
            options: generated.options,
            correct_option_index: generated.correct_option_index,
            user_answer_index: None,
        }
    }

    /// Returns the question id, unique within its generation.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Returns the question text.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Returns the four options in display order.
    #[must_use]
    pub const fn options(&self) -> &[String; OPTION_COUNT] {
        &self.options
    }

    /// Returns the index of the correct option.
    #[must_use]
    pub const fn correct_option_index(&self) -> usize {
        self.correct_option_index
    }

    /// Returns the learner's current selection, if any.
    #[must_use]
    pub const fn user_answer_index(&self) -> Option<usize> {
        self.user_answer_index
    }

    /// Classifies the learner's selection.
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        match self.user_answer_index {
            None => Verdict::Unanswered,
            Some(answer) if answer == self.correct_option_index => Verdict::Correct,
            Some(_) => Verdict::Incorrect,
        }
    }
}

/// Lifecycle position of a quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizStatus {
    /// No question set installed yet.
    Empty,
    /// A question set is installed.
    Generated,
}

/// Outcome of one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The selection matches the correct option.
    Correct,
    /// The selection is some other option.
    Incorrect,
    /// Nothing selected.
    Unanswered,
}

/// Per-question result for review screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    /// The question id.
    pub question_id: u32,
    /// Outcome of the question.
    pub verdict: Verdict,
    /// What the learner picked.
    pub user_answer_index: Option<usize>,
    /// The correct option.
    pub correct_option_index: usize,
}

/// Tally of a quiz. Unanswered questions count as incorrect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizScore {
    /// Questions answered correctly.
    pub correct: usize,
    /// Questions with any selection.
    pub answered: usize,
    /// Questions in the quiz.
    pub total: usize,
}

impl QuizScore {
    /// Returns the share of correct answers as a rounded percentage.
    ///
    /// An empty quiz scores 0.
    #[must_use]
    pub const fn percent(&self) -> usize {
        if self.total == 0 {
            return 0;
        }
        (self.correct * 100 + self.total / 2) / self.total
    }
}

impl std::fmt::Display for QuizScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.correct, self.total)
    }
}

/// How a question set came to be installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// The generator's questions were installed.
    Generated,
    /// The generator failed; the canned set was installed instead.
    Fallback {
        /// Why the generator's output was not used.
        reason: String,
    },
}

impl GenerateOutcome {
    /// Returns the fallback reason, if the canned set was used.
    #[must_use]
    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            Self::Generated => None,
            Self::Fallback { reason } => Some(reason),
        }
    }
}

/// A validated question set waiting to be installed.
///
/// Building a draft talks to the generator and needs no access to the
/// session, so callers holding the session behind a lock can prepare the
/// draft first and lock only to install it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizDraft {
    topic: String,
    questions: Vec<GeneratedQuestion>,
    outcome: GenerateOutcome,
    ticket: Option<u64>,
}

impl QuizDraft {
    /// Asks `generator` for `count` questions about `topic`.
    ///
    /// Invalid, short or failed generations are replaced with the canned set
    /// for the topic and reported as [`GenerateOutcome::Fallback`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EmptyInput`] when `topic` is blank.
    pub async fn request(
        topic: &str,
        count: usize,
        generator: &dyn ContentGenerator,
    ) -> Result<Self, SessionError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(SessionError::empty_input("quiz topic"));
        }

        let generated = generator
            .generate_questions(topic, count)
            .await
            .and_then(|questions| validate_batch(questions, count));

        let draft = match generated {
            Ok(questions) => Self {
                topic: topic.to_string(),
                questions,
                outcome: GenerateOutcome::Generated,
                ticket: None,
            },
            Err(e) => {
                warn!(
                    topic = %topic,
                    generator = generator.name(),
                    error = %e,
                    "Question generation failed, using canned questions"
                );
                Self {
                    topic: topic.to_string(),
                    questions: CannedGenerator::questions_for(topic, count),
                    outcome: GenerateOutcome::Fallback {
                        reason: e.to_string(),
                    },
                    ticket: None,
                }
            }
        };
        Ok(draft)
    }

    /// Stamps the draft with a ticket from [`QuizSession::reserve`].
    #[must_use]
    pub fn with_ticket(mut self, ticket: u64) -> Self {
        self.ticket = Some(ticket);
        self
    }

    /// Returns the submission ticket, if one was reserved.
    #[must_use]
    pub fn ticket(&self) -> Option<u64> {
        self.ticket
    }

    /// Returns the trimmed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the number of questions in the draft.
    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Returns `true` if the draft has no questions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// A quiz on one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSession {
    topic: Option<String>,
    generation: u64,
    order: Vec<u32>,
    questions: HashMap<u32, Arc<QuizQuestion>>,
    questions_per_quiz: usize,
    requested: u64,
    installed: u64,
}

impl Default for QuizSession {
    fn default() -> Self {
        Self::new(DEFAULT_QUESTIONS_PER_QUIZ)
    }
}

impl QuizSession {
    /// Creates an empty quiz that generates `questions_per_quiz` questions.
    #[must_use]
    pub fn new(questions_per_quiz: usize) -> Self {
        Self {
            topic: None,
            generation: 0,
            order: Vec::new(),
            questions: HashMap::new(),
            questions_per_quiz,
            requested: 0,
            installed: 0,
        }
    }

    /// Reserves the next submission ticket.
    ///
    /// Tickets order overlapping generations: a draft stamped with a ticket
    /// older than the installed set is refused by [`QuizSession::install`].
    pub fn reserve(&mut self) -> u64 {
        self.requested += 1;
        self.requested
    }

    /// Generates and installs a fresh question set for `topic`.
    ///
    /// The previous set, answers included, is replaced wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EmptyInput`] when `topic` is blank; the
    /// current set is kept in that case.
    pub async fn generate(
        &mut self,
        topic: &str,
        generator: &dyn ContentGenerator,
    ) -> Result<GenerateOutcome, SessionError> {
        let draft = QuizDraft::request(topic, self.questions_per_quiz, generator).await?;
        let ticket = self.reserve();
        self.install(draft.with_ticket(ticket))
    }

    /// Replaces the current set with `draft`. Ids restart at 1.
    ///
    /// A draft without a ticket is treated as the newest submission.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Superseded`] when a set submitted after
    /// `draft` is already installed; the current set is kept.
    pub fn install(&mut self, draft: QuizDraft) -> Result<GenerateOutcome, SessionError> {
        let QuizDraft {
            topic,
            questions,
            outcome,
            ticket,
        } = draft;

        let ticket = match ticket {
            Some(ticket) => ticket,
            None => self.reserve(),
        };
        if ticket <= self.installed {
            warn!(
                topic = %topic,
                ticket,
                installed = self.installed,
                "Dropping quiz superseded by a newer request"
            );
            return Err(SessionError::superseded(ticket, self.installed));
        }

        let mut order = Vec::with_capacity(questions.len());
        let mut by_id = HashMap::with_capacity(questions.len());
        for (id, generated) in (1u32..).zip(questions) {
            order.push(id);
            by_id.insert(id, Arc::new(QuizQuestion::from_generated(id, generated)));
        }

        self.installed = ticket;
        self.generation += 1;
        self.order = order;
        self.questions = by_id;
        info!(
            topic = %topic,
            generation = self.generation,
            questions = self.order.len(),
            fallback = outcome.fallback_reason().is_some(),
            "Quiz installed"
        );
        self.topic = Some(topic);
        Ok(outcome)
    }

    /// Records `option_index` as the answer to question `question_id`.
    ///
    /// Re-selecting the current answer changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::OptionOutOfRange`] or
    /// [`SessionError::UnknownQuestion`]; the session is unchanged.
    pub fn select_answer(
        &mut self,
        question_id: u32,
        option_index: usize,
    ) -> Result<Arc<QuizQuestion>, SessionError> {
        if option_index >= OPTION_COUNT {
            return Err(SessionError::OptionOutOfRange {
                index: option_index,
            });
        }

        let Some(current) = self.questions.get_mut(&question_id) else {
            return Err(SessionError::unknown_question(question_id, self.generation));
        };

        if current.user_answer_index != Some(option_index) {
            let mut updated = QuizQuestion::clone(current);
            updated.user_answer_index = Some(option_index);
            *current = Arc::new(updated);
        }
        Ok(Arc::clone(current))
    }

    /// Like [`select_answer`](Self::select_answer), but only if `generation`
    /// is still the installed one.
    ///
    /// # Errors
    ///
    /// A stale generation is reported as [`SessionError::UnknownQuestion`].
    pub fn select_answer_in(
        &mut self,
        generation: u64,
        question_id: u32,
        option_index: usize,
    ) -> Result<Arc<QuizQuestion>, SessionError> {
        if generation != self.generation {
            return Err(SessionError::unknown_question(question_id, generation));
        }
        self.select_answer(question_id, option_index)
    }

    /// Counts correct answers over the current set.
    #[must_use]
    pub fn score(&self) -> QuizScore {
        self.questions().fold(QuizScore::default(), |mut score, q| {
            score.total += 1;
            match q.verdict() {
                Verdict::Correct => {
                    score.correct += 1;
                    score.answered += 1;
                }
                Verdict::Incorrect => score.answered += 1,
                Verdict::Unanswered => {}
            }
            score
        })
    }

    /// Returns the verdict for every question, in order.
    #[must_use]
    pub fn results(&self) -> Vec<QuestionResult> {
        self.questions()
            .map(|q| QuestionResult {
                question_id: q.id,
                verdict: q.verdict(),
                user_answer_index: q.user_answer_index,
                correct_option_index: q.correct_option_index,
            })
            .collect()
    }

    /// Returns `true` once every question has an answer.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.order.is_empty() && self.questions().all(|q| q.user_answer_index.is_some())
    }

    /// Returns the questions in display order.
    pub fn questions(&self) -> impl Iterator<Item = &Arc<QuizQuestion>> + '_ {
        self.order.iter().filter_map(|id| self.questions.get(id))
    }

    /// Looks up a question of the current set.
    #[must_use]
    pub fn question(&self, id: u32) -> Option<&Arc<QuizQuestion>> {
        self.questions.get(&id)
    }

    /// Returns the topic of the installed set.
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Returns the number of sets installed so far.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the configured quiz size.
    #[must_use]
    pub const fn questions_per_quiz(&self) -> usize {
        self.questions_per_quiz
    }

    /// Returns the number of installed questions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if no set is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns where the quiz is in its lifecycle.
    #[must_use]
    pub fn status(&self) -> QuizStatus {
        if self.generation == 0 {
            QuizStatus::Empty
        } else {
            QuizStatus::Generated
        }
    }

    /// Captures the quiz for display or broadcast.
    #[must_use]
    pub fn view(&self) -> QuizView {
        QuizView {
            topic: self.topic.clone(),
            generation: self.generation,
            status: self.status(),
            questions: self.questions().map(|q| QuizQuestion::clone(q)).collect(),
        }
    }
}

/// Point-in-time copy of a quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizView {
    /// Topic of the installed set.
    pub topic: Option<String>,
    /// Generation counter of the installed set.
    pub generation: u64,
    /// Lifecycle position.
    pub status: QuizStatus,
    /// Questions in display order.
    pub questions: Vec<QuizQuestion>,
}
