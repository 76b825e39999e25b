//! Integration tests for the conversation and quiz sessions.
//!
//! These tests drive the public session API end to end with real timers and
//! the canned generator, the way the service wires them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use edumate_content::canned::REPLY_POOL;
use edumate_content::{
    CannedGenerator, ContentGenerator, GeneratedQuestion, GeneratorError, GeneratorErrorKind,
    Speaker, Turn,
};
use edumate_session::{
    ChatOptions, ChatSession, ConversationSession, EventBroadcaster, GenerateOutcome,
    QuizSession, QuizStatus, SessionError, Verdict,
};
use tokio::time::timeout;

/// Greeting used by every chat in these tests.
const GREETING: &str = "Hi! I'm your AI learning assistant. Ask me anything!";

/// Generator that answers nothing and offers no questions.
struct BrokenGenerator;

#[async_trait]
impl ContentGenerator for BrokenGenerator {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn generate_reply(&self, _transcript: &[Turn]) -> edumate_content::Result<String> {
        Err(GeneratorError::api(GeneratorErrorKind::Server, "503"))
    }

    async fn generate_questions(
        &self,
        _topic: &str,
        _count: usize,
    ) -> edumate_content::Result<Vec<GeneratedQuestion>> {
        Err(GeneratorError::malformed("not JSON"))
    }
}

fn fast_options() -> ChatOptions {
    ChatOptions {
        reply_delay: Duration::from_millis(20),
        fallback_reply: "Sorry, no answer right now.".to_string(),
    }
}

/// Polls until the chat holds `len` turns or two seconds pass.
async fn wait_for_turns(chat: &ChatSession, len: usize) -> Vec<Turn> {
    timeout(Duration::from_secs(2), async {
        loop {
            let turns = chat.turns().await;
            if turns.len() >= len {
                return turns;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Timed out waiting for assistant reply")
}

// ============================================================================
// Conversation
// ============================================================================

/// A fresh conversation holds exactly the assistant greeting.
#[test]
fn test_initialize_yields_single_greeting() {
    let session = ConversationSession::new(GREETING);

    assert_eq!(session.len(), 1);
    let greeting = session.last().expect("greeting");
    assert_eq!(greeting.speaker(), Speaker::Assistant);
    assert_eq!(greeting.text(), GREETING);
}

/// A message grows the transcript by one immediately and by two after the
/// reply delay.
#[tokio::test]
async fn test_exchange_appends_learner_then_assistant() {
    let chat = ChatSession::spawn(
        GREETING,
        Arc::new(CannedGenerator::with_seed(11)),
        fast_options(),
        EventBroadcaster::default(),
    );

    chat.submit("What is photosynthesis?")
        .await
        .expect("submit");
    assert_eq!(chat.turns().await.len(), 2);

    let turns = wait_for_turns(&chat, 3).await;
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[1].speaker(), Speaker::Learner);
    assert_eq!(turns[1].text(), "What is photosynthesis?");
    assert_eq!(turns[2].speaker(), Speaker::Assistant);
    assert!(REPLY_POOL.contains(&turns[2].text()));
}

/// Blank messages never change the transcript.
#[tokio::test]
async fn test_blank_messages_leave_transcript_unchanged() {
    let chat = ChatSession::spawn(
        GREETING,
        Arc::new(CannedGenerator::new()),
        fast_options(),
        EventBroadcaster::default(),
    );

    for blank in ["", "   "] {
        let err = chat.submit(blank).await.expect_err("blank must be rejected");
        assert!(matches!(err, SessionError::EmptyInput { .. }));
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(chat.turns().await.len(), 1);
}

/// Rapid messages are answered in the order they were sent.
#[tokio::test]
async fn test_rapid_messages_are_answered_in_order() {
    let chat = ChatSession::spawn(
        GREETING,
        Arc::new(CannedGenerator::new()),
        fast_options(),
        EventBroadcaster::default(),
    );

    chat.submit("first").await.expect("submit");
    chat.submit("second").await.expect("submit");
    chat.submit("third").await.expect("submit");

    let turns = wait_for_turns(&chat, 7).await;
    let speakers: Vec<Speaker> = turns.iter().map(Turn::speaker).collect();
    assert_eq!(
        speakers,
        vec![
            Speaker::Assistant,
            Speaker::Learner,
            Speaker::Learner,
            Speaker::Learner,
            Speaker::Assistant,
            Speaker::Assistant,
            Speaker::Assistant,
        ]
    );
    assert_eq!(chat.pending_replies().await, 0);
}

/// A failing generator still yields a visible reply.
#[tokio::test]
async fn test_failing_generator_appends_fallback_reply() {
    let options = fast_options();
    let fallback = options.fallback_reply.clone();
    let chat = ChatSession::spawn(
        GREETING,
        Arc::new(BrokenGenerator),
        options,
        EventBroadcaster::default(),
    );

    chat.submit("Are you there?").await.expect("submit");

    let turns = wait_for_turns(&chat, 3).await;
    assert_eq!(turns[2].text(), fallback);
}

// ============================================================================
// Quiz
// ============================================================================

/// Generating yields unanswered four-option questions with valid indices.
#[tokio::test]
async fn test_generate_produces_valid_questions() {
    let mut quiz = QuizSession::default();
    let outcome = quiz
        .generate("Newton's Laws", &CannedGenerator::new())
        .await
        .expect("generate");

    assert_eq!(outcome, GenerateOutcome::Generated);
    assert_eq!(quiz.status(), QuizStatus::Generated);
    for question in quiz.questions() {
        assert_eq!(question.options().len(), 4);
        assert!(question.correct_option_index() <= 3);
        assert_eq!(question.user_answer_index(), None);
    }
}

/// Regenerating keeps the per-quiz question count.
#[tokio::test]
async fn test_generate_twice_keeps_cardinality() {
    let generator = CannedGenerator::new();
    let mut quiz = QuizSession::default();

    quiz.generate("Optics", &generator).await.expect("generate");
    quiz.generate("Optics", &generator).await.expect("generate");

    assert_eq!(quiz.len(), 3);
    assert_eq!(quiz.generation(), 2);
}

/// The worked example: all correct, then one wrong.
#[tokio::test]
async fn test_newtons_laws_scoring() {
    let mut quiz = QuizSession::default();
    quiz.generate("Newton's Laws", &CannedGenerator::new())
        .await
        .expect("generate");

    quiz.select_answer(1, 1).expect("answer");
    quiz.select_answer(2, 2).expect("answer");
    quiz.select_answer(3, 0).expect("answer");
    let score = quiz.score();
    assert_eq!((score.correct, score.total), (3, 3));

    quiz.select_answer(2, 0).expect("answer");
    let score = quiz.score();
    assert_eq!((score.correct, score.total), (2, 3));
    assert_eq!(quiz.results()[1].verdict, Verdict::Incorrect);
}

/// Unknown question ids leave the quiz exactly as it was.
#[tokio::test]
async fn test_unknown_question_leaves_state_equal() {
    let mut quiz = QuizSession::default();
    quiz.generate("Optics", &CannedGenerator::new())
        .await
        .expect("generate");
    let before = quiz.clone();

    assert!(quiz.select_answer(42, 0).is_err());
    assert_eq!(quiz, before);
}

/// A broken generator degrades to the canned set with a visible reason.
#[tokio::test]
async fn test_generator_failure_installs_canned_set() {
    let mut quiz = QuizSession::default();
    let outcome = quiz
        .generate("Genetics", &BrokenGenerator)
        .await
        .expect("generate");

    assert!(outcome
        .fallback_reason()
        .expect("fallback")
        .contains("not JSON"));
    assert_eq!(quiz.len(), 3);
    assert_eq!(
        quiz.question(3).expect("question").prompt(),
        "How is Genetics applied in practice?"
    );
}
