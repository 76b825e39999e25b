//! EduMate Session Core
//!
//! Conversation and quiz sessions for the learning assistant, plus the HTTP
//! API and WebSocket events that expose them to a UI.

pub mod api;
pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod quiz;
pub mod websocket;

pub use api::{
    create_router, AppState, ChatMessageRequest, ChatMessageResponse, ErrorResponse,
    GenerateQuizRequest, GenerateQuizResponse, HealthResponse, ScoreResponse,
    SelectAnswerRequest,
};
pub use chat::{ChatOptions, ChatSession};
pub use config::{Config, GeneratorKind, OpenAiSettings};
pub use conversation::{ConversationSession, ReplyTicket, TranscriptSnapshot};
pub use error::{EduError, Result, SessionError};
pub use quiz::{
    GenerateOutcome, QuestionResult, QuizDraft, QuizQuestion, QuizScore, QuizSession, QuizStatus,
    QuizView, Verdict, DEFAULT_QUESTIONS_PER_QUIZ,
};
pub use websocket::{EventBroadcaster, SessionEvent};
