//! HTTP API endpoints for the EduMate session service.
//!
//! # Endpoints
//!
//! - `GET /api/health` - Liveness probe
//! - `GET /api/chat` - Current transcript
//! - `POST /api/chat/messages` - Submit a learner message
//! - `GET /api/quiz` - Current quiz
//! - `POST /api/quiz` - Generate a quiz for a topic
//! - `POST /api/quiz/answers` - Select an answer
//! - `GET /api/quiz/score` - Score the current quiz
//! - `GET /ws` - WebSocket event stream
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use edumate_content::CannedGenerator;
//! use edumate_session::{create_router, AppState, Config};
//!
//! # async fn example() {
//! let state = AppState::new(Config::default(), Arc::new(CannedGenerator::new()));
//! let router = create_router(Arc::new(state));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use edumate_content::{ContentGenerator, Turn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::chat::ChatSession;
use crate::config::Config;
use crate::conversation::TranscriptSnapshot;
use crate::error::SessionError;
use crate::quiz::{QuestionResult, QuizDraft, QuizQuestion, QuizScore, QuizSession, QuizView};
use crate::websocket::{ws_handler, EventBroadcaster, SessionEvent};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response body for the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: String,
}

/// Request body for submitting a learner message.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessageRequest {
    /// The message text.
    pub text: String,
}

/// Response body for an accepted learner message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageResponse {
    /// The appended learner turn.
    pub turn: Turn,
    /// Replies still outstanding, this one included.
    pub pending_replies: usize,
}

/// Request body for generating a quiz.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateQuizRequest {
    /// The quiz topic.
    pub topic: String,
}

/// Response body for a generated quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQuizResponse {
    /// The installed quiz.
    #[serde(flatten)]
    pub quiz: QuizView,
    /// Why the canned set was used, or `null` if the generator succeeded.
    pub fallback: Option<String>,
}

/// Request body for selecting an answer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectAnswerRequest {
    /// The question to answer.
    pub question_id: u32,
    /// The chosen option, 0 to 3.
    pub option_index: usize,
    /// Quiz generation the client is looking at. Stale generations are
    /// rejected as unknown questions.
    #[serde(default)]
    pub generation: Option<u64>,
}

/// Response body for the score endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResponse {
    /// Correct, answered and total counts.
    #[serde(flatten)]
    pub score: QuizScore,
    /// Rounded share of correct answers.
    pub percent: usize,
    /// Whether every question has an answer.
    pub complete: bool,
    /// Per-question verdicts.
    pub results: Vec<QuestionResult>,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
///
/// Each session sits behind its own lock, so requests against the same
/// session are handled one at a time.
pub struct AppState {
    /// Service configuration.
    pub config: Config,
    /// The conversation and its reply worker.
    pub chat: ChatSession,
    /// The quiz.
    pub quiz: Mutex<QuizSession>,
    /// Generator used for quiz questions.
    pub generator: Arc<dyn ContentGenerator>,
    /// Event fan-out to WebSocket clients.
    pub broadcaster: EventBroadcaster,
}

impl AppState {
    /// Creates fresh sessions from `config`.
    ///
    /// Must be called inside a Tokio runtime: the conversation starts its
    /// reply worker immediately.
    pub fn new(config: Config, generator: Arc<dyn ContentGenerator>) -> Self {
        let broadcaster = EventBroadcaster::new(config.event_buffer_size);
        let chat = ChatSession::from_config(&config, Arc::clone(&generator), broadcaster.clone());
        let quiz = Mutex::new(QuizSession::new(config.questions_per_quiz));
        Self {
            config,
            chat,
            quiz,
            generator,
            broadcaster,
        }
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("chat", &self.chat)
            .field("generator", &self.generator.name())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
enum ApiError {
    /// Input that can never succeed as sent.
    Unprocessable(String),
    /// Reference to a question that does not exist.
    NotFound(String),
    /// Request overtaken by a newer one.
    Conflict(String),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::UnknownQuestion { .. } => Self::NotFound(err.to_string()),
            SessionError::Superseded { .. } => Self::Conflict(err.to_string()),
            SessionError::EmptyInput { .. } | SessionError::OptionOutOfRange { .. } => {
                Self::Unprocessable(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

/// Logs and broadcasts a rejected request.
fn reject(state: &AppState, err: SessionError) -> ApiError {
    warn!(error = %err, "Request rejected");
    state.broadcaster.send(SessionEvent::error(err.to_string()));
    ApiError::from(err)
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints and the WebSocket route.
///
/// CORS is open to any origin and every request is traced.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handle_health))
        .route("/chat", get(handle_get_chat))
        .route("/chat/messages", post(handle_post_message))
        .route("/quiz", get(handle_get_quiz).post(handle_generate_quiz))
        .route("/quiz/answers", post(handle_select_answer))
        .route("/quiz/score", get(handle_score));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Handler for `GET /api/chat`.
async fn handle_get_chat(State(state): State<Arc<AppState>>) -> Json<TranscriptSnapshot> {
    Json(state.chat.snapshot().await)
}

/// Handler for `POST /api/chat/messages`.
///
/// Appends the learner turn right away; the reply arrives later over the
/// WebSocket and in `GET /api/chat`.
async fn handle_post_message(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessageResponse>), ApiError> {
    let turn = state
        .chat
        .submit(&request.text)
        .await
        .map_err(|e| reject(&state, e))?;
    let pending_replies = state.chat.pending_replies().await;

    info!(
        chars = request.text.chars().count(),
        pending_replies, "Learner message accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(ChatMessageResponse {
            turn,
            pending_replies,
        }),
    ))
}

/// Handler for `GET /api/quiz`.
async fn handle_get_quiz(State(state): State<Arc<AppState>>) -> Json<QuizView> {
    Json(state.quiz.lock().await.view())
}

/// Handler for `POST /api/quiz`.
///
/// Talks to the generator without holding the quiz lock, then installs the
/// finished set in one step. A request overtaken by a later one gets 409.
async fn handle_generate_quiz(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateQuizRequest>,
) -> Result<Json<GenerateQuizResponse>, ApiError> {
    let ticket = state.quiz.lock().await.reserve();
    info!(topic = %request.topic, ticket, "Quiz requested");

    let draft = QuizDraft::request(
        &request.topic,
        state.config.questions_per_quiz,
        state.generator.as_ref(),
    )
    .await
    .map_err(|e| reject(&state, e))?
    .with_ticket(ticket);

    let mut quiz = state.quiz.lock().await;
    let installed = quiz.install(draft).map(|outcome| (outcome, quiz.view()));
    drop(quiz);
    let (outcome, view) = installed.map_err(|e| reject(&state, e))?;

    let fallback = outcome.fallback_reason().map(str::to_string);
    state.broadcaster.send(SessionEvent::quiz_generated(
        view.topic.clone().unwrap_or_default(),
        view.generation,
        view.questions.len(),
        fallback.is_some(),
    ));

    Ok(Json(GenerateQuizResponse {
        quiz: view,
        fallback,
    }))
}

/// Handler for `POST /api/quiz/answers`.
async fn handle_select_answer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SelectAnswerRequest>,
) -> Result<Json<QuizQuestion>, ApiError> {
    let mut quiz = state.quiz.lock().await;
    let selected = match request.generation {
        Some(generation) => {
            quiz.select_answer_in(generation, request.question_id, request.option_index)
        }
        None => quiz.select_answer(request.question_id, request.option_index),
    };
    drop(quiz);
    let question = selected.map_err(|e| reject(&state, e))?;

    state.broadcaster.send(SessionEvent::answer_selected(
        request.question_id,
        request.option_index,
    ));

    Ok(Json(QuizQuestion::clone(&question)))
}

/// Handler for `GET /api/quiz/score`.
async fn handle_score(State(state): State<Arc<AppState>>) -> Json<ScoreResponse> {
    let quiz = state.quiz.lock().await;
    let score = quiz.score();
    Json(ScoreResponse {
        score,
        percent: score.percent(),
        complete: quiz.is_complete(),
        results: quiz.results(),
    })
}

// ============================================================================
// Tests
// ============================================================================
