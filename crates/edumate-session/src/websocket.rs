//! WebSocket event types and broadcasting for live session updates.
//!
//! Every change to the conversation or the quiz is broadcast to all connected
//! clients, so a UI can render turns as they land instead of polling.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, includes transcript and quiz
//! - `turn_appended` - A learner or assistant turn joined the transcript
//! - `quiz_generated` - A new question set was installed
//! - `answer_selected` - The learner picked an option
//! - `error` - Something went wrong while handling a request
//!
//! # Example
//!
//! ```no_run
//! use edumate_content::Turn;
//! use edumate_session::websocket::{EventBroadcaster, SessionEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(SessionEvent::turn_appended(1, Turn::learner("Hello")));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {}", event.event_name());
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use edumate_content::Turn;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::conversation::TranscriptSnapshot;
use crate::quiz::QuizView;

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// The conversation as it stands.
    pub chat: TranscriptSnapshot,
    /// The quiz as it stands.
    pub quiz: QuizView,
}

/// Payload for the `turn_appended` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnAppendedPayload {
    /// Position of the turn in the transcript.
    pub index: usize,
    /// The new turn.
    pub turn: Turn,
}

/// Payload for the `quiz_generated` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizGeneratedPayload {
    /// The trimmed topic.
    pub topic: String,
    /// Generation counter of the installed set.
    pub generation: u64,
    /// Number of questions installed.
    pub question_count: usize,
    /// Whether the canned fallback set was installed.
    pub fallback: bool,
}

/// Payload for the `answer_selected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSelectedPayload {
    /// The answered question.
    pub question_id: u32,
    /// The chosen option.
    pub option_index: usize,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable error message.
    pub message: String,
}

// ============================================================================
// Event Enum
// ============================================================================

/// WebSocket event types for session observation.
///
/// All events are serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// Sent when a turn joins the transcript.
    TurnAppended(TurnAppendedPayload),
    /// Sent when a quiz is generated.
    QuizGenerated(QuizGeneratedPayload),
    /// Sent when an answer is recorded.
    AnswerSelected(AnswerSelectedPayload),
    /// Sent when an error occurs.
    Error(ErrorPayload),
}

impl SessionEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(chat: TranscriptSnapshot, quiz: QuizView) -> Self {
        Self::Connected(ConnectedPayload { chat, quiz })
    }

    /// Creates a `TurnAppended` event.
    #[must_use]
    pub const fn turn_appended(index: usize, turn: Turn) -> Self {
        Self::TurnAppended(TurnAppendedPayload { index, turn })
    }

    /// Creates a `QuizGenerated` event.
    #[must_use]
    pub const fn quiz_generated(
        topic: String,
        generation: u64,
        question_count: usize,
        fallback: bool,
    ) -> Self {
        Self::QuizGenerated(QuizGeneratedPayload {
            topic,
            generation,
            question_count,
            fallback,
        })
    }

    /// Creates an `AnswerSelected` event.
    #[must_use]
    pub const fn answer_selected(question_id: u32, option_index: usize) -> Self {
        Self::AnswerSelected(AnswerSelectedPayload {
            question_id,
            option_index,
        })
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::TurnAppended(_) => "turn_appended",
            Self::QuizGenerated(_) => "quiz_generated",
            Self::AnswerSelected(_) => "answer_selected",
            Self::Error(_) => "error",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts session events to all connected WebSocket clients.
///
/// Events are not persisted for disconnected clients.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a new `EventBroadcaster` with the specified buffer capacity.
    ///
    /// The buffer determines how many events can be queued per subscriber
    /// before old events are dropped.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber for receiving events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event to all connected subscribers.
    ///
    /// Returns the number of receivers; 0 means nobody is listening.
    pub fn send(&self, event: SessionEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// WebSocket upgrade handler for `/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drives one WebSocket connection.
///
/// Sends `connected` first, then forwards broadcast events and pings every
/// 30 seconds. The connection closes after 3 unanswered pings.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading state so nothing between the two is missed
    let mut event_receiver = state.broadcaster.subscribe();

    let chat = state.chat.snapshot().await;
    let quiz = state.quiz.lock().await.view();
    let connected_json = match serde_json::to_string(&SessionEvent::connected(chat, quiz)) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize connected event: {}", e);
            return;
        }
    };

    if sender.send(Message::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    info!("WebSocket client connected, sent current sessions");

    let mut heartbeat_interval = interval(HEARTBEAT_INTERVAL);
    // The first tick completes immediately
    heartbeat_interval.tick().await;
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        debug!("Ignoring data message from client");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }

            event = event_receiver.recv() => {
                match event {
                    Ok(session_event) => {
                        let json = match serde_json::to_string(&session_event) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize event: {}", e);
                                continue;
                            }
                        };

                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Broadcaster closed");
                        break;
                    }
                }
            }

            _ = heartbeat_interval.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

// ============================================================================
// Tests
// ============================================================================
