//! Integration tests for WebSocket real-time event streaming.
//!
//! These tests validate connection handling, event broadcasting, and that
//! HTTP requests against the sessions show up on the stream.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use edumate_content::{CannedGenerator, Speaker};
use edumate_session::{create_router, AppState, Config, EventBroadcaster, SessionEvent};
use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Running test server handles.
struct TestServer {
    ws_url: String,
    http_url: String,
    broadcaster: EventBroadcaster,
    _handle: tokio::task::JoinHandle<()>,
}

/// Spawns the test server with a short reply delay.
async fn spawn_test_server() -> TestServer {
    let config = Config {
        reply_delay_ms: 50,
        ..Config::default()
    };
    let state = Arc::new(AppState::new(
        config,
        Arc::new(CannedGenerator::with_seed(9)),
    ));
    let broadcaster = state.broadcaster.clone();

    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        ws_url: format!("ws://{addr}/ws"),
        http_url: format!("http://{addr}"),
        broadcaster,
        _handle: handle,
    }
}

/// Connects a WebSocket client to the given URL.
async fn connect_client(url: &str) -> WsClient {
    let (ws_stream, _) = connect_async(url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Receives the next text message and parses it as a `SessionEvent`.
/// Automatically handles ping frames by responding with pong.
async fn receive_event(client: &mut WsClient) -> SessionEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

// ============================================================================
// Connection Tests
// ============================================================================

/// Tests that a client receives the current sessions on connect.
#[tokio::test]
async fn test_client_receives_connected_event_on_connect() {
    let server = spawn_test_server().await;

    let mut client = connect_client(&server.ws_url).await;
    let event = receive_event(&mut client).await;

    let SessionEvent::Connected(payload) = event else {
        panic!("Expected Connected event, got: {event:?}");
    };
    assert_eq!(payload.chat.turns.len(), 1);
    assert_eq!(payload.chat.turns[0].speaker(), Speaker::Assistant);
    assert_eq!(payload.quiz.generation, 0);
    assert!(payload.quiz.questions.is_empty());
}

/// Tests that multiple clients can connect concurrently.
#[tokio::test]
async fn test_multiple_clients_can_connect() {
    let server = spawn_test_server().await;

    let mut client1 = connect_client(&server.ws_url).await;
    let mut client2 = connect_client(&server.ws_url).await;

    assert!(matches!(
        receive_event(&mut client1).await,
        SessionEvent::Connected(_)
    ));
    assert!(matches!(
        receive_event(&mut client2).await,
        SessionEvent::Connected(_)
    ));
}

// ============================================================================
// Event Broadcast Tests
// ============================================================================

/// Tests that events are broadcast to all connected clients.
#[tokio::test]
async fn test_events_broadcast_to_all_clients() {
    let server = spawn_test_server().await;

    let mut client1 = connect_client(&server.ws_url).await;
    let mut client2 = connect_client(&server.ws_url).await;
    receive_event(&mut client1).await;
    receive_event(&mut client2).await;

    server.broadcaster.send(SessionEvent::error("generator offline"));

    for client in [&mut client1, &mut client2] {
        let event = receive_event(client).await;
        assert!(
            matches!(event, SessionEvent::Error(ref p) if p.message == "generator offline"),
            "Expected Error event, got: {event:?}"
        );
    }
}

// ============================================================================
// API Integration Tests
// ============================================================================

/// A chat message produces a learner turn event, then the assistant turn.
#[tokio::test]
async fn test_chat_message_streams_both_turns() {
    let server = spawn_test_server().await;
    let mut client = connect_client(&server.ws_url).await;
    receive_event(&mut client).await; // Consume connected event

    let response = reqwest::Client::new()
        .post(format!("{}/api/chat/messages", server.http_url))
        .json(&serde_json::json!({ "text": "What is energy?" }))
        .send()
        .await
        .expect("Failed to send HTTP request");
    assert!(response.status().is_success());

    let SessionEvent::TurnAppended(learner) = receive_event(&mut client).await else {
        panic!("Expected learner turn");
    };
    assert_eq!(learner.index, 1);
    assert_eq!(learner.turn.speaker(), Speaker::Learner);
    assert_eq!(learner.turn.text(), "What is energy?");

    let SessionEvent::TurnAppended(assistant) = receive_event(&mut client).await else {
        panic!("Expected assistant turn");
    };
    assert_eq!(assistant.index, 2);
    assert_eq!(assistant.turn.speaker(), Speaker::Assistant);
}

/// Quiz generation and answers are streamed.
#[tokio::test]
async fn test_quiz_requests_trigger_events() {
    let server = spawn_test_server().await;
    let mut client = connect_client(&server.ws_url).await;
    receive_event(&mut client).await; // Consume connected event

    let http = reqwest::Client::new();
    http.post(format!("{}/api/quiz", server.http_url))
        .json(&serde_json::json!({ "topic": "Electricity" }))
        .send()
        .await
        .expect("Failed to send HTTP request");

    let event = receive_event(&mut client).await;
    let SessionEvent::QuizGenerated(generated) = event else {
        panic!("Expected QuizGenerated event, got: {event:?}");
    };
    assert_eq!(generated.topic, "Electricity");
    assert_eq!(generated.question_count, 3);
    assert!(!generated.fallback);

    http.post(format!("{}/api/quiz/answers", server.http_url))
        .json(&serde_json::json!({ "questionId": 2, "optionIndex": 1 }))
        .send()
        .await
        .expect("Failed to send HTTP request");

    let event = receive_event(&mut client).await;
    let SessionEvent::AnswerSelected(selected) = event else {
        panic!("Expected AnswerSelected event, got: {event:?}");
    };
    assert_eq!(selected.question_id, 2);
    assert_eq!(selected.option_index, 1);
}

// ============================================================================
// Disconnection Tests
// ============================================================================

/// Tests that the server keeps streaming after a client disconnects.
#[tokio::test]
async fn test_server_continues_after_client_disconnect() {
    let server = spawn_test_server().await;

    let mut client1 = connect_client(&server.ws_url).await;
    receive_event(&mut client1).await;
    client1.close(None).await.ok();
    drop(client1);

    // Give server time to process disconnect
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut client2 = connect_client(&server.ws_url).await;
    assert!(matches!(
        receive_event(&mut client2).await,
        SessionEvent::Connected(_)
    ));

    server.broadcaster.send(SessionEvent::answer_selected(1, 0));
    assert!(matches!(
        receive_event(&mut client2).await,
        SessionEvent::AnswerSelected(_)
    ));
}
