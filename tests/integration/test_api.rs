//! Integration tests for the HTTP API against a live server.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use edumate_content::CannedGenerator;
use edumate_session::{create_router, AppState, Config};
use reqwest::StatusCode;
use serde_json::{json, Value};

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Spawns a server with a short reply delay and returns its base URL.
async fn spawn_test_server() -> (String, tokio::task::JoinHandle<()>) {
    let config = Config {
        reply_delay_ms: 50,
        ..Config::default()
    };
    let state = AppState::new(config, Arc::new(CannedGenerator::with_seed(5)));

    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");
    let router = create_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://{addr}"), handle)
}

async fn get_json(client: &reqwest::Client, url: &str) -> Value {
    let response = client.get(url).send().await.expect("GET failed");
    assert_eq!(response.status(), StatusCode::OK);
    response.json().await.expect("Invalid JSON")
}

// ============================================================================
// Chat
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (base, _handle) = spawn_test_server().await;
    let client = reqwest::Client::new();

    let body = get_json(&client, &format!("{base}/api/health")).await;
    assert_eq!(body["status"], "ok");
}

/// Posting a message returns 202 and the reply shows up shortly after.
#[tokio::test]
async fn test_chat_message_gets_deferred_reply() {
    let (base, _handle) = spawn_test_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/chat/messages"))
        .json(&json!({ "text": "Explain momentum" }))
        .send()
        .await
        .expect("POST failed");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body: Value = response.json().await.expect("Invalid JSON");
    assert_eq!(body["turn"]["text"], "Explain momentum");

    let mut turns = Vec::new();
    for _ in 0..50 {
        let chat = get_json(&client, &format!("{base}/api/chat")).await;
        turns = chat["turns"].as_array().cloned().unwrap_or_default();
        if turns.len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(turns.len(), 3, "reply never arrived: {turns:?}");
    assert_eq!(turns[1]["speaker"], "learner");
    assert_eq!(turns[2]["speaker"], "assistant");
}

#[tokio::test]
async fn test_blank_chat_message_is_rejected() {
    let (base, _handle) = spawn_test_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/chat/messages"))
        .json(&json!({ "text": "  " }))
        .send()
        .await
        .expect("POST failed");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.expect("Invalid JSON");
    assert!(body["error"].is_string());

    let chat = get_json(&client, &format!("{base}/api/chat")).await;
    assert_eq!(chat["turns"].as_array().map(Vec::len), Some(1));
}

// ============================================================================
// Quiz
// ============================================================================

/// Generate, answer, re-answer and score over HTTP.
#[tokio::test]
async fn test_quiz_round_trip() {
    let (base, _handle) = spawn_test_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/quiz"))
        .json(&json!({ "topic": "Newton's Laws" }))
        .send()
        .await
        .expect("POST failed");
    assert_eq!(response.status(), StatusCode::OK);
    let quiz: Value = response.json().await.expect("Invalid JSON");
    assert_eq!(quiz["topic"], "Newton's Laws");
    assert_eq!(quiz["questions"].as_array().map(Vec::len), Some(3));
    let generation = quiz["generation"].as_u64().expect("generation");

    for (question_id, option_index) in [(1, 1), (2, 2), (3, 0), (2, 3)] {
        let response = client
            .post(format!("{base}/api/quiz/answers"))
            .json(&json!({
                "questionId": question_id,
                "optionIndex": option_index,
                "generation": generation,
            }))
            .send()
            .await
            .expect("POST failed");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let score = get_json(&client, &format!("{base}/api/quiz/score")).await;
    assert_eq!(score["correct"], 2);
    assert_eq!(score["total"], 3);
    assert_eq!(score["complete"], true);

    let quiz = get_json(&client, &format!("{base}/api/quiz")).await;
    assert_eq!(quiz["questions"][1]["userAnswerIndex"], 3);
}

#[tokio::test]
async fn test_quiz_rejections_leave_state_unchanged() {
    let (base, _handle) = spawn_test_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/api/quiz"))
        .json(&json!({ "topic": "Optics" }))
        .send()
        .await
        .expect("POST failed");
    let before = get_json(&client, &format!("{base}/api/quiz")).await;

    let blank_topic = client
        .post(format!("{base}/api/quiz"))
        .json(&json!({ "topic": "   " }))
        .send()
        .await
        .expect("POST failed");
    assert_eq!(blank_topic.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let unknown = client
        .post(format!("{base}/api/quiz/answers"))
        .json(&json!({ "questionId": 12, "optionIndex": 0 }))
        .send()
        .await
        .expect("POST failed");
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let out_of_range = client
        .post(format!("{base}/api/quiz/answers"))
        .json(&json!({ "questionId": 1, "optionIndex": 5 }))
        .send()
        .await
        .expect("POST failed");
    assert_eq!(out_of_range.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let after = get_json(&client, &format!("{base}/api/quiz")).await;
    assert_eq!(before, after);
}
