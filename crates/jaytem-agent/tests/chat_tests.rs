use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use jaytem_agent::{chat::extract_content, ChatCompletionsBackend};
use jaytem_core::agent::{ModelBackend, ServiceError};
use serde_json::{json, Value};
use tracing_test::traced_test;

// ── mock service ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct Seen {
    headers: Option<HeaderMap>,
    query: HashMap<String, String>,
    body: Value,
}

type Shared = Arc<Mutex<Seen>>;

fn completion(text: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": text } }]
    })
}

async fn record(
    State(seen): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut s = seen.lock().unwrap();
    s.headers = Some(headers);
    s.query = query;
    s.body = body;
    Json(completion("SECRET-ANSWER"))
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn recording_server() -> (String, Shared) {
    let seen = Shared::default();
    let app = Router::new()
        .route("/openai/deployments/:deployment/chat/completions", post(record))
        .route("/v1/chat/completions", post(record))
        .with_state(seen.clone());
    (serve(app).await, seen)
}

async fn fixed_server(status: StatusCode, body: &'static str) -> String {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move || async move { (status, body) }),
    );
    serve(app).await
}

// ── requests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn azure_request_shape() {
    let (base, seen) = recording_server().await;
    let backend = ChatCompletionsBackend::azure(format!("{base}/"), "gpt4o-deploy", "2024-08-01-preview", "az-key");

    let out = backend.generate("the prompt").await.unwrap();
    assert_eq!(out, "SECRET-ANSWER");

    let s = seen.lock().unwrap();
    let headers = s.headers.as_ref().unwrap();
    assert_eq!(headers.get("api-key").unwrap(), "az-key");
    assert!(headers.get("authorization").is_none());
    assert_eq!(s.query.get("api-version").map(String::as_str), Some("2024-08-01-preview"));
    assert_eq!(
        s.body,
        json!({
            "messages": [{ "role": "user", "content": "the prompt" }],
            "temperature": 0.7,
            "max_tokens": 4000
        })
    );
}

#[tokio::test]
async fn openai_request_shape() {
    let (base, seen) = recording_server().await;
    let backend = ChatCompletionsBackend::openai(base, "gpt-4o", "sk-test").with_sampling(0.2, 1000);

    backend.generate("hello").await.unwrap();

    let s = seen.lock().unwrap();
    let headers = s.headers.as_ref().unwrap();
    assert_eq!(headers.get("authorization").unwrap(), "Bearer sk-test");
    assert_eq!(s.body["model"], "gpt-4o");
    assert_eq!(s.body["max_tokens"], 1000);
    assert_eq!(s.body["messages"][0]["content"], "hello");
}

#[test]
fn azure_url_layout() {
    let b = ChatCompletionsBackend::azure("https://firm.openai.azure.com", "dep", "2024-08-01-preview", "k");
    assert_eq!(
        b.url(),
        "https://firm.openai.azure.com/openai/deployments/dep/chat/completions?api-version=2024-08-01-preview"
    );
}

// ── failures ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn non_success_status_is_reported_with_body_length() {
    let base = fixed_server(StatusCode::TOO_MANY_REQUESTS, "slow down").await;
    let backend = ChatCompletionsBackend::openai(base, "m", "k");
    let err = backend.generate("p").await.unwrap_err();
    assert!(matches!(err, ServiceError::Status { status: 429, body_len: 9 }));
}

#[tokio::test]
async fn missing_content_is_malformed() {
    let base = fixed_server(StatusCode::OK, r#"{"choices":[]}"#).await;
    let backend = ChatCompletionsBackend::openai(base, "m", "k");
    let err = backend.generate("p").await.unwrap_err();
    assert!(matches!(err, ServiceError::MalformedResponse(_)));
}

#[test]
fn extract_content_cases() {
    assert_eq!(extract_content(&completion("x").to_string()).unwrap(), "x");
    for body in [
        "not json",
        "{}",
        r#"{"choices":[{"message":{"content":null}}]}"#,
        r#"{"choices":[{"finish_reason":"content_filter"}]}"#,
    ] {
        assert!(
            matches!(extract_content(body), Err(ServiceError::MalformedResponse(_))),
            "{body}"
        );
    }
}

#[tokio::test]
async fn unreachable_service_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = ChatCompletionsBackend::openai(format!("http://{addr}"), "m", "k");
    let err = backend.generate("p").await.unwrap_err();
    assert!(matches!(err, ServiceError::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn slow_service_times_out() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Json(completion("late"))
        }),
    );
    let base = serve(app).await;
    let backend = ChatCompletionsBackend::openai(base, "m", "k").with_timeout(1);
    let err = backend.generate("p").await.unwrap_err();
    assert!(matches!(err, ServiceError::Timeout { secs: 1 }), "{err:?}");
}

// ── logging ─────────────────────────────────────────────────────────────────

#[tokio::test]
#[traced_test]
async fn prompt_and_answer_text_stay_out_of_logs() {
    let (base, _seen) = recording_server().await;
    let backend = ChatCompletionsBackend::openai(base, "m", "k");

    backend.generate("SECRET-PROMPT about the client").await.unwrap();

    assert!(logs_contain("output_len"));
    assert!(logs_contain("prompt_len"));
    assert!(!logs_contain("SECRET-PROMPT"));
    assert!(!logs_contain("SECRET-ANSWER"));
}
