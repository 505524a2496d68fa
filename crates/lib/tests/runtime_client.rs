//! Integration tests for the runtime HTTP client against a mock server.
//! Covers liveness probing, model matching, pull errors, streaming chat, and abort.

use std::time::Duration;

use lib::llm::{ChatMessage, OllamaClient, OllamaError};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn unreachable_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    let port = listener.local_addr().expect("local_addr").port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

async fn client_for(server: &MockServer) -> OllamaClient {
    OllamaClient::new(Some(server.uri()))
}

#[tokio::test]
async fn is_running_true_when_server_responds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Ollama is running"))
        .mount(&server)
        .await;

    assert!(client_for(&server).await.is_running().await);
}

#[tokio::test]
async fn is_running_false_when_unreachable_or_erroring() {
    let client = OllamaClient::new(Some(unreachable_base_url()));
    assert!(!client.is_running().await);

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    assert!(!client_for(&server).await.is_running().await);
}

#[tokio::test]
async fn has_model_matches_bare_name_against_tags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "llama3.2:1b", "size": 1_300_000_000u64}]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert!(client.has_model("llama3.2").await);
    assert!(client.has_model("llama3.2:1b").await);
    assert!(!client.has_model("llama3.2:3b").await);
    assert!(!client.has_model("llama3").await);
}

#[tokio::test]
async fn has_model_does_not_match_longer_base_names() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "llama3.2-vision:1b"}]
        })))
        .mount(&server)
        .await;

    assert!(!client_for(&server).await.has_model("llama3.2").await);
}

#[tokio::test]
async fn model_listing_failures_default_to_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert!(matches!(
        client.list_models().await,
        Err(OllamaError::Api(_))
    ));
    assert!(!client.has_model("llama3.2").await);
}

#[tokio::test]
async fn pull_model_surfaces_explicit_error_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/pull"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": "pull failure"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let mut statuses = Vec::new();
    let mut on_progress = |status: &str, _c: u64, _t: u64| statuses.push(status.to_string());
    let res = client.pull_model("llama3.2:1b", &mut on_progress).await;
    match res {
        Err(OllamaError::Api(msg)) => assert_eq!(msg, "pull failure"),
        other => panic!("expected Api error, got {:?}", other),
    }
    assert_eq!(statuses, vec!["Starting pull..."]);
}

#[tokio::test]
async fn pull_model_reports_start_and_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/pull"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let mut events = Vec::new();
    let mut on_progress =
        |status: &str, completed: u64, total: u64| events.push((status.to_string(), completed, total));
    client
        .pull_model("llama3.2:1b", &mut on_progress)
        .await
        .expect("pull");
    assert_eq!(events.first().map(|e| e.0.as_str()), Some("Starting pull..."));
    assert_eq!(events.last(), Some(&("Done".to_string(), 100, 100)));
}

#[tokio::test]
async fn chat_streams_tokens_and_returns_accumulated_reply() {
    let server = MockServer::start().await;
    let body = concat!(
        r#"{"message":{"role":"assistant","content":"Hel"}}"#,
        "\n",
        r#"{"message":{"role":"assistant","content":"lo"}}"#,
        "\n",
        r#"{"message":{"role":"assistant","content":""},"done":true}"#,
        "\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let mut tokens = Vec::new();
    let mut on_token = |t: &str| tokens.push(t.to_string());
    let reply = client
        .chat("llama3.2:1b", vec![ChatMessage::user("hi")], &mut on_token)
        .await
        .expect("chat");
    assert_eq!(reply, "Hello");
    assert_eq!(tokens, vec!["Hel", "lo"]);
}

#[tokio::test]
async fn chat_parses_final_record_without_trailing_newline() {
    let server = MockServer::start().await;
    let body = concat!(
        r#"{"message":{"role":"assistant","content":"almost"}}"#,
        "\n",
        r#"{"message":{"role":"assistant","content":" done"}}"#,
    );
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let mut on_token = |_: &str| {};
    let reply = client
        .chat("llama3.2:1b", vec![ChatMessage::user("hi")], &mut on_token)
        .await
        .expect("chat");
    assert_eq!(reply, "almost done");
}

#[tokio::test]
async fn chat_stops_on_error_record_with_its_message() {
    let server = MockServer::start().await;
    let body = concat!(
        r#"{"message":{"role":"assistant","content":"Hel"}}"#,
        "\n",
        r#"{"error":"model not found"}"#,
        "\n",
        r#"{"message":{"role":"assistant","content":"lo"}}"#,
        "\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let mut tokens = Vec::new();
    let mut on_token = |t: &str| tokens.push(t.to_string());
    let res = client
        .chat("llama3.2:1b", vec![ChatMessage::user("hi")], &mut on_token)
        .await;
    match res {
        Err(OllamaError::Api(msg)) => assert_eq!(msg, "model not found"),
        other => panic!("expected Api error, got {:?}", other),
    }
    assert_eq!(tokens, vec!["Hel"]);
}

#[tokio::test]
async fn chat_reports_transport_failure_as_connect() {
    let client = OllamaClient::new(Some(unreachable_base_url()));
    let mut on_token = |_: &str| {};
    let res = client
        .chat("llama3.2:1b", vec![ChatMessage::user("hi")], &mut on_token)
        .await;
    assert!(matches!(res, Err(OllamaError::Connect(_))));
}

#[tokio::test]
async fn abort_with_nothing_in_flight_is_a_noop() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            concat!(r#"{"message":{"role":"assistant","content":"ok"}}"#, "\n"),
            "application/x-ndjson",
        ))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    client.abort();

    // A later chat call is unaffected.
    let mut on_token = |_: &str| {};
    let reply = client
        .chat("llama3.2:1b", vec![ChatMessage::user("hi")], &mut on_token)
        .await
        .expect("chat after idle abort");
    assert_eq!(reply, "ok");
}

#[tokio::test]
async fn abort_cancels_the_in_flight_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(5))
                .set_body_raw(
                    concat!(r#"{"message":{"role":"assistant","content":"late"}}"#, "\n"),
                    "application/x-ndjson",
                ),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let in_flight = client.clone();
    let handle = tokio::spawn(async move {
        let mut on_token = |_: &str| {};
        in_flight
            .chat("llama3.2:1b", vec![ChatMessage::user("hi")], &mut on_token)
            .await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    client.abort();

    let res = handle.await.expect("join");
    assert!(matches!(res, Err(OllamaError::Cancelled)));
}
