//! Integration tests for chat turns: history growth on success and rollback
//! on failure, against a mock runtime.

use lib::chat::{ChatError, ChatSessionManager, PaperContext};
use lib::llm::{OllamaClient, OllamaError};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn paper(title: &str) -> PaperContext {
    PaperContext {
        title: title.to_string(),
        text: "some extracted text".to_string(),
        ..Default::default()
    }
}

fn manager_with_session() -> ChatSessionManager {
    let mut mgr = ChatSessionManager::new("llama3.2:1b", 24_000);
    mgr.start_chat(vec![paper("A Paper")], Some("s1".into()));
    mgr
}

#[tokio::test]
async fn send_message_appends_confirmed_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            concat!(
                r#"{"message":{"role":"assistant","content":"It is about birds."}}"#,
                "\n"
            ),
            "application/x-ndjson",
        ))
        .mount(&server)
        .await;

    let client = OllamaClient::new(Some(server.uri()));
    let mut mgr = manager_with_session();
    let mut on_token = |_: &str| {};
    let reply = mgr
        .send_message(&client, "What is this paper about?", &mut on_token)
        .await
        .expect("send_message");

    assert_eq!(reply, "It is about birds.");
    let messages = &mgr.get_active_session().expect("active").messages;
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].role, "system");
    assert_eq!(messages[1].role, "user");
    assert_eq!(messages[2].role, "assistant");
    assert_eq!(messages[2].content, "It is about birds.");
}

#[tokio::test]
async fn send_message_rolls_back_user_message_on_http_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = OllamaClient::new(Some(server.uri()));
    let mut mgr = manager_with_session();
    let before = mgr.get_active_session().expect("active").messages.len();

    let mut on_token = |_: &str| {};
    let res = mgr.send_message(&client, "hello?", &mut on_token).await;
    assert!(matches!(res, Err(ChatError::Llm(OllamaError::Api(_)))));

    let after = mgr.get_active_session().expect("active").messages.len();
    assert_eq!(before, after);
}

#[tokio::test]
async fn send_message_rolls_back_on_error_record_mid_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            concat!(
                r#"{"message":{"role":"assistant","content":"par"}}"#,
                "\n",
                r#"{"error":"context length exceeded"}"#,
                "\n"
            ),
            "application/x-ndjson",
        ))
        .mount(&server)
        .await;

    let client = OllamaClient::new(Some(server.uri()));
    let mut mgr = manager_with_session();
    let before = mgr.get_active_session().expect("active").messages.len();

    let mut on_token = |_: &str| {};
    let res = mgr.send_message(&client, "summarize", &mut on_token).await;
    match res {
        Err(ChatError::Llm(OllamaError::Api(msg))) => {
            assert_eq!(msg, "context length exceeded")
        }
        other => panic!("expected Api error, got {:?}", other),
    }
    assert_eq!(mgr.get_active_session().expect("active").messages.len(), before);
}

#[tokio::test]
async fn send_message_without_active_session_errs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let client = OllamaClient::new(Some(server.uri()));
    let mut mgr = ChatSessionManager::new("llama3.2:1b", 24_000);
    let mut on_token = |_: &str| {};
    let res = mgr.send_message(&client, "anyone there?", &mut on_token).await;
    assert!(matches!(res, Err(ChatError::NoSession)));
}
