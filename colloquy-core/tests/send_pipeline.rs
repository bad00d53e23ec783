//! End-to-end tests for the send pipeline
//!
//! Search and completion endpoints are wiremock servers; storage is an
//! in-memory SQLite database.

use std::sync::{Arc, Mutex};

use colloquy_core::chat::{ChatService, SendOutcome};
use colloquy_core::config::Config;
use colloquy_core::render::{EntryBody, SEARCH_NOTE};
use colloquy_core::store::ConversationStore;
use colloquy_core::types::{Role, DEFAULT_CHAT_TITLE};
use colloquy_core::Database;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const UID: &str = "user-1";

fn store() -> ConversationStore {
    colloquy_core::logging::init_test();
    let db = Database::open_in_memory().unwrap();
    db.migrate().unwrap();
    ConversationStore::new(Arc::new(db))
}

fn service(server: &MockServer, store: ConversationStore) -> ChatService {
    let mut config = Config::default();
    config.completion.endpoints = vec![format!("{}/v1/chat/completions", server.uri())];
    config.completion.api_key = Some("test-key".to_string());
    config.search.endpoint = format!("{}/search/", server.uri());
    config.image.endpoint = format!("{}/v1/images/generations", server.uri());
    config.ui.assistant_name = "Pri".to_string();
    ChatService::from_config(&config, store).unwrap()
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    }))
}

#[tokio::test]
async fn test_first_exchange_titles_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion("Hi there, how can I help?"))
        .mount(&server)
        .await;

    let store = store();
    let chat = service(&server, store.clone());
    let mut ctx = chat.context(UID);
    ctx.web_search_enabled = false;

    let outcome = chat.send_message(&mut ctx, "Hello").await.unwrap();
    assert_eq!(
        outcome,
        SendOutcome::Replied {
            content: "Hi there, how can I help?".to_string(),
            used_search: false
        }
    );

    let chat_id = ctx.current_chat_id.clone().unwrap();
    let stored = store.load_chat(UID, &chat_id).unwrap();
    assert_eq!(stored.title, "Hello");
    assert!(stored.updated_at >= stored.created_at);
    let turns: Vec<_> = stored
        .messages
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        turns,
        [
            (Role::User, "Hello"),
            (Role::Assistant, "Hi there, how can I help?")
        ]
    );
    assert_eq!(ctx.title, "Hello");
    assert!(!ctx.is_generating);
    assert_eq!(ctx.transcript.len(), 2);
}

#[tokio::test]
async fn test_user_message_stored_before_request() {
    let server = MockServer::start().await;
    let store = store();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let responder = {
        let store = store.clone();
        let seen = Arc::clone(&seen);
        move |_: &Request| {
            let chats = store.list_chats(UID).unwrap();
            let stored: Vec<_> = chats
                .iter()
                .flat_map(|c| c.messages.iter().map(|m| (m.role, m.content.clone())))
                .collect();
            seen.lock().unwrap().push(stored);
            completion("ack")
        }
    };
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(responder)
        .mount(&server)
        .await;

    let chat = service(&server, store.clone());
    let mut ctx = chat.context(UID);
    ctx.web_search_enabled = false;

    chat.send_message(&mut ctx, "first").await.unwrap();
    chat.send_message(&mut ctx, "second").await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], vec![(Role::User, "first".to_string())]);
    assert_eq!(seen[1].len(), 3);
    assert_eq!(seen[1][2], (Role::User, "second".to_string()));
}

#[tokio::test]
async fn test_search_augments_prompt() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search/"))
        .and(query_param("q", "What's the weather today?"))
        .and(query_param("format", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Heading": "Weather",
            "Abstract": "Sunny",
            "AbstractText": "Sunny with light wind",
            "RelatedTopics": [],
            "Results": []
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Web Search Results: **Weather**: Sunny with light wind"))
        .respond_with(completion("It is sunny."))
        .expect(1)
        .mount(&server)
        .await;

    let chat = service(&server, store());
    let mut ctx = chat.context(UID);
    ctx.web_search_enabled = true;

    let outcome = chat
        .send_message(&mut ctx, "What's the weather today?")
        .await
        .unwrap();
    assert_eq!(
        outcome,
        SendOutcome::Replied {
            content: "It is sunny.".to_string(),
            used_search: true
        }
    );
    let last = ctx.transcript.entries().last().unwrap();
    assert_eq!(last.note.as_deref(), Some(SEARCH_NOTE));
}

#[tokio::test]
async fn test_search_failure_is_not_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("\"content\":\"latest news\""))
        .respond_with(completion("plain answer"))
        .expect(1)
        .mount(&server)
        .await;

    let chat = service(&server, store());
    let mut ctx = chat.context(UID);
    ctx.web_search_enabled = true;

    let outcome = chat.send_message(&mut ctx, "latest news").await.unwrap();
    assert_eq!(
        outcome,
        SendOutcome::Replied {
            content: "plain answer".to_string(),
            used_search: false
        }
    );
}

#[tokio::test]
async fn test_failed_reply_keeps_user_turn_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .mount(&server)
        .await;

    let store = store();
    let chat = service(&server, store.clone());
    let mut ctx = chat.context(UID);
    ctx.web_search_enabled = false;

    let outcome = chat.send_message(&mut ctx, "Hello").await.unwrap();
    assert!(matches!(outcome, SendOutcome::Failed(_)));
    assert!(!ctx.is_generating);

    let stored = store
        .load_chat(UID, ctx.current_chat_id.as_deref().unwrap())
        .unwrap();
    assert_eq!(stored.messages.len(), 1);
    assert_eq!(stored.title, DEFAULT_CHAT_TITLE);

    let shown = ctx.transcript.entries().last().unwrap();
    match &shown.body {
        EntryBody::Text(lines) => {
            let text = format!("{:?}", lines);
            assert!(text.contains("authentication issue"), "{}", text);
        }
        other => panic!("expected text entry, got {:?}", other),
    }
}

#[tokio::test]
async fn test_first_successful_reply_titles_after_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion("Back online"))
        .mount(&server)
        .await;

    let store = store();
    let chat = service(&server, store.clone());
    let mut ctx = chat.context(UID);
    ctx.web_search_enabled = false;

    let first = chat.send_message(&mut ctx, "Hello").await.unwrap();
    assert!(matches!(first, SendOutcome::Failed(_)));
    let second = chat.send_message(&mut ctx, "Hello again").await.unwrap();
    assert!(matches!(second, SendOutcome::Replied { .. }));

    let stored = store
        .load_chat(UID, ctx.current_chat_id.as_deref().unwrap())
        .unwrap();
    let roles: Vec<_> = stored.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, [Role::User, Role::User, Role::Assistant]);
    assert_eq!(stored.title, "Hello");
    assert_eq!(ctx.title, "Hello");
}

#[tokio::test]
async fn test_image_model_generates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"url": "https://img.example/cat.png"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let chat = service(&server, store());
    let mut ctx = chat.context(UID);
    chat.select_model(&mut ctx, "provider-4/qwen-image");

    let outcome = chat.send_message(&mut ctx, "a cat in a hat").await.unwrap();
    match outcome {
        SendOutcome::Replied { content, .. } => {
            assert!(content.contains("https://img.example/cat.png"))
        }
        other => panic!("expected reply, got {:?}", other),
    }
    assert!(ctx.transcript.entries().iter().any(|e| matches!(
        &e.body,
        EntryBody::Image { source } if source == "https://img.example/cat.png"
    )));
}
