//! Integration tests for the HTTP collaborator.

use std::sync::Arc;

use httpmock::prelude::*;
use murmur_api::{ChatApi, HttpChatApi, Session, SyncError, User};
use murmur_config::ServerConfig;
use serde_json::json;

fn api_for(server: &MockServer, session: Arc<Session>) -> HttpChatApi {
    let config = ServerConfig {
        api_url: server.url("/api"),
        socket_url: "ws://127.0.0.1:1".to_string(),
        request_timeout_seconds: 5,
    };
    HttpChatApi::new(&config, session).expect("client builds")
}

fn logged_in() -> Arc<Session> {
    Arc::new(Session::with_user(User::new("me", "Me", "secret")))
}

#[tokio::test]
async fn fetch_conversations_sends_bearer_and_decodes_list() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/chats")
                .header("authorization", "Bearer secret");
            then.status(200).json_body(json!([
                {
                    "_id": "c1",
                    "participants": [{"_id": "me", "name": "Me"}, {"_id": "u2", "name": "Bo"}],
                    "createdAt": "2024-05-01T10:00:00.000Z"
                }
            ]));
        })
        .await;

    let api = api_for(&server, logged_in());
    let conversations = api.fetch_conversations().await.expect("fetch succeeds");

    mock.assert_async().await;
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].title_for("me"), "Bo");
}

#[tokio::test]
async fn fetch_messages_targets_conversation_path() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/messages/c1");
            then.status(200).json_body(json!([
                {"_id": "m1", "chatId": "c1", "sender": {"_id": "u2", "name": "Bo"}, "text": "hey"},
                {"_id": "m2", "chatId": "c1", "sender": {"_id": "me", "name": "Me"}, "text": "hi"}
            ]));
        })
        .await;

    let api = api_for(&server, logged_in());
    let messages = api.fetch_messages("c1").await.expect("history loads");

    mock.assert_async().await;
    let texts: Vec<_> = messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["hey", "hi"]);
}

#[tokio::test]
async fn send_message_posts_chat_id_and_text() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/messages")
                .json_body(json!({"chatId": "c1", "text": "hello"}));
            then.status(201).json_body(json!({
                "_id": "m9",
                "chatId": "c1",
                "sender": {"_id": "me", "name": "Me"},
                "text": "hello",
                "createdAt": "2024-05-01T10:00:00.000Z"
            }));
        })
        .await;

    let api = api_for(&server, logged_in());
    let message = api.send_message("c1", "hello").await.expect("send succeeds");

    mock.assert_async().await;
    assert_eq!(message.id, "m9");
    assert!(message.is_from("me"));
}

#[tokio::test]
async fn send_failure_maps_to_send_error_with_service_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/messages");
            then.status(500).json_body(json!({"message": "database down"}));
        })
        .await;

    let api = api_for(&server, logged_in());
    let err = api.send_message("c1", "hello").await.unwrap_err();

    match err {
        SyncError::Send { message } => assert!(message.contains("database down")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unauthorized_response_maps_to_auth_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/chats");
            then.status(401).json_body(json!({"message": "Not authorized, token failed"}));
        })
        .await;

    let api = api_for(&server, logged_in());
    let err = api.fetch_conversations().await.unwrap_err();
    assert!(err.is_auth(), "expected auth error, got {err:?}");
}

#[tokio::test]
async fn missing_credential_fails_before_any_request() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/chats");
            then.status(200).json_body(json!([]));
        })
        .await;

    let api = api_for(&server, Arc::new(Session::new()));
    let err = api.fetch_conversations().await.unwrap_err();

    assert!(err.is_auth());
    mock.assert_hits_async(0).await;
}

#[tokio::test]
async fn search_users_passes_query_parameter() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/auth/users")
                .query_param("search", "bo");
            then.status(200)
                .json_body(json!([{"_id": "u2", "name": "Bo", "email": "bo@example.com"}]));
        })
        .await;

    let api = api_for(&server, logged_in());
    let users = api.search_users("bo").await.expect("search succeeds");

    mock.assert_async().await;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].name, "Bo");
}

#[tokio::test]
async fn access_conversation_posts_target_user() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/chats")
                .json_body(json!({"userId": "u2"}));
            then.status(200).json_body(json!({
                "_id": "c7",
                "participants": [{"_id": "me", "name": "Me"}, {"_id": "u2", "name": "Bo"}]
            }));
        })
        .await;

    let api = api_for(&server, logged_in());
    let conversation = api.access_conversation("u2").await.expect("conversation returned");

    mock.assert_async().await;
    assert_eq!(conversation.id, "c7");
}

#[tokio::test]
async fn malformed_history_body_is_a_fetch_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/messages/c1");
            then.status(200).body("not json");
        })
        .await;

    let api = api_for(&server, logged_in());
    let err = api.fetch_messages("c1").await.unwrap_err();
    assert!(matches!(err, SyncError::Fetch { .. }));
}
