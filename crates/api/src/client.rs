//! Request/response collaborator for the message service.

use std::sync::Arc;

use async_trait::async_trait;
use murmur_config::ServerConfig;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entities::message::{AccessConversationRequest, SendMessageRequest};
use crate::entities::{Conversation, Message, Participant};
use crate::session::Session;
use crate::types::{SyncError, SyncResult};

/// Operations the synchronizer consumes from the message service.
///
/// Every call carries the session's bearer credential; a missing or expired
/// credential yields [`SyncError::Auth`].
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Conversations visible to the authenticated user
    async fn fetch_conversations(&self) -> SyncResult<Vec<Conversation>>;

    /// Full message history of a conversation
    async fn fetch_messages(&self, conversation_id: &str) -> SyncResult<Vec<Message>>;

    /// Submit a message; returns the stored message
    async fn send_message(&self, conversation_id: &str, text: &str) -> SyncResult<Message>;

    /// Users whose name matches `query`
    async fn search_users(&self, query: &str) -> SyncResult<Vec<Participant>>;

    /// Create, or fetch the existing, conversation with `user_id`
    async fn access_conversation(&self, user_id: &str) -> SyncResult<Conversation>;
}

#[derive(Debug, Clone, Copy)]
enum CallKind {
    Read,
    Write,
}

impl CallKind {
    fn error(self, message: impl Into<String>) -> SyncError {
        match self {
            CallKind::Read => SyncError::fetch(message),
            CallKind::Write => SyncError::send(message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// [`ChatApi`] over HTTP with JSON bodies
#[derive(Clone)]
pub struct HttpChatApi {
    client: Client,
    base_url: Url,
    session: Arc<Session>,
}

impl HttpChatApi {
    pub fn new(config: &ServerConfig, session: Arc<Session>) -> SyncResult<Self> {
        let base_url = Url::parse(&config.api_url).map_err(|err| {
            SyncError::validation(format!("invalid api url {}: {}", config.api_url, err))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::validation(format!(
                "api url {} cannot be used as a base",
                config.api_url
            )));
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| SyncError::transport(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            base_url,
            session,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn execute<B, T>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
        kind: CallKind,
    ) -> SyncResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let token = self.session.bearer_token()?;

        debug!(%method, url = %url, "calling message service");
        let mut request = self.client.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|err| {
            warn!(error = %err, "message service unreachable");
            kind.error(err.to_string())
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let detail = response.text().await.unwrap_or_default();
            warn!(%status, "message service rejected credential");
            return Err(SyncError::auth(describe_failure(status, &detail)));
        }

        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(%status, "message service call failed");
            return Err(kind.error(describe_failure(status, &detail)));
        }

        response
            .json::<T>()
            .await
            .map_err(|err| kind.error(format!("invalid response body: {err}")))
    }
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => format!("{status}: {}", parsed.message),
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => format!("{status}: {}", body.trim()),
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_conversations(&self) -> SyncResult<Vec<Conversation>> {
        let url = self.endpoint(&["chats"]);
        self.execute::<(), _>(Method::GET, url, None, CallKind::Read)
            .await
    }

    async fn fetch_messages(&self, conversation_id: &str) -> SyncResult<Vec<Message>> {
        let url = self.endpoint(&["messages", conversation_id]);
        self.execute::<(), _>(Method::GET, url, None, CallKind::Read)
            .await
    }

    async fn send_message(&self, conversation_id: &str, text: &str) -> SyncResult<Message> {
        let url = self.endpoint(&["messages"]);
        let body = SendMessageRequest {
            conversation_id: conversation_id.to_string(),
            text: text.to_string(),
        };
        self.execute(Method::POST, url, Some(&body), CallKind::Write)
            .await
    }

    async fn search_users(&self, query: &str) -> SyncResult<Vec<Participant>> {
        let mut url = self.endpoint(&["auth", "users"]);
        url.query_pairs_mut().append_pair("search", query);
        self.execute::<(), _>(Method::GET, url, None, CallKind::Read)
            .await
    }

    async fn access_conversation(&self, user_id: &str) -> SyncResult<Conversation> {
        let url = self.endpoint(&["chats"]);
        let body = AccessConversationRequest {
            user_id: user_id.to_string(),
        };
        self.execute(Method::POST, url, Some(&body), CallKind::Write)
            .await
    }
}
