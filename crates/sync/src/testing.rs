//! In-memory collaborators for driving a synchronizer without a network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use murmur_api::{ChatApi, Conversation, Message, Participant, SyncError, SyncResult};
use serde_json::Value;
use tokio::sync::{mpsc, Notify};

use crate::connection::{Connector, Duplex};
use crate::protocol::Packet;

/// [`Connector`] whose channels end in a [`MemoryServer`]
#[derive(Debug)]
pub struct MemoryConnector {
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

impl MemoryConnector {
    pub fn pair() -> (Arc<Self>, MemoryServer) {
        let (accepted, incoming) = mpsc::unbounded_channel();
        (Arc::new(Self { accepted }), MemoryServer { incoming })
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self) -> SyncResult<Duplex> {
        let (to_client, client_incoming) = mpsc::unbounded_channel();
        let (client_outgoing, from_client) = mpsc::unbounded_channel();
        self.accepted
            .send(ServerEnd {
                to_client,
                from_client,
            })
            .map_err(|_| SyncError::transport("memory server is gone"))?;
        Ok(Duplex {
            outgoing: client_outgoing,
            incoming: client_incoming,
        })
    }
}

#[derive(Debug)]
pub struct MemoryServer {
    incoming: mpsc::UnboundedReceiver<ServerEnd>,
}

impl MemoryServer {
    /// Wait for the next channel a client opens
    pub async fn accept(&mut self) -> Option<ServerEnd> {
        self.incoming.recv().await
    }
}

/// Service side of one open channel
#[derive(Debug)]
pub struct ServerEnd {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    pub fn send_frame(&self, frame: impl Into<String>) {
        let _ = self.to_client.send(frame.into());
    }

    pub async fn next_frame(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Frame already sent by the client, if any
    pub fn try_next_frame(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Run the engine and namespace handshake
    pub async fn handshake(&mut self) {
        self.send_frame(
            r#"0{"sid":"memory","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#,
        );
        let connect = self.next_frame().await;
        assert_eq!(connect.as_deref(), Some("40"), "client must request the namespace");
        self.send_frame(r#"40{"sid":"memory-socket"}"#);
    }

    /// Next event the client emitted, skipping heartbeats
    pub async fn expect_event(&mut self) -> (String, Value) {
        loop {
            let frame = self
                .next_frame()
                .await
                .expect("client closed the channel while an event was expected");
            match Packet::decode(&frame) {
                Ok(Packet::Event { name, payload, .. }) => return (name, payload),
                Ok(Packet::Pong(_)) => continue,
                other => panic!("expected an event frame, got {other:?} from {frame}"),
            }
        }
    }

    pub fn push(&self, name: &str, payload: Value) {
        self.send_frame(Packet::event(name, payload).encode());
    }

    pub fn ping(&self) {
        self.send_frame(Packet::Ping(String::new()).encode());
    }

    pub fn close(&self) {
        self.send_frame(Packet::Close.encode());
    }
}

#[derive(Debug, Default)]
struct Script {
    conversations: Vec<Conversation>,
    histories: HashMap<String, Vec<Message>>,
    users: Vec<Participant>,
    gates: HashMap<String, Arc<Notify>>,
    send_failure: Option<SyncError>,
    history_failures: HashMap<String, SyncError>,
    sent: Vec<(String, String)>,
    sender: Participant,
    next_id: u64,
}

/// [`ChatApi`] answering from canned data
#[derive(Debug, Default)]
pub struct ScriptedApi {
    script: Mutex<Script>,
}

impl ScriptedApi {
    pub fn new(sender: Participant) -> Self {
        let api = Self::default();
        api.lock().sender = sender;
        api
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_conversations(self, conversations: Vec<Conversation>) -> Self {
        self.lock().conversations = conversations;
        self
    }

    pub fn with_history(self, conversation_id: &str, messages: Vec<Message>) -> Self {
        self.lock()
            .histories
            .insert(conversation_id.to_string(), messages);
        self
    }

    pub fn with_users(self, users: Vec<Participant>) -> Self {
        self.lock().users = users;
        self
    }

    /// Hold history fetches for `conversation_id` until the gate is notified
    pub fn gate_history(&self, conversation_id: &str) -> Arc<Notify> {
        self.lock()
            .gates
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }

    /// Answer history fetches for `conversation_id` with `error`
    pub fn fail_history(&self, conversation_id: &str, error: SyncError) {
        self.lock()
            .history_failures
            .insert(conversation_id.to_string(), error);
    }

    pub fn fail_sends(&self, error: SyncError) {
        self.lock().send_failure = Some(error);
    }

    /// `(conversation_id, text)` of every accepted send
    pub fn sent(&self) -> Vec<(String, String)> {
        self.lock().sent.clone()
    }
}

#[async_trait]
impl ChatApi for ScriptedApi {
    async fn fetch_conversations(&self) -> SyncResult<Vec<Conversation>> {
        Ok(self.lock().conversations.clone())
    }

    async fn fetch_messages(&self, conversation_id: &str) -> SyncResult<Vec<Message>> {
        let gate = self.lock().gates.get(conversation_id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let script = self.lock();
        if let Some(error) = script.history_failures.get(conversation_id) {
            return Err(error.clone());
        }
        Ok(script
            .histories
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(&self, conversation_id: &str, text: &str) -> SyncResult<Message> {
        let mut script = self.lock();
        if let Some(error) = script.send_failure.clone() {
            return Err(error);
        }
        script.next_id += 1;
        script
            .sent
            .push((conversation_id.to_string(), text.to_string()));
        Ok(Message::new(
            format!("sent-{}", script.next_id),
            conversation_id,
            script.sender.clone(),
            text,
        ))
    }

    async fn search_users(&self, query: &str) -> SyncResult<Vec<Participant>> {
        let query = query.to_lowercase();
        Ok(self
            .lock()
            .users
            .iter()
            .filter(|user| user.name.to_lowercase().contains(&query))
            .cloned()
            .collect())
    }

    async fn access_conversation(&self, user_id: &str) -> SyncResult<Conversation> {
        let mut script = self.lock();
        let existing = script
            .conversations
            .iter()
            .find(|conversation| conversation.has_participant(user_id))
            .cloned();
        if let Some(conversation) = existing {
            return Ok(conversation);
        }

        let peer = script
            .users
            .iter()
            .find(|user| user.id == user_id)
            .cloned()
            .ok_or_else(|| SyncError::fetch(format!("user {user_id} not found")))?;
        script.next_id += 1;
        let conversation = Conversation::new(
            format!("chat-{}", script.next_id),
            vec![script.sender.clone(), peer],
        );
        script.conversations.push(conversation.clone());
        Ok(conversation)
    }
}
