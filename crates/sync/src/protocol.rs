//! Wire protocol of the duplex channel.
//!
//! The service speaks Socket.IO (v5) on top of Engine.IO (v4) over a
//! WebSocket. Only the subset a client needs is implemented: the engine
//! handshake, heartbeats, namespace connect/disconnect and named events.

use murmur_api::entities::{deserialize_id, deserialize_ids};
use murmur_api::{Message, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_NAMESPACE: &str = "/";

/// Event names shared with the service
pub mod event_names {
    pub const JOIN_USER: &str = "joinUser";
    pub const JOIN_CHAT: &str = "joinChat";
    pub const ONLINE_USERS: &str = "onlineUsers";
    pub const SEND_MESSAGE: &str = "sendMessage";
    pub const RECEIVE_MESSAGE: &str = "receiveMessage";
    pub const TYPING: &str = "typing";
    pub const STOP_TYPING: &str = "stopTyping";
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,
    #[error("unknown engine packet type {0:?}")]
    UnknownEnginePacket(char),
    #[error("unknown socket packet type {0:?}")]
    UnknownSocketPacket(char),
    #[error("malformed packet: {0}")]
    Malformed(String),
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::transport(err.to_string())
    }
}

/// Engine handshake sent by the server right after the socket opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Noop,
    Connect {
        namespace: String,
        sid: Option<String>,
    },
    Disconnect {
        namespace: String,
    },
    ConnectError {
        namespace: String,
        message: String,
    },
    Event {
        namespace: String,
        ack: Option<u64>,
        name: String,
        payload: Value,
    },
    /// Socket packets a client does not act on (acks, binary frames)
    Ignored,
}

impl Packet {
    pub fn event(name: impl Into<String>, payload: Value) -> Self {
        Packet::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            ack: None,
            name: name.into(),
            payload,
        }
    }

    pub fn connect() -> Self {
        Packet::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            sid: None,
        }
    }

    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let mut chars = frame.chars();
        let engine_type = chars.next().ok_or(ProtocolError::Empty)?;
        let rest = chars.as_str();

        match engine_type {
            '0' => serde_json::from_str(rest)
                .map(Packet::Open)
                .map_err(|err| ProtocolError::Malformed(format!("handshake: {err}"))),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping(rest.to_string())),
            '3' => Ok(Packet::Pong(rest.to_string())),
            '4' => decode_socket_packet(rest),
            '6' => Ok(Packet::Noop),
            other => Err(ProtocolError::UnknownEnginePacket(other)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Packet::Open(handshake) => format!(
                "0{}",
                serde_json::to_string(handshake).unwrap_or_else(|_| "{}".to_string())
            ),
            Packet::Close => "1".to_string(),
            Packet::Ping(data) => format!("2{data}"),
            Packet::Pong(data) => format!("3{data}"),
            Packet::Noop => "6".to_string(),
            Packet::Connect { namespace, sid } => {
                let body = sid
                    .as_ref()
                    .map(|sid| serde_json::json!({ "sid": sid }).to_string())
                    .unwrap_or_default();
                format!("40{}{}", namespace_prefix(namespace, !body.is_empty()), body)
            }
            Packet::Disconnect { namespace } => {
                format!("41{}", namespace_prefix(namespace, false))
            }
            Packet::ConnectError { namespace, message } => format!(
                "44{}{}",
                namespace_prefix(namespace, true),
                serde_json::json!({ "message": message })
            ),
            Packet::Event {
                namespace,
                ack,
                name,
                payload,
            } => {
                let ack = ack.map(|id| id.to_string()).unwrap_or_default();
                let body = Value::Array(vec![Value::String(name.clone()), payload.clone()]);
                format!("42{}{}{}", namespace_prefix(namespace, true), ack, body)
            }
            Packet::Ignored => "6".to_string(),
        }
    }
}

fn namespace_prefix(namespace: &str, followed_by_data: bool) -> String {
    if namespace == DEFAULT_NAMESPACE || namespace.is_empty() {
        String::new()
    } else if followed_by_data {
        format!("{namespace},")
    } else {
        namespace.to_string()
    }
}

fn decode_socket_packet(body: &str) -> Result<Packet, ProtocolError> {
    let mut chars = body.chars();
    let socket_type = chars
        .next()
        .ok_or_else(|| ProtocolError::Malformed("missing socket packet type".to_string()))?;
    let mut rest = chars.as_str();

    let namespace = if rest.starts_with('/') {
        match rest.find(',') {
            Some(index) => {
                let namespace = rest[..index].to_string();
                rest = &rest[index + 1..];
                namespace
            }
            None => {
                let namespace = rest.to_string();
                rest = "";
                namespace
            }
        }
    } else {
        DEFAULT_NAMESPACE.to_string()
    };

    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    let ack = if digits > 0 {
        rest[..digits].parse::<u64>().ok()
    } else {
        None
    };
    rest = &rest[digits..];

    match socket_type {
        '0' => {
            let sid = if rest.is_empty() {
                None
            } else {
                serde_json::from_str::<Value>(rest)
                    .ok()
                    .and_then(|value| value.get("sid").and_then(Value::as_str).map(str::to_string))
            };
            Ok(Packet::Connect { namespace, sid })
        }
        '1' => Ok(Packet::Disconnect { namespace }),
        '2' => {
            let values: Vec<Value> = serde_json::from_str(rest)
                .map_err(|err| ProtocolError::Malformed(format!("event body: {err}")))?;
            let mut values = values.into_iter();
            let name = match values.next() {
                Some(Value::String(name)) => name,
                _ => return Err(ProtocolError::Malformed("event without a name".to_string())),
            };
            let payload = values.next().unwrap_or(Value::Null);
            Ok(Packet::Event {
                namespace,
                ack,
                name,
                payload,
            })
        }
        '4' => {
            let message = serde_json::from_str::<Value>(rest)
                .ok()
                .and_then(|value| match value {
                    Value::String(text) => Some(text),
                    other => other
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
                .unwrap_or_else(|| rest.to_string());
            Ok(Packet::ConnectError { namespace, message })
        }
        '3' | '5' | '6' => Ok(Packet::Ignored),
        other => Err(ProtocolError::UnknownSocketPacket(other)),
    }
}

/// Payload of the start-typing signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingSignal {
    #[serde(rename = "chatId", deserialize_with = "deserialize_id")]
    pub conversation_id: String,
    #[serde(rename = "userId", deserialize_with = "deserialize_id")]
    pub user_id: String,
    #[serde(rename = "userName", default)]
    pub user_name: String,
}

/// Payload of the stop-typing signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopTypingSignal {
    #[serde(rename = "chatId", deserialize_with = "deserialize_id")]
    pub conversation_id: String,
    #[serde(rename = "userId", deserialize_with = "deserialize_id")]
    pub user_id: String,
}

/// Push event kinds a listener can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    OnlineUsers,
    ReceiveMessage,
    Typing,
    StopTyping,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::OnlineUsers => event_names::ONLINE_USERS,
            EventKind::ReceiveMessage => event_names::RECEIVE_MESSAGE,
            EventKind::Typing => event_names::TYPING,
            EventKind::StopTyping => event_names::STOP_TYPING,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            event_names::ONLINE_USERS => Some(EventKind::OnlineUsers),
            event_names::RECEIVE_MESSAGE => Some(EventKind::ReceiveMessage),
            event_names::TYPING => Some(EventKind::Typing),
            event_names::STOP_TYPING => Some(EventKind::StopTyping),
            _ => None,
        }
    }
}

/// Events pushed by the service
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    OnlineUsers(Vec<String>),
    ReceiveMessage(Message),
    Typing(TypingSignal),
    StopTyping(StopTypingSignal),
}

impl ServerEvent {
    /// Decode a named event; `Ok(None)` for events this client does not consume
    pub fn decode(name: &str, payload: Value) -> Result<Option<Self>, SyncError> {
        let Some(kind) = EventKind::from_name(name) else {
            return Ok(None);
        };

        let event = match kind {
            EventKind::OnlineUsers => ServerEvent::OnlineUsers(deserialize_ids(payload)?),
            EventKind::ReceiveMessage => ServerEvent::ReceiveMessage(serde_json::from_value(payload)?),
            EventKind::Typing => ServerEvent::Typing(serde_json::from_value(payload)?),
            EventKind::StopTyping => ServerEvent::StopTyping(serde_json::from_value(payload)?),
        };
        Ok(Some(event))
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::OnlineUsers(_) => EventKind::OnlineUsers,
            ServerEvent::ReceiveMessage(_) => EventKind::ReceiveMessage,
            ServerEvent::Typing(_) => EventKind::Typing,
            ServerEvent::StopTyping(_) => EventKind::StopTyping,
        }
    }

    /// Conversation the event belongs to, `None` for session-wide events
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            ServerEvent::OnlineUsers(_) => None,
            ServerEvent::ReceiveMessage(message) => Some(&message.conversation_id),
            ServerEvent::Typing(signal) => Some(&signal.conversation_id),
            ServerEvent::StopTyping(signal) => Some(&signal.conversation_id),
        }
    }
}

/// Events emitted by this client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    JoinUser(String),
    JoinChat(String),
    SendMessage(Message),
    Typing(TypingSignal),
    StopTyping(StopTypingSignal),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinUser(_) => event_names::JOIN_USER,
            ClientEvent::JoinChat(_) => event_names::JOIN_CHAT,
            ClientEvent::SendMessage(_) => event_names::SEND_MESSAGE,
            ClientEvent::Typing(_) => event_names::TYPING,
            ClientEvent::StopTyping(_) => event_names::STOP_TYPING,
        }
    }

    pub fn payload(&self) -> Result<Value, SyncError> {
        let value = match self {
            ClientEvent::JoinUser(user_id) => Value::String(user_id.clone()),
            ClientEvent::JoinChat(conversation_id) => Value::String(conversation_id.clone()),
            ClientEvent::SendMessage(message) => serde_json::to_value(message)?,
            ClientEvent::Typing(signal) => serde_json::to_value(signal)?,
            ClientEvent::StopTyping(signal) => serde_json::to_value(signal)?,
        };
        Ok(value)
    }

    pub fn to_frame(&self) -> Result<String, SyncError> {
        Ok(Packet::event(self.name(), self.payload()?).encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_api::Participant;
    use serde_json::json;

    #[test]
    fn decodes_engine_handshake() {
        let packet = Packet::decode(
            r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();

        match packet {
            Packet::Open(handshake) => {
                assert_eq!(handshake.sid, "abc");
                assert_eq!(handshake.ping_interval, 25_000);
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn heartbeat_packets_round_trip_their_data() {
        assert_eq!(Packet::decode("2").unwrap(), Packet::Ping(String::new()));
        assert_eq!(Packet::Pong(String::new()).encode(), "3");
        assert_eq!(Packet::decode("2probe").unwrap(), Packet::Ping("probe".to_string()));
    }

    #[test]
    fn decodes_namespace_connect_with_sid() {
        let packet = Packet::decode(r#"40{"sid":"xyz"}"#).unwrap();
        assert_eq!(
            packet,
            Packet::Connect {
                namespace: "/".to_string(),
                sid: Some("xyz".to_string())
            }
        );
        assert_eq!(Packet::connect().encode(), "40");
    }

    #[test]
    fn decodes_event_with_namespace_and_ack() {
        let packet = Packet::decode(r#"42/admin,17["typing",{"chatId":"c1"}]"#).unwrap();
        assert_eq!(
            packet,
            Packet::Event {
                namespace: "/admin".to_string(),
                ack: Some(17),
                name: "typing".to_string(),
                payload: json!({"chatId": "c1"}),
            }
        );
    }

    #[test]
    fn event_without_payload_decodes_to_null() {
        match Packet::decode(r#"42["ping"]"#).unwrap() {
            Packet::Event { payload, .. } => assert_eq!(payload, Value::Null),
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(Packet::decode(""), Err(ProtocolError::Empty));
        assert_eq!(Packet::decode("9"), Err(ProtocolError::UnknownEnginePacket('9')));
        assert!(matches!(
            Packet::decode("42{not-an-array}"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn connect_error_extracts_message() {
        let packet = Packet::decode(r#"44{"message":"Not authorized"}"#).unwrap();
        assert_eq!(
            packet,
            Packet::ConnectError {
                namespace: "/".to_string(),
                message: "Not authorized".to_string()
            }
        );
    }

    #[test]
    fn client_events_encode_with_service_field_names() {
        let typing = ClientEvent::Typing(TypingSignal {
            conversation_id: "c1".to_string(),
            user_id: "u1".to_string(),
            user_name: "Ada".to_string(),
        });
        assert_eq!(
            typing.to_frame().unwrap(),
            r#"42["typing",{"chatId":"c1","userId":"u1","userName":"Ada"}]"#
        );

        let join = ClientEvent::JoinChat("c1".to_string());
        assert_eq!(join.to_frame().unwrap(), r#"42["joinChat","c1"]"#);
    }

    #[test]
    fn send_message_payload_carries_chat_id_and_message_fields() {
        let mut message = Message::new("m1", "c1", Participant::new("u1", "Ada"), "hi");
        message.created_at = None;

        let payload = ClientEvent::SendMessage(message).payload().unwrap();
        assert_eq!(
            payload,
            json!({"_id": "m1", "chatId": "c1", "sender": {"_id": "u1", "name": "Ada"}, "text": "hi"})
        );
    }

    #[test]
    fn server_events_decode_typed_payloads() {
        let online = ServerEvent::decode("onlineUsers", json!(["u1", 2])).unwrap();
        assert_eq!(
            online,
            Some(ServerEvent::OnlineUsers(vec!["u1".to_string(), "2".to_string()]))
        );

        let stop = ServerEvent::decode("stopTyping", json!({"chatId": "c1", "userId": "u2"}))
            .unwrap()
            .unwrap();
        assert_eq!(stop.kind(), EventKind::StopTyping);
        assert_eq!(stop.conversation_id(), Some("c1"));

        assert_eq!(ServerEvent::decode("somethingElse", json!({})).unwrap(), None);
        assert!(ServerEvent::decode("typing", json!("oops")).is_err());
    }
}
