use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{deserialize_id, Participant};

/// A message within a conversation.
///
/// Push echoes may omit the sender or the timestamp, so both default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id", deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(rename = "chatId", deserialize_with = "deserialize_id")]
    pub conversation_id: String,
    #[serde(default)]
    pub sender: Participant,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        conversation_id: impl Into<String>,
        sender: Participant,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            conversation_id: conversation_id.into(),
            sender,
            text: text.into(),
            created_at: Some(Utc::now()),
        }
    }

    /// Whether `user_id` authored this message
    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender.id == user_id
    }
}

/// Body of the send-message request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    #[serde(rename = "chatId")]
    pub conversation_id: String,
    pub text: String,
}

/// Body of the create-or-fetch conversation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConversationRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_sparse_push_echo() {
        let message: Message =
            serde_json::from_str(r#"{"chatId":"C123","_id":"m1","text":"hi"}"#).unwrap();

        assert_eq!(message.id, "m1");
        assert_eq!(message.conversation_id, "C123");
        assert_eq!(message.text, "hi");
        assert_eq!(message.sender, Participant::default());
        assert!(message.created_at.is_none());
    }

    #[test]
    fn authorship_compares_sender_identifier() {
        let message = Message::new("m1", "c1", Participant::new("u1", "Ada"), "hello");
        assert!(message.is_from("u1"));
        assert!(!message.is_from("u2"));
    }
}
