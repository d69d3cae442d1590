use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{deserialize_id, Participant};

/// Title shown for a conversation without a counterpart.
pub const UNKNOWN_COUNTERPART: &str = "Unknown";

/// A conversation between the session user and at least one other user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(rename = "_id", deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, participants: Vec<Participant>) -> Self {
        Self {
            id: id.into(),
            participants,
            created_at: Some(Utc::now()),
        }
    }

    /// The first participant that is not `user_id`
    pub fn counterpart(&self, user_id: &str) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|participant| participant.id != user_id)
    }

    /// Display title for `user_id`'s view of this conversation
    pub fn title_for(&self, user_id: &str) -> &str {
        self.counterpart(user_id)
            .map(|participant| participant.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_COUNTERPART)
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants
            .iter()
            .any(|participant| participant.id == user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_service_payload() {
        let conversation: Conversation = serde_json::from_str(
            r#"{
                "_id": "c1",
                "participants": [{"_id":"u1","name":"Ada"},{"_id":"u2","name":"Bo"}],
                "createdAt": "2024-05-01T10:00:00.000Z",
                "__v": 0
            }"#,
        )
        .unwrap();

        assert_eq!(conversation.id, "c1");
        assert_eq!(conversation.participants.len(), 2);
        assert!(conversation.created_at.is_some());
    }

    #[test]
    fn counterpart_skips_session_user() {
        let conversation = Conversation::new(
            "c1",
            vec![Participant::new("me", "Me"), Participant::new("u2", "Bo")],
        );

        assert_eq!(conversation.counterpart("me").map(|p| p.id.as_str()), Some("u2"));
        assert_eq!(conversation.title_for("me"), "Bo");
        assert!(conversation.has_participant("me"));
    }

    #[test]
    fn title_falls_back_when_alone() {
        let conversation = Conversation::new("c1", vec![Participant::new("me", "Me")]);
        assert_eq!(conversation.title_for("me"), UNKNOWN_COUNTERPART);
    }
}
