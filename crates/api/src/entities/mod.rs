//! Domain entities exchanged with the message service.

pub mod conversation;
pub mod message;
pub mod participant;
pub mod user;

pub use conversation::Conversation;
pub use message::Message;
pub use participant::Participant;
pub use user::User;

use serde::{Deserialize, Deserializer};

/// Identifiers arrive as strings from the service but older payloads carry numbers.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum WireId {
    Text(String),
    Number(i64),
}

impl From<WireId> for String {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Text(text) => text,
            WireId::Number(number) => number.to_string(),
        }
    }
}

/// Deserialize a single identifier, accepting strings or integers.
pub fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    WireId::deserialize(deserializer).map(String::from)
}

/// Deserialize a list of identifiers, accepting strings or integers.
pub fn deserialize_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let ids = Vec::<WireId>::deserialize(deserializer)?;
    Ok(ids.into_iter().map(String::from).collect())
}
