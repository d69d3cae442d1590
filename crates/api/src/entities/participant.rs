use serde::{Deserialize, Serialize};

use super::WireId;

/// A conversation member as referenced by conversations and messages.
///
/// The service sometimes sends a populated `{ "_id", "name" }` object and
/// sometimes only the bare identifier; both forms are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "ParticipantRepr")]
pub struct Participant {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ParticipantRepr {
    Populated {
        #[serde(rename = "_id")]
        id: WireId,
        #[serde(default)]
        name: String,
    },
    Reference(WireId),
}

impl From<ParticipantRepr> for Participant {
    fn from(repr: ParticipantRepr) -> Self {
        match repr {
            ParticipantRepr::Populated { id, name } => Self {
                id: id.into(),
                name,
            },
            ParticipantRepr::Reference(id) => Self {
                id: id.into(),
                name: String::new(),
            },
        }
    }
}
