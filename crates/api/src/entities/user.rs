use std::fmt;

use super::Participant;

/// The authenticated user of this client.
///
/// The token is issued and refreshed by the auth collaborator; this crate
/// only reads it.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub token: String,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            token: token.into(),
        }
    }

    pub fn as_participant(&self) -> Participant {
        Participant::new(self.id.clone(), self.name.clone())
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("token", &"<redacted>")
            .finish()
    }
}
