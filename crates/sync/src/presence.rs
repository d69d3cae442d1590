//! Online-user tracking.

use std::collections::HashSet;

use tracing::debug;

/// Set of user identifiers the service reports as online.
///
/// Every `onlineUsers` push replaces the whole set; the service is the only
/// source of truth, so nothing is merged or aged out locally.
#[derive(Debug, Default, Clone)]
pub struct PresenceTracker {
    online: HashSet<String>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace<I>(&mut self, user_ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.online = user_ids.into_iter().collect();
        debug!(online = self.online.len(), "presence replaced");
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online.contains(user_id)
    }

    /// Online identifiers in a stable order
    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.online.iter().cloned().collect();
        users.sort();
        users
    }

    pub fn len(&self) -> usize {
        self.online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }
}
