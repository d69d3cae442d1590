//! Ordered set of the user's conversations.

use std::collections::HashSet;

use murmur_api::{Conversation, SyncError, SyncResult};
use tracing::debug;

#[derive(Debug, Default, Clone)]
pub struct ConversationDirectory {
    conversations: Vec<Conversation>,
    active: Option<String>,
}

impl ConversationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conversations, newest-started first
    pub fn list(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| conversation.id == conversation_id)
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.get(conversation_id).is_some()
    }

    /// Insert at the front unless the identifier is already known.
    ///
    /// Known conversations keep their position; activity does not reorder
    /// the directory. Returns whether an insert happened.
    pub fn upsert(&mut self, conversation: Conversation) -> bool {
        if self.contains(&conversation.id) {
            return false;
        }
        debug!(conversation_id = %conversation.id, "conversation added to directory");
        self.conversations.insert(0, conversation);
        true
    }

    /// Replace the directory with a bulk fetch result.
    ///
    /// The first occurrence of a duplicated identifier wins. The active
    /// conversation is kept at the front when the fetch no longer lists it.
    pub fn replace_all(&mut self, conversations: Vec<Conversation>) {
        let mut seen = HashSet::new();
        let mut fresh: Vec<Conversation> = conversations
            .into_iter()
            .filter(|conversation| seen.insert(conversation.id.clone()))
            .collect();

        if let Some(active) = self.active.as_deref() {
            if !seen.contains(active) {
                if let Some(current) = self.get(active).cloned() {
                    fresh.insert(0, current);
                }
            }
        }

        self.conversations = fresh;
    }

    pub fn select(&mut self, conversation_id: &str) -> SyncResult<&Conversation> {
        let index = self
            .conversations
            .iter()
            .position(|conversation| conversation.id == conversation_id)
            .ok_or_else(|| {
                SyncError::fetch(format!("conversation {conversation_id} is not in the directory"))
            })?;
        self.active = Some(conversation_id.to_string());
        Ok(&self.conversations[index])
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active.as_deref().and_then(|id| self.get(id))
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn clear_selection(&mut self) {
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_api::Participant;

    fn conversation(id: &str) -> Conversation {
        Conversation::new(
            id,
            vec![Participant::new("me", "Me"), Participant::new(format!("{id}-peer"), "Peer")],
        )
    }

    fn ids(directory: &ConversationDirectory) -> Vec<&str> {
        directory.list().iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn upsert_into_empty_directory_is_idempotent() {
        let mut directory = ConversationDirectory::new();
        assert!(directory.upsert(conversation("D1")));
        assert_eq!(ids(&directory), vec!["D1"]);

        assert!(!directory.upsert(conversation("D1")));
        assert_eq!(ids(&directory), vec!["D1"]);
    }

    #[test]
    fn new_conversations_go_first_and_known_ones_stay_put() {
        let mut directory = ConversationDirectory::new();
        directory.upsert(conversation("a"));
        directory.upsert(conversation("b"));
        directory.upsert(conversation("c"));
        directory.upsert(conversation("a"));

        assert_eq!(ids(&directory), vec!["c", "b", "a"]);
    }

    #[test]
    fn replace_all_drops_duplicate_identifiers() {
        let mut directory = ConversationDirectory::new();
        directory.replace_all(vec![conversation("a"), conversation("b"), conversation("a")]);
        assert_eq!(ids(&directory), vec!["a", "b"]);
    }

    #[test]
    fn replace_all_keeps_the_active_conversation() {
        let mut directory = ConversationDirectory::new();
        directory.upsert(conversation("local"));
        directory.select("local").unwrap();

        directory.replace_all(vec![conversation("a")]);
        assert_eq!(ids(&directory), vec!["local", "a"]);
        assert_eq!(directory.active_id(), Some("local"));
    }

    #[test]
    fn select_rejects_unknown_identifier() {
        let mut directory = ConversationDirectory::new();
        directory.upsert(conversation("a"));

        let err = directory.select("missing").unwrap_err();
        assert!(matches!(err, SyncError::Fetch { .. }));
        assert!(directory.active().is_none());

        assert_eq!(directory.select("a").unwrap().id, "a");
        assert_eq!(directory.active().map(|c| c.id.as_str()), Some("a"));
    }
}
