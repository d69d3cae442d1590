//! Read-only view state published to the rendering collaborator.

use std::time::Duration;

use murmur_api::Message;

use crate::connection::ConnectionStatus;

/// One row of the conversation list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub counterpart_id: Option<String>,
    pub online: bool,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    pub message: Message,
    /// Authored by the session user
    pub own: bool,
}

/// Everything a renderer needs to draw the session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub user_id: Option<String>,
    pub connection: ConnectionStatus,
    pub conversations: Vec<ConversationSummary>,
    pub active_conversation: Option<String>,
    pub messages: Vec<MessageView>,
    pub typing: Vec<String>,
    pub online_users: Vec<String>,
    pub loading: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            user_id: None,
            connection: ConnectionStatus::Disconnected,
            conversations: Vec::new(),
            active_conversation: None,
            messages: Vec::new(),
            typing: Vec::new(),
            online_users: Vec::new(),
            loading: false,
        }
    }
}

impl SessionSnapshot {
    pub fn active_summary(&self) -> Option<&ConversationSummary> {
        self.conversations.iter().find(|summary| summary.active)
    }

    /// Indicator line for the active conversation; `None` hides it
    pub fn typing_indicator(&self) -> Option<String> {
        match self.typing.as_slice() {
            [] => None,
            [one] => Some(format!("{one} is typing...")),
            names => Some(format!("{} are typing...", names.join(", "))),
        }
    }
}

/// One-shot instructions for the renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewSignal {
    ScrollToBottom {
        conversation_id: String,
        delay: Duration,
    },
}
