//! Typing indicators for the active conversation.
//!
//! Remote entries come from `typing`/`stopTyping` pushes. The local side
//! tracks whether this user is mid-composition so the synchronizer knows
//! when to emit the start and stop signals around its debounce timer.

use std::time::Duration;

use murmur_api::Participant;
use tokio::time::Instant;
use tracing::debug;

use crate::protocol::{StopTypingSignal, TypingSignal};

#[derive(Debug, Clone)]
struct RemoteTyping {
    user_id: String,
    user_name: String,
    refreshed_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LocalTyping {
    Idle,
    Composing { user_id: String, generation: u64 },
}

/// What a local input change produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputOutcome {
    /// Start signal to emit; `None` while a composition window is open
    pub start: Option<TypingSignal>,
    /// Token the debounce timer must hand back to [`TypingCoordinator::local_idle`]
    pub generation: u64,
}

#[derive(Debug)]
pub struct TypingCoordinator {
    conversation_id: Option<String>,
    remote: Vec<RemoteTyping>,
    local: LocalTyping,
    generation: u64,
}

impl Default for TypingCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl TypingCoordinator {
    pub fn new() -> Self {
        Self {
            conversation_id: None,
            remote: Vec::new(),
            local: LocalTyping::Idle,
            generation: 0,
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Rebind to another conversation (or none), dropping all entries.
    ///
    /// Returns the stop signal owed for the previous conversation when the
    /// local user was still composing there.
    pub fn reset(&mut self, conversation_id: Option<&str>) -> Option<StopTypingSignal> {
        let owed = match (&self.local, self.conversation_id.as_deref()) {
            (LocalTyping::Composing { user_id, .. }, Some(previous)) => Some(StopTypingSignal {
                conversation_id: previous.to_string(),
                user_id: user_id.clone(),
            }),
            _ => None,
        };

        self.conversation_id = conversation_id.map(str::to_string);
        self.remote.clear();
        self.local = LocalTyping::Idle;
        self.generation += 1;
        owed
    }

    /// Mark a remote participant as typing; repeated starts only refresh it
    pub fn remote_started(&mut self, signal: &TypingSignal, now: Instant) -> bool {
        if self.conversation_id.as_deref() != Some(signal.conversation_id.as_str()) {
            return false;
        }

        if let Some(entry) = self
            .remote
            .iter_mut()
            .find(|entry| entry.user_id == signal.user_id)
        {
            entry.refreshed_at = now;
            return false;
        }

        debug!(
            conversation_id = %signal.conversation_id,
            user_id = %signal.user_id,
            "participant started typing"
        );
        self.remote.push(RemoteTyping {
            user_id: signal.user_id.clone(),
            user_name: signal.user_name.clone(),
            refreshed_at: now,
        });
        true
    }

    /// Remove a remote participant; absent entries are ignored
    pub fn remote_stopped(&mut self, signal: &StopTypingSignal) -> bool {
        if self.conversation_id.as_deref() != Some(signal.conversation_id.as_str()) {
            return false;
        }

        let before = self.remote.len();
        self.remote.retain(|entry| entry.user_id != signal.user_id);
        before != self.remote.len()
    }

    /// Drop entries not refreshed within `max_age`
    pub fn expire(&mut self, now: Instant, max_age: Duration) -> bool {
        let before = self.remote.len();
        self.remote
            .retain(|entry| now.saturating_duration_since(entry.refreshed_at) < max_age);
        let removed = before - self.remote.len();
        if removed > 0 {
            debug!(removed, "expired stale typing entries");
        }
        removed > 0
    }

    /// Display names of everyone typing, in arrival order
    pub fn typing_names(&self) -> Vec<String> {
        self.remote
            .iter()
            .map(|entry| entry.user_name.clone())
            .collect()
    }

    pub fn is_typing(&self, user_id: &str) -> bool {
        self.remote.iter().any(|entry| entry.user_id == user_id)
    }

    pub fn is_composing(&self) -> bool {
        matches!(self.local, LocalTyping::Composing { .. })
    }

    /// Register a local input change for the active conversation.
    ///
    /// Returns `None` when no conversation is active. Every call yields a
    /// fresh generation, which invalidates earlier debounce timers.
    pub fn local_input(&mut self, user: &Participant) -> Option<InputOutcome> {
        let conversation_id = self.conversation_id.clone()?;
        self.generation += 1;
        let generation = self.generation;

        let start = match self.local {
            LocalTyping::Idle => Some(TypingSignal {
                conversation_id,
                user_id: user.id.clone(),
                user_name: user.name.clone(),
            }),
            LocalTyping::Composing { .. } => None,
        };

        self.local = LocalTyping::Composing {
            user_id: user.id.clone(),
            generation,
        };
        Some(InputOutcome { start, generation })
    }

    /// Debounce expiry; yields the stop signal when `generation` is still current
    pub fn local_idle(&mut self, generation: u64) -> Option<StopTypingSignal> {
        let current = matches!(
            self.local,
            LocalTyping::Composing { generation: pending, .. } if pending == generation
        );
        if current {
            self.local_stop()
        } else {
            None
        }
    }

    /// End the local composition window immediately
    pub fn local_stop(&mut self) -> Option<StopTypingSignal> {
        let previous = std::mem::replace(&mut self.local, LocalTyping::Idle);
        self.generation += 1;
        match (previous, self.conversation_id.as_ref()) {
            (LocalTyping::Composing { user_id, .. }, Some(conversation_id)) => {
                Some(StopTypingSignal {
                    conversation_id: conversation_id.clone(),
                    user_id,
                })
            }
            _ => None,
        }
    }
}
