//! Message log of the active conversation and its scroll anchoring.

use std::time::Duration;

use murmur_api::{Message, SyncResult};
use murmur_config::StreamConfig;
use tracing::{debug, warn};

/// Viewport geometry reported by the rendering collaborator
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    pub scroll_height: f64,
    pub scroll_top: f64,
    pub client_height: f64,
}

impl Viewport {
    pub fn new(scroll_height: f64, scroll_top: f64, client_height: f64) -> Self {
        Self {
            scroll_height,
            scroll_top,
            client_height,
        }
    }

    pub fn distance_from_bottom(&self) -> f64 {
        self.scroll_height - self.scroll_top - self.client_height
    }
}

/// Where an appended message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOrigin {
    /// Optimistic copy of the user's own successful send
    Local,
    /// Push delivery from the channel
    Remote,
}

/// Request to scroll the view to the bottom once `delay` has passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollHint {
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub appended: bool,
    pub scroll: Option<ScrollHint>,
}

/// Result of applying a history fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// History replaced the stream; carries the message count
    Applied(usize),
    /// A newer load superseded this one before the fetch finished
    Discarded,
}

/// Append-only log for one conversation.
///
/// Messages are kept in arrival order. By default nothing is deduplicated:
/// an optimistic local copy and its later push echo are two entries.
#[derive(Debug, Clone)]
pub struct MessageStream {
    conversation_id: Option<String>,
    messages: Vec<Message>,
    loading: bool,
    load_generation: u64,
    viewport: Viewport,
    deduplicate_by_id: bool,
    near_bottom_threshold: f64,
    autoscroll_delay: Duration,
}

impl Default for MessageStream {
    fn default() -> Self {
        Self::new(&StreamConfig::default())
    }
}

impl MessageStream {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            conversation_id: None,
            messages: Vec::new(),
            loading: false,
            load_generation: 0,
            viewport: Viewport::default(),
            deduplicate_by_id: config.deduplicate_by_id,
            near_bottom_threshold: config.near_bottom_threshold_px,
            autoscroll_delay: config.autoscroll_delay(),
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Empty the log and bind it to `conversation_id` while history loads.
    ///
    /// Returns the generation [`MessageStream::finish_load`] must be given
    /// back; every call supersedes earlier loads, even of the same conversation.
    pub fn begin_load(&mut self, conversation_id: &str) -> u64 {
        self.conversation_id = Some(conversation_id.to_string());
        self.messages.clear();
        self.loading = true;
        self.load_generation += 1;
        self.load_generation
    }

    /// Apply a finished history fetch.
    ///
    /// Results of a superseded load are discarded. A failed fetch leaves the
    /// stream empty and hands the error back.
    pub fn finish_load(
        &mut self,
        generation: u64,
        result: SyncResult<Vec<Message>>,
    ) -> SyncResult<LoadOutcome> {
        if generation != self.load_generation || !self.loading {
            debug!(generation, current = self.load_generation, "discarding superseded history");
            return match result {
                Ok(_) => Ok(LoadOutcome::Discarded),
                Err(err) => Err(err),
            };
        }

        let conversation_id = self.conversation_id.as_deref().unwrap_or_default();
        self.loading = false;
        match result {
            Ok(history) => {
                self.messages = history;
                debug!(conversation_id, count = self.messages.len(), "history loaded");
                Ok(LoadOutcome::Applied(self.messages.len()))
            }
            Err(err) => {
                self.messages.clear();
                warn!(conversation_id, error = %err, "history fetch failed");
                Err(err)
            }
        }
    }

    /// Unbind from any conversation
    pub fn reset(&mut self) {
        self.conversation_id = None;
        self.messages.clear();
        self.loading = false;
        self.load_generation += 1;
    }

    pub fn update_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn is_near_bottom(&self) -> bool {
        self.viewport.distance_from_bottom() < self.near_bottom_threshold
    }

    /// Append `message` to the tail and decide whether to follow it.
    ///
    /// The near-bottom check uses the viewport as it was before the append.
    /// Local appends always scroll.
    pub fn append(&mut self, message: Message, origin: AppendOrigin) -> AppendOutcome {
        let near_bottom = self.is_near_bottom();

        if self.deduplicate_by_id && self.messages.iter().any(|m| m.id == message.id) {
            debug!(message_id = %message.id, "skipping duplicate message");
            return AppendOutcome {
                appended: false,
                scroll: None,
            };
        }

        self.messages.push(message);

        let scroll = (near_bottom || origin == AppendOrigin::Local).then_some(ScrollHint {
            delay: self.autoscroll_delay,
        });

        AppendOutcome {
            appended: true,
            scroll,
        }
    }
}
