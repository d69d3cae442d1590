//! # Murmur Sync Crate
//!
//! Realtime synchronization engine of the Murmur messaging client. It keeps a
//! live view of one user's conversations in step with the message service by
//! reconciling three sources: bulk fetches, push events from the duplex
//! channel and the user's own actions.
//!
//! ## Architecture
//!
//! - **Protocol**: frame codec and typed events of the duplex channel
//! - **Connection**: channel lifecycle, outbound emission, push listeners
//! - **Directory**: ordered conversation list and the active selection
//! - **Stream**: message log of the active conversation with scroll hints
//! - **Typing**: remote typing indicators and the local composition window
//! - **Presence**: the set of online users
//! - **Synchronizer**: single-task orchestrator wiring the above together
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use murmur_api::{HttpChatApi, Session, User};
//! use murmur_config::ClientConfig;
//! use murmur_sync::{Synchronizer, WebSocketConnector};
//!
//! # async fn run() -> murmur_api::SyncResult<()> {
//! let config = ClientConfig::default();
//! let session = Arc::new(Session::with_user(User::new("u1", "Ada", "token")));
//! let api = Arc::new(HttpChatApi::new(&config.server, session.clone())?);
//! let connector = Arc::new(WebSocketConnector::new(&config.server)?);
//!
//! let (handle, _task) = Synchronizer::start(session, config, api, connector).await?;
//! handle.select_conversation("c1").await?;
//! handle.send_message("hello").await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod directory;
pub mod presence;
pub mod protocol;
pub mod snapshot;
pub mod stream;
pub mod synchronizer;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod timer;
pub mod typing;

pub use connection::{
    ConnectionManager, ConnectionStatus, Connector, Duplex, ListenerRegistry, Subscription,
    WebSocketConnector,
};
pub use directory::ConversationDirectory;
pub use presence::PresenceTracker;
pub use protocol::{ClientEvent, EventKind, ServerEvent, StopTypingSignal, TypingSignal};
pub use snapshot::{ConversationSummary, MessageView, SessionSnapshot, ViewSignal};
pub use stream::{AppendOrigin, AppendOutcome, LoadOutcome, MessageStream, ScrollHint, Viewport};
pub use synchronizer::{SessionHandle, Synchronizer};
pub use timer::DelayedTask;
pub use typing::{InputOutcome, TypingCoordinator};
