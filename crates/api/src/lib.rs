//! # Murmur API Crate
//!
//! Domain entities, the error taxonomy, the authenticated session object and
//! the request/response collaborator used by the synchronization engine.
//!
//! ## Architecture
//!
//! - **Entities**: wire-compatible models (Conversation, Message, Participant, User)
//! - **Client**: the [`ChatApi`] trait and its HTTP implementation
//! - **Session**: the process-wide logged-in user
//! - **Types**: shared error types and identifier aliases
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use murmur_api::{ChatApi, HttpChatApi, Session, User};
//! use murmur_config::ServerConfig;
//!
//! # async fn run() -> murmur_api::SyncResult<()> {
//! let session = Arc::new(Session::with_user(User::new("u1", "Ada", "token")));
//! let api = HttpChatApi::new(&ServerConfig::default(), session)?;
//! let conversations = api.fetch_conversations().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod entities;
pub mod session;
pub mod types;

pub use client::{ChatApi, HttpChatApi};
pub use entities::{Conversation, Message, Participant, User};
pub use session::Session;
pub use types::{ConversationId, MessageId, SyncError, SyncResult, UserId};
