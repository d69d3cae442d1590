//! Shared types used across the client crates.

pub mod errors;

pub use errors::{SyncError, SyncResult};

// Common type aliases
pub type ConversationId = String;
pub type MessageId = String;
pub type UserId = String;
