//! Error types for the messaging client.

use thiserror::Error;

/// Result type alias for client operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Main error type for the messaging client.
///
/// Every failure of an awaited collaborator call is converted into one of
/// these kinds at the call site. None of them is retried automatically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Fetch failed: {message}")]
    Fetch { message: String },

    #[error("Send failed: {message}")]
    Send { message: String },

    #[error("Authorization failed: {message}")]
    Auth { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Synchronizer is no longer running")]
    Closed,
}

impl SyncError {
    /// Create a transport error for the duplex channel
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }

    /// Create a fetch error for history or conversation retrieval
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch { message: message.into() }
    }

    /// Create a send error for message submission
    pub fn send(message: impl Into<String>) -> Self {
        Self::Send { message: message.into() }
    }

    /// Create an authorization error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth { message: message.into() }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Whether the auth collaborator has to re-authenticate the user
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Transport {
            message: format!("payload decoding error: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = SyncError::send("server returned 500");
        assert_eq!(err.to_string(), "Send failed: server returned 500");
        assert!(!err.is_auth());
        assert!(SyncError::auth("expired").is_auth());
    }

    #[test]
    fn json_errors_become_transport_errors() {
        let err: SyncError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, SyncError::Transport { .. }));
    }
}
