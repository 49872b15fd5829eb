//! Error types for telemetry-hub.

use thiserror::Error;

use crate::session::{ConnectionHandle, SessionStatus};

/// Main error type for telemetry-hub operations.
///
/// None of these are fatal to the hub: referential and protocol errors are
/// logged by the dispatcher and the offending message is dropped.
#[derive(Error, Debug)]
pub enum HubError {
    /// No session is tracked for the given handle or identifier.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A session is already tracked for the given handle.
    #[error("session already exists: {0}")]
    SessionExists(ConnectionHandle),

    /// Invalid status transition attempted.
    #[error("invalid status transition from {from:?} to {to:?}")]
    InvalidStatusTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    /// Malformed bytes received from a peer.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The hub or consumer side of a channel has gone away.
    #[error("channel closed")]
    ChannelClosed,
}

impl From<serde_json::Error> for HubError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

/// Convenience Result type for telemetry-hub operations.
pub type Result<T> = std::result::Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_not_found_display() {
        let err = HubError::SessionNotFound("agentA".into());
        assert!(err.to_string().contains("agentA"));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_session_exists_display() {
        let err = HubError::SessionExists(ConnectionHandle::from_raw(2));
        assert_eq!(err.to_string(), "session already exists: conn-00000002");
    }

    #[test]
    fn test_transition_display() {
        let err = HubError::InvalidStatusTransition {
            from: SessionStatus::Removed,
            to: SessionStatus::Connected,
        };
        assert!(err.to_string().contains("Removed"));
        assert!(err.to_string().contains("Connected"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err: HubError = io_err.into();
        assert!(matches!(err, HubError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_json_error_is_protocol_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: HubError = json_err.into();
        assert!(matches!(err, HubError::Protocol(_)));
    }
}
