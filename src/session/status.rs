//! Session status state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of an agent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Transport connected, registration not yet received.
    #[default]
    Authorizing,
    /// Registered under an assigned identifier.
    Connected,
    /// Transport closed; identifier and configuration are retained.
    Disconnected,
    /// Purged. Reported once to observers, then dropped.
    Removed,
}

impl SessionStatus {
    /// Check if transition to target status is valid.
    ///
    /// Valid transitions:
    /// - Authorizing -> Connected
    /// - Authorizing -> Removed
    /// - Connected -> Disconnected
    /// - Disconnected -> Removed
    pub fn can_transition_to(&self, target: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (*self, target),
            (Authorizing, Connected)
                | (Authorizing, Removed)
                | (Connected, Disconnected)
                | (Disconnected, Removed)
        )
    }

    /// Attempt to transition to a new status.
    ///
    /// Leaves the status untouched and returns an error if the transition is
    /// not part of the state machine.
    pub fn transition_to(&mut self, target: SessionStatus) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::HubError::InvalidStatusTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Whether the underlying connection is still open.
    pub fn is_live(&self) -> bool {
        matches!(self, SessionStatus::Authorizing | SessionStatus::Connected)
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Removed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Authorizing => "AUTHORIZING",
            SessionStatus::Connected => "CONNECTED",
            SessionStatus::Disconnected => "DISCONNECTED",
            SessionStatus::Removed => "REMOVED",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_serde() {
        for status in [
            SessionStatus::Authorizing,
            SessionStatus::Connected,
            SessionStatus::Disconnected,
            SessionStatus::Removed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status));
        }
    }

    #[test]
    fn test_registration_path() {
        let mut status = SessionStatus::Authorizing;
        assert!(status.transition_to(SessionStatus::Connected).is_ok());
        assert!(status.transition_to(SessionStatus::Disconnected).is_ok());
        assert!(status.transition_to(SessionStatus::Removed).is_ok());
        assert_eq!(status, SessionStatus::Removed);
    }

    #[test]
    fn test_unregistered_disconnect() {
        let mut status = SessionStatus::Authorizing;
        assert!(status.transition_to(SessionStatus::Removed).is_ok());
    }

    #[test]
    fn test_invalid_transition_keeps_status() {
        let mut status = SessionStatus::Connected;
        assert!(status.transition_to(SessionStatus::Removed).is_err());
        assert_eq!(status, SessionStatus::Connected);

        let mut status = SessionStatus::Authorizing;
        assert!(status.transition_to(SessionStatus::Disconnected).is_err());
    }

    #[test]
    fn test_nothing_leaves_removed() {
        use SessionStatus::*;
        for target in [Authorizing, Connected, Disconnected, Removed] {
            assert!(!Removed.can_transition_to(target));
        }
    }

    #[test]
    fn test_is_live() {
        assert!(SessionStatus::Authorizing.is_live());
        assert!(SessionStatus::Connected.is_live());
        assert!(!SessionStatus::Disconnected.is_live());
        assert!(!SessionStatus::Removed.is_live());
        assert!(SessionStatus::Removed.is_terminal());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&SessionStatus::Disconnected).unwrap();
        assert_eq!(json, "\"DISCONNECTED\"");
    }
}
