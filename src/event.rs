//! Events delivered to the consumer side of the hub.

use serde::Serialize;

use crate::session::{SessionSnapshot, TelemetryRecord};

/// Listener status, reported when the server starts, stops or fails to bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum ServerStatus {
    Running,
    Stopped,
    Error(String),
}

/// One publication to the consumer.
///
/// Batches are immutable snapshots; the hub never looks at them again once
/// they are sent.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum HubEvent {
    SessionChanges(Vec<SessionSnapshot>),
    Telemetry(Vec<TelemetryRecord>),
    Status(ServerStatus),
}

impl HubEvent {
    /// Number of records carried (status events count as one).
    pub fn len(&self) -> usize {
        match self {
            HubEvent::SessionChanges(batch) => batch.len(),
            HubEvent::Telemetry(batch) => batch.len(),
            HubEvent::Status(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(HubEvent::Status(ServerStatus::Error("busy".into()))).unwrap();
        assert_eq!(json["kind"], "status");
        assert_eq!(json["items"]["status"], "error");
        assert_eq!(json["items"]["reason"], "busy");
    }

    #[test]
    fn test_len() {
        assert!(HubEvent::Telemetry(Vec::new()).is_empty());
        assert_eq!(HubEvent::Status(ServerStatus::Running).len(), 1);
    }
}
