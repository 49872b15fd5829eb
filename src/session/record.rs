//! Session records and the immutable views handed to observers.

use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Configuration, ConnectionHandle, SessionStatus};

/// One tracked agent connection.
#[derive(Debug, Clone)]
pub struct Session {
    /// Transport connection this session belongs to.
    pub handle: ConnectionHandle,
    /// Operator-visible name, unique among non-removed sessions.
    pub identifier: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Whether outbound commands and configuration are delivered.
    pub send_enabled: bool,
    /// Last-known configuration.
    pub configuration: Configuration,
    /// Remote address of the connection.
    pub peer: SocketAddr,
    /// Time the transport connection was accepted.
    pub connected_at: DateTime<Utc>,
    /// Operator's last send decision. Survives disconnect so a reconnecting
    /// agent gets it back, while `send_enabled` drops to false.
    pub(crate) send_preference: bool,
}

impl Session {
    /// Create an unregistered session whose identifier is the handle's placeholder.
    pub fn new(handle: ConnectionHandle, identifier: String, peer: SocketAddr) -> Self {
        Self {
            handle,
            identifier,
            status: SessionStatus::Authorizing,
            send_enabled: false,
            configuration: Configuration::default(),
            peer,
            connected_at: Utc::now(),
            send_preference: false,
        }
    }

    /// Update both the live gate and the retained preference.
    pub(crate) fn set_sending(&mut self, enabled: bool) {
        self.send_preference = enabled;
        self.send_enabled = enabled && self.status.is_live();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            handle: self.handle,
            identifier: self.identifier.clone(),
            status: self.status,
            send_enabled: self.send_enabled,
            configuration: self.configuration.clone(),
            peer_address: self.peer.ip(),
            peer_port: self.peer.port(),
            connected_at: self.connected_at,
        }
    }
}

/// Point-in-time copy of a session, as delivered in session-change batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub handle: ConnectionHandle,
    pub identifier: String,
    pub status: SessionStatus,
    pub send_enabled: bool,
    pub configuration: Configuration,
    pub peer_address: IpAddr,
    pub peer_port: u16,
    pub connected_at: DateTime<Utc>,
}

/// One inbound telemetry message, stamped with the sender's identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub identifier: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
}

impl TelemetryRecord {
    pub fn new(identifier: impl Into<String>, kind: impl Into<String>, payload: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            identifier: identifier.into(),
            kind: kind.into(),
            payload,
        }
    }
}
