//! Session registry: identity, status and the registration state machine.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use super::{
    Configuration, ConnectionHandle, Session, SessionSnapshot, SessionStatus, TelemetryRecord,
};
use crate::batch::EventBatcher;
use crate::error::HubError;
use crate::Result;

/// What the hub needs to push an operator configuration change to an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationPush {
    pub handle: ConnectionHandle,
    pub identifier: String,
    pub send_enabled: bool,
    pub configuration: Configuration,
    /// False when the session is disconnected and nothing can be written.
    pub deliverable: bool,
}

/// Owner of every session record.
///
/// The registry is the only place that changes a session's status or
/// identifier. It is single-writer: the hub task owns it outright, and every
/// mutation records a snapshot into the shared [`EventBatcher`].
///
/// Identifiers stay reserved while a session is `Disconnected`; they are
/// released only when the record is purged or taken over by a reconnecting
/// agent requesting the same identifier.
pub struct SessionRegistry {
    sessions: HashMap<ConnectionHandle, Session>,
    identifiers: HashSet<String>,
    batcher: Arc<EventBatcher>,
    send_enabled_on_register: bool,
}

impl SessionRegistry {
    /// Create an empty registry recording into `batcher`.
    pub fn new(batcher: Arc<EventBatcher>) -> Self {
        Self {
            sessions: HashMap::new(),
            identifiers: HashSet::new(),
            batcher,
            send_enabled_on_register: true,
        }
    }

    /// Whether a first-time registration starts with sending enabled.
    pub fn with_send_enabled_on_register(mut self, enabled: bool) -> Self {
        self.send_enabled_on_register = enabled;
        self
    }

    pub fn batcher(&self) -> &Arc<EventBatcher> {
        &self.batcher
    }

    /// Track a newly accepted connection as `Authorizing`.
    pub fn on_connected(&mut self, handle: ConnectionHandle, peer: SocketAddr) -> Result<()> {
        if self.sessions.contains_key(&handle) {
            return Err(HubError::SessionExists(handle));
        }

        let identifier = self.unique_identifier(&handle.to_string());
        self.identifiers.insert(identifier.clone());

        let session = Session::new(handle, identifier, peer);
        info!("Agent {} ({}) awaiting registration", session.identifier, peer);
        self.batcher.record_session_change(session.snapshot());
        self.sessions.insert(handle, session);
        Ok(())
    }

    /// Handle a closed connection.
    ///
    /// An agent that never registered is purged on the spot; a registered one
    /// is kept as `Disconnected` so it can be reclaimed. Returns the status the
    /// session ended up in.
    pub fn on_disconnected(&mut self, handle: ConnectionHandle) -> Result<SessionStatus> {
        let session = self
            .sessions
            .get_mut(&handle)
            .ok_or_else(|| HubError::SessionNotFound(handle.to_string()))?;

        if session.status == SessionStatus::Authorizing {
            let removed = self.purge(handle)?;
            info!("Unregistered agent {} disconnected", removed.identifier);
            return Ok(SessionStatus::Removed);
        }

        session.status.transition_to(SessionStatus::Disconnected)?;
        session.send_enabled = false;
        info!("Agent {} ({}) disconnected", session.identifier, session.peer);
        self.batcher.record_session_change(session.snapshot());
        Ok(SessionStatus::Disconnected)
    }

    /// Register an `Authorizing` session and return its assigned identifier.
    ///
    /// A `Disconnected` record holding `requested` is taken over: it is purged
    /// and the new session keeps the identifier unsuffixed, the operator's
    /// send decision, and the old configuration with `configuration`
    /// overlaid. Otherwise a taken identifier gets the smallest free `_N`
    /// suffix. An empty request keeps the placeholder identifier; any other
    /// request is used verbatim.
    pub fn register(
        &mut self,
        handle: ConnectionHandle,
        requested: &str,
        configuration: Configuration,
    ) -> Result<String> {
        let (status, placeholder) = self
            .sessions
            .get(&handle)
            .map(|s| (s.status, s.identifier.clone()))
            .ok_or_else(|| HubError::SessionNotFound(handle.to_string()))?;

        if !status.can_transition_to(SessionStatus::Connected) {
            return Err(HubError::InvalidStatusTransition {
                from: status,
                to: SessionStatus::Connected,
            });
        }

        let requested = if requested.is_empty() {
            placeholder.as_str()
        } else {
            requested
        };
        self.identifiers.remove(&placeholder);

        let previous = self
            .sessions
            .values()
            .find(|s| {
                s.handle != handle
                    && s.status == SessionStatus::Disconnected
                    && s.identifier == requested
            })
            .map(|s| s.handle);

        let (identifier, send, configuration) = match previous {
            Some(old_handle) => {
                let old = self.purge(old_handle)?;
                info!("Agent {} reconnected, replacing {}", old.identifier, old.handle);
                let mut carried = old.configuration;
                carried.merge(configuration);
                (old.identifier, old.send_preference, carried)
            }
            None => (
                self.unique_identifier(requested),
                self.send_enabled_on_register,
                configuration,
            ),
        };

        self.identifiers.insert(identifier.clone());
        let session = self
            .sessions
            .get_mut(&handle)
            .ok_or_else(|| HubError::SessionNotFound(handle.to_string()))?;
        session.status.transition_to(SessionStatus::Connected)?;
        session.identifier = identifier.clone();
        session.configuration = configuration;
        session.set_sending(send);

        info!(
            "Agent {} ({}) registered as {}",
            handle, session.peer, identifier
        );
        self.batcher.record_session_change(session.snapshot());
        Ok(identifier)
    }

    /// Replace the configuration an agent reported about itself.
    pub fn update_configuration(
        &mut self,
        handle: ConnectionHandle,
        configuration: Configuration,
    ) -> Result<()> {
        let session = self
            .sessions
            .get_mut(&handle)
            .ok_or_else(|| HubError::SessionNotFound(handle.to_string()))?;

        session.configuration = configuration;
        debug!("Agent {} updated its configuration", session.identifier);
        self.batcher.record_session_change(session.snapshot());
        Ok(())
    }

    /// Apply an operator decision: toggle sending and set a new configuration.
    pub fn set_send_enabled(
        &mut self,
        handle: ConnectionHandle,
        enabled: bool,
        configuration: Configuration,
    ) -> Result<ConfigurationPush> {
        let session = self
            .sessions
            .get_mut(&handle)
            .ok_or_else(|| HubError::SessionNotFound(handle.to_string()))?;

        session.set_sending(enabled);
        session.configuration = configuration;
        info!(
            "Configuration for {} updated, sending {}",
            session.identifier,
            if enabled { "enabled" } else { "disabled" }
        );
        self.batcher.record_session_change(session.snapshot());

        Ok(ConfigurationPush {
            handle,
            identifier: session.identifier.clone(),
            send_enabled: session.send_enabled,
            configuration: session.configuration.clone(),
            deliverable: session.status.is_live(),
        })
    }

    /// Record an inbound telemetry message under the sender's identifier.
    pub fn record_telemetry(
        &self,
        handle: ConnectionHandle,
        kind: &str,
        payload: Value,
    ) -> Result<()> {
        let session = self
            .sessions
            .get(&handle)
            .ok_or_else(|| HubError::SessionNotFound(handle.to_string()))?;

        self.batcher
            .record_telemetry(TelemetryRecord::new(session.identifier.clone(), kind, payload));
        Ok(())
    }

    /// Purge every `Disconnected` session, releasing their identifiers.
    ///
    /// Returns the number of sessions removed.
    pub fn purge_disconnected(&mut self) -> usize {
        let handles: Vec<ConnectionHandle> = self
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Disconnected)
            .map(|s| s.handle)
            .collect();

        let removed = handles
            .into_iter()
            .filter(|handle| self.purge(*handle).is_ok())
            .count();

        if removed > 0 {
            info!("Removed {} inactive agents", removed);
        }
        removed
    }

    /// Drop every record without reporting them individually.
    pub fn clear(&mut self) {
        let count = self.sessions.len();
        self.sessions.clear();
        self.identifiers.clear();
        info!("Session registry cleared ({} sessions)", count);
    }

    pub fn get(&self, handle: &ConnectionHandle) -> Option<&Session> {
        self.sessions.get(handle)
    }

    /// Find the session currently holding `identifier`.
    pub fn handle_of(&self, identifier: &str) -> Option<ConnectionHandle> {
        self.sessions
            .values()
            .find(|s| s.identifier == identifier)
            .map(|s| s.handle)
    }

    /// Handles of every session that accepts outbound commands.
    pub fn sendable_handles(&self) -> Vec<ConnectionHandle> {
        self.sessions
            .values()
            .filter(|s| s.send_enabled)
            .map(|s| s.handle)
            .collect()
    }

    /// Whether `identifier` is held by some tracked session.
    pub fn is_reserved(&self, identifier: &str) -> bool {
        self.identifiers.contains(identifier)
    }

    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.sessions.values().map(Session::snapshot).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn unique_identifier(&self, requested: &str) -> String {
        if !self.identifiers.contains(requested) {
            return requested.to_string();
        }

        let mut suffix: u64 = 1;
        loop {
            let candidate = format!("{}_{}", requested, suffix);
            if !self.identifiers.contains(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Move a session to `Removed`, report it once, and drop it.
    fn purge(&mut self, handle: ConnectionHandle) -> Result<Session> {
        let mut session = self
            .sessions
            .remove(&handle)
            .ok_or_else(|| HubError::SessionNotFound(handle.to_string()))?;

        if let Err(e) = session.status.transition_to(SessionStatus::Removed) {
            self.sessions.insert(handle, session);
            return Err(e);
        }

        session.send_enabled = false;
        self.identifiers.remove(&session.identifier);
        self.batcher.record_session_change(session.snapshot());
        Ok(session)
    }
}
