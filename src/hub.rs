//! Hub actor: the one task that owns the session registry.
//!
//! Transport events and operator commands arrive on channels and are applied
//! one at a time, so the registry never needs a lock. Only the
//! [`EventBatcher`](crate::batch::EventBatcher) is shared, with the scheduler.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::HubError;
use crate::protocol::{message_type, Inbound, Outbound};
use crate::session::{
    Configuration, ConfigurationPush, ConnectionHandle, SessionRegistry, SessionSnapshot,
};
use crate::transport::{PeerSink, TransportEvent};
use crate::Result;

/// Operator requests handled by the hub.
#[derive(Debug)]
pub enum Control {
    /// Toggle sending for the session holding `identifier`. `None` keeps the
    /// session's current configuration.
    SetSendEnabled {
        identifier: String,
        enabled: bool,
        configuration: Option<Configuration>,
    },
    PurgeDisconnected,
    Clear,
    /// Send a command string to every session with sending enabled.
    Broadcast(String),
    /// Reply with the current state of every tracked session.
    Sessions(oneshot::Sender<Vec<SessionSnapshot>>),
}

/// Cloneable operator-side handle to a running hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<Control>,
}

impl HubHandle {
    pub fn new(tx: mpsc::UnboundedSender<Control>) -> Self {
        Self { tx }
    }

    fn request(&self, control: Control) -> Result<()> {
        self.tx.send(control).map_err(|_| HubError::ChannelClosed)
    }

    pub fn set_send_enabled(
        &self,
        identifier: impl Into<String>,
        enabled: bool,
        configuration: Option<Configuration>,
    ) -> Result<()> {
        self.request(Control::SetSendEnabled {
            identifier: identifier.into(),
            enabled,
            configuration,
        })
    }

    pub fn purge_disconnected(&self) -> Result<()> {
        self.request(Control::PurgeDisconnected)
    }

    pub fn clear(&self) -> Result<()> {
        self.request(Control::Clear)
    }

    pub fn broadcast(&self, command: impl Into<String>) -> Result<()> {
        self.request(Control::Broadcast(command.into()))
    }

    pub async fn sessions(&self) -> Result<Vec<SessionSnapshot>> {
        let (reply, rx) = oneshot::channel();
        self.request(Control::Sessions(reply))?;
        rx.await.map_err(|_| HubError::ChannelClosed)
    }
}

/// Dispatcher between transport, registry and operator.
pub struct Hub {
    registry: SessionRegistry,
    sink: Arc<dyn PeerSink>,
}

impl Hub {
    pub fn new(registry: SessionRegistry, sink: Arc<dyn PeerSink>) -> Self {
        Self { registry, sink }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Apply one transport event. Errors are logged and the event dropped.
    pub fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { handle, peer } => {
                if let Err(e) = self.registry.on_connected(handle, peer) {
                    warn!("Ignoring connect for {}: {}", handle, e);
                }
            }
            TransportEvent::Closed { handle } => {
                if let Err(e) = self.registry.on_disconnected(handle) {
                    warn!("Ignoring disconnect for {}: {}", handle, e);
                }
            }
            TransportEvent::Received { handle, frame } => {
                if let Err(e) = self.handle_frame(handle, &frame) {
                    warn!("Dropped message from {}: {}", handle, e);
                }
            }
        }
    }

    fn handle_frame(&mut self, handle: ConnectionHandle, frame: &[u8]) -> Result<()> {
        match Inbound::decode(frame)? {
            Inbound::Registration {
                requested_id,
                configuration,
            } => {
                let assigned = self.registry.register(handle, &requested_id, configuration)?;
                self.send(handle, &Outbound::Confirmation { id: assigned });
            }
            Inbound::Configuration {
                configuration,
                payload,
            } => {
                self.registry.update_configuration(handle, configuration)?;
                self.registry
                    .record_telemetry(handle, message_type::CONFIGURATION, payload)?;
            }
            Inbound::Telemetry { kind, payload } => {
                self.registry.record_telemetry(handle, &kind, payload)?;
            }
        }
        Ok(())
    }

    /// Apply one operator request. Errors are logged.
    pub fn handle_control(&mut self, control: Control) {
        match control {
            Control::SetSendEnabled {
                identifier,
                enabled,
                configuration,
            } => {
                if let Err(e) = self.set_send_enabled(&identifier, enabled, configuration) {
                    warn!("Could not update {}: {}", identifier, e);
                }
            }
            Control::PurgeDisconnected => {
                self.registry.purge_disconnected();
            }
            Control::Clear => self.registry.clear(),
            Control::Broadcast(command) => {
                self.broadcast(&command);
            }
            Control::Sessions(reply) => {
                let _ = reply.send(self.registry.snapshots());
            }
        }
    }

    /// Update a session's send gate and push the configuration to the agent.
    pub fn set_send_enabled(
        &mut self,
        identifier: &str,
        enabled: bool,
        configuration: Option<Configuration>,
    ) -> Result<ConfigurationPush> {
        let handle = self
            .registry
            .handle_of(identifier)
            .ok_or_else(|| HubError::SessionNotFound(identifier.to_string()))?;
        let configuration = match configuration {
            Some(configuration) => configuration,
            None => self
                .registry
                .get(&handle)
                .map(|s| s.configuration.clone())
                .unwrap_or_default(),
        };

        let push = self.registry.set_send_enabled(handle, enabled, configuration)?;
        if push.deliverable {
            self.send(
                handle,
                &Outbound::Configuration {
                    id: push.identifier.clone(),
                    allow_sending: push.send_enabled,
                    payload: push.configuration.clone(),
                },
            );
        }
        Ok(push)
    }

    /// Send `command` to every session with sending enabled and an open
    /// connection. Returns how many agents it reached.
    pub fn broadcast(&self, command: &str) -> usize {
        let frame = match (Outbound::Command {
            command: command.to_string(),
        })
        .encode()
        {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Could not encode command \"{}\": {}", command, e);
                return 0;
            }
        };

        let delivered = self
            .registry
            .sendable_handles()
            .into_iter()
            .filter(|handle| self.sink.is_open(*handle) && self.sink.send(*handle, frame.clone()))
            .count();

        info!("Command \"{}\" sent to {} agents", command, delivered);
        delivered
    }

    fn send(&self, handle: ConnectionHandle, message: &Outbound) {
        match message.encode() {
            Ok(frame) => {
                if !self.sink.send(handle, frame) {
                    debug!("{} is no longer writable", handle);
                }
            }
            Err(e) => warn!("Could not encode message for {}: {}", handle, e),
        }
    }

    /// Process events and requests until `shutdown` fires, then reset the
    /// registry and drop anything not yet published.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        mut control: mpsc::UnboundedReceiver<Control>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                Some(event) = events.recv() => self.handle_transport(event),
                Some(request) = control.recv() => self.handle_control(request),
                else => break,
            }
        }

        self.registry.clear();
        let dropped = self.registry.batcher().discard();
        debug!(
            "Hub stopped, discarded {} session changes and {} telemetry records",
            dropped.sessions, dropped.telemetry
        );
    }
}
