//! Server facade: wires transport, hub and scheduler together.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::batch::{BatchIntervals, EventBatcher, Scheduler};
use crate::event::{HubEvent, ServerStatus};
use crate::hub::{Hub, HubHandle};
use crate::session::SessionRegistry;
use crate::transport::{TcpTransport, MAX_FRAME_LEN};
use crate::Result;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Batch publication intervals.
    pub intervals: BatchIntervals,
    /// Whether agents registering for the first time may send immediately.
    pub send_enabled_on_register: bool,
    /// Longest inbound frame accepted, in bytes.
    pub max_frame_len: usize,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_intervals(mut self, intervals: BatchIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn with_send_enabled_on_register(mut self, enabled: bool) -> Self {
        self.send_enabled_on_register = enabled;
        self
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            intervals: BatchIntervals::default(),
            send_enabled_on_register: true,
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

/// A running telemetry server.
///
/// Dropping it without calling [`stop`](Self::stop) leaves the tasks running
/// until the runtime shuts down.
pub struct TelemetryServer {
    local_addr: SocketAddr,
    hub: HubHandle,
    consumer: mpsc::UnboundedSender<HubEvent>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl TelemetryServer {
    /// Bind the listener and start the hub and batch scheduler.
    ///
    /// A bind failure is reported to `consumer` as
    /// [`ServerStatus::Error`] and returned.
    pub async fn start(
        config: ServerConfig,
        consumer: mpsc::UnboundedSender<HubEvent>,
    ) -> Result<Self> {
        let addr = config.bind_address();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let transport = match TcpTransport::bind(&addr, events_tx, shutdown_rx.clone()).await {
            Ok(transport) => transport.with_max_frame_len(config.max_frame_len),
            Err(e) => {
                error!("Failed to listen on {}: {}", addr, e);
                let _ = consumer.send(HubEvent::Status(ServerStatus::Error(e.to_string())));
                return Err(e);
            }
        };
        let local_addr = transport.local_addr()?;

        let batcher = Arc::new(EventBatcher::new());
        let registry = SessionRegistry::new(Arc::clone(&batcher))
            .with_send_enabled_on_register(config.send_enabled_on_register);
        let hub = Hub::new(registry, transport.connections());
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(batcher, consumer.clone()).with_intervals(config.intervals);

        let tasks = vec![
            tokio::spawn(transport.run()),
            tokio::spawn(hub.run(events_rx, control_rx, shutdown_rx.clone())),
            tokio::spawn(scheduler.run(shutdown_rx)),
        ];

        info!("Telemetry server listening on {}", local_addr);
        let _ = consumer.send(HubEvent::Status(ServerStatus::Running));

        Ok(Self {
            local_addr,
            hub: HubHandle::new(control_tx),
            consumer,
            shutdown,
            tasks,
        })
    }

    /// Address the listener actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Operator handle to the hub.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Stop accepting, close every connection, reset the registry and drop
    /// whatever was not yet published.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Server task ended abnormally: {}", e);
            }
        }

        info!("Telemetry server on {} stopped", self.local_addr);
        let _ = self.consumer.send(HubEvent::Status(ServerStatus::Stopped));
    }
}
