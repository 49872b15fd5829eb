//! # telemetry-hub
//!
//! Telemetry collection server core for fleets of networked device agents.
//!
//! Agents connect over TCP, register under an identifier, and stream
//! telemetry as newline-delimited JSON. The hub tracks every connection as a
//! session, keeps identifiers unique across reconnects, and hands batches of
//! session changes and telemetry to a consumer on an adaptive timer.
//!
//! ## Features
//!
//! - **Session registry**: `AUTHORIZING -> CONNECTED -> DISCONNECTED -> REMOVED`
//!   lifecycle with collision suffixes and reconnect takeover
//! - **Batching**: exactly-once, in-order drain of session changes and telemetry
//! - **Adaptive scheduling**: publication slows down while sessions churn
//! - **Operator control**: send gating, configuration push and command broadcast
//!
//! ## Quick Start
//!
//! ```no_run
//! use telemetry_hub::{HubEvent, ServerConfig, TelemetryServer};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> telemetry_hub::Result<()> {
//!     telemetry_hub::logging::try_init().ok();
//!
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     let server = TelemetryServer::start(ServerConfig::new("0.0.0.0", 5000), tx).await?;
//!
//!     while let Some(event) = rx.recv().await {
//!         if let HubEvent::Telemetry(batch) = event {
//!             println!("{} records", batch.len());
//!         }
//!     }
//!
//!     server.stop().await;
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod event;
pub mod hub;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use batch::{BatchIntervals, EventBatcher, Scheduler};
pub use error::{HubError, Result};
pub use event::{HubEvent, ServerStatus};
pub use hub::{Hub, HubHandle};
pub use protocol::{AgentCommand, Inbound, Outbound};
pub use server::{ServerConfig, TelemetryServer};
pub use session::{
    ConfigValue, Configuration, ConnectionHandle, SessionRegistry, SessionSnapshot, SessionStatus,
    TelemetryRecord,
};
pub use transport::{PeerSink, TcpTransport, TransportEvent};
