//! Session management module.
//!
//! This module provides the types that describe connected agents (handles,
//! statuses, configuration, snapshots) and the registry that owns them.

mod configuration;
mod handle;
mod record;
mod registry;
mod status;

pub use configuration::{ConfigValue, Configuration};
pub use handle::ConnectionHandle;
pub use record::{Session, SessionSnapshot, TelemetryRecord};
pub use registry::{ConfigurationPush, SessionRegistry};
pub use status::SessionStatus;
