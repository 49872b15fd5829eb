//! Agent wire protocol.
//!
//! Every message is one compact JSON object terminated by `\n`:
//!
//! - `{"type":"Registration","id":"agentA","payload":{...}}`
//! - `{"type":"Configuration","payload":{...}}`
//! - `{"type":"NetworkMetrics","payload":{...}}` (any other type is telemetry)
//!
//! The server answers with `Confirmation`, `Command` and `Configuration`
//! messages, see [`Outbound`].

mod message;

pub use message::{message_type, AgentCommand, Inbound, Outbound};
