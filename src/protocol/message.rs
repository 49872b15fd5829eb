//! Agent wire messages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::HubError;
use crate::session::Configuration;
use crate::Result;

/// Message type names carried in the `type` field.
pub mod message_type {
    // Agent to server
    pub const REGISTRATION: &str = "Registration";
    pub const NETWORK_METRICS: &str = "NetworkMetrics";
    pub const DEVICE_STATUS: &str = "DeviceStatus";
    pub const LOG: &str = "Log";

    // Server to agent
    pub const CONFIRMATION: &str = "Confirmation";
    pub const COMMAND: &str = "Command";

    // Both directions
    pub const CONFIGURATION: &str = "Configuration";
}

/// Commands agents understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentCommand {
    /// Begin periodic telemetry.
    Start,
    /// Stop periodic telemetry.
    Stop,
}

impl AgentCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentCommand::Start => "start",
            AgentCommand::Stop => "stop",
        }
    }
}

impl fmt::Display for AgentCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentCommand {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(AgentCommand::Start),
            "stop" => Ok(AgentCommand::Stop),
            other => Err(HubError::Protocol(format!("unknown command '{}'", other))),
        }
    }
}

/// A decoded agent-to-server message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Agent asks to be known under `requested_id`.
    Registration {
        requested_id: String,
        configuration: Configuration,
    },
    /// Agent reports its own configuration changed.
    Configuration {
        configuration: Configuration,
        payload: Value,
    },
    /// Anything else; the type string is kept verbatim.
    Telemetry { kind: String, payload: Value },
}

impl Inbound {
    /// Decode one frame.
    ///
    /// The frame must be a JSON object with a non-empty string `type`. A
    /// missing `payload` is treated as an empty object.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(frame)?;
        let Value::Object(mut object) = value else {
            return Err(HubError::Protocol("expected a JSON object".into()));
        };

        let kind = match object.remove("type") {
            Some(Value::String(kind)) if !kind.is_empty() => kind,
            _ => return Err(HubError::Protocol("missing message type".into())),
        };
        let payload = object
            .remove("payload")
            .unwrap_or_else(|| Value::Object(Map::new()));

        let message = match kind.as_str() {
            message_type::REGISTRATION => Inbound::Registration {
                requested_id: object
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                configuration: Configuration::from_json(&payload),
            },
            message_type::CONFIGURATION => Inbound::Configuration {
                configuration: Configuration::from_json(&payload),
                payload,
            },
            _ => Inbound::Telemetry { kind, payload },
        };
        Ok(message)
    }

    /// The `type` string this message arrived with.
    pub fn kind(&self) -> &str {
        match self {
            Inbound::Registration { .. } => message_type::REGISTRATION,
            Inbound::Configuration { .. } => message_type::CONFIGURATION,
            Inbound::Telemetry { kind, .. } => kind,
        }
    }
}

/// A server-to-agent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Outbound {
    /// Registration accepted under `id`.
    Confirmation { id: String },
    /// Operator command broadcast.
    Command { command: String },
    /// Operator configuration push.
    Configuration {
        id: String,
        #[serde(rename = "allowSending")]
        allow_sending: bool,
        payload: Configuration,
    },
}

impl Outbound {
    /// Encode as one newline-terminated frame.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut frame = serde_json::to_vec(self)?;
        frame.push(b'\n');
        Ok(frame)
    }
}
