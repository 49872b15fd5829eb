//! Line-oriented operator console and the default event reporter.
//!
//! ```text
//! start | stop            broadcast a command to every sending agent
//! send <id> on|off        allow or forbid an agent to send telemetry
//! purge                   drop disconnected sessions
//! clear                   forget every session
//! status                  list sessions
//! help | quit
//! ```

use std::str::FromStr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::event::{HubEvent, ServerStatus};
use crate::hub::HubHandle;
use crate::protocol::AgentCommand;
use crate::Result;

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Broadcast(AgentCommand),
    Send { identifier: String, enabled: bool },
    Purge,
    Clear,
    Status,
    Help,
    Quit,
}

/// Console parse errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("unknown command: '{0}' (try 'help')")]
    UnknownCommand(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid value for {0}: '{1}'")]
    InvalidValue(&'static str, String),
}

impl FromStr for ConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(ConsoleError::MissingArgument("command"));
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "start" => ConsoleCommand::Broadcast(AgentCommand::Start),
            "stop" => ConsoleCommand::Broadcast(AgentCommand::Stop),
            "send" => {
                let identifier = words.next().ok_or(ConsoleError::MissingArgument("id"))?;
                let toggle = words
                    .next()
                    .ok_or(ConsoleError::MissingArgument("on|off"))?;
                let enabled = match toggle.to_ascii_lowercase().as_str() {
                    "on" | "true" | "yes" => true,
                    "off" | "false" | "no" => false,
                    _ => return Err(ConsoleError::InvalidValue("on|off", toggle.to_string())),
                };
                ConsoleCommand::Send {
                    identifier: identifier.to_string(),
                    enabled,
                }
            }
            "purge" => ConsoleCommand::Purge,
            "clear" => ConsoleCommand::Clear,
            "status" | "ls" => ConsoleCommand::Status,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(ConsoleError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

/// Apply one command. Returns `false` when the console should exit.
pub async fn execute(hub: &HubHandle, command: ConsoleCommand) -> Result<bool> {
    match command {
        ConsoleCommand::Broadcast(command) => hub.broadcast(command.as_str())?,
        ConsoleCommand::Send {
            identifier,
            enabled,
        } => hub.set_send_enabled(identifier, enabled, None)?,
        ConsoleCommand::Purge => hub.purge_disconnected()?,
        ConsoleCommand::Clear => hub.clear()?,
        ConsoleCommand::Status => {
            let sessions = hub.sessions().await?;
            if sessions.is_empty() {
                println!("no sessions");
            }
            for s in sessions {
                println!(
                    "{:<24} {:<13} send={:<5} {}:{} since {}",
                    s.identifier,
                    s.status.to_string(),
                    s.send_enabled,
                    s.peer_address,
                    s.peer_port,
                    s.connected_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        ConsoleCommand::Help => print_help(),
        ConsoleCommand::Quit => return Ok(false),
    }
    Ok(true)
}

/// Read commands from `input` until EOF, `quit`, or the hub goes away.
pub async fn run<R>(hub: HubHandle, input: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<ConsoleCommand>() {
            Ok(command) => {
                if !execute(&hub, command).await? {
                    break;
                }
            }
            Err(e) => eprintln!("{}", e),
        }
    }
    debug!("Console closed");
    Ok(())
}

fn print_help() {
    println!(
        r#"COMMANDS:
    start               Broadcast 'start' to every agent allowed to send
    stop                Broadcast 'stop' to every agent allowed to send
    send <id> on|off    Allow or forbid an agent to send telemetry
    purge               Remove disconnected sessions
    clear               Remove every session
    status              List sessions
    help                Print this help
    quit                Stop the server and exit"#
    );
}

/// Log every published event until the channel closes.
pub async fn report(mut events: mpsc::UnboundedReceiver<HubEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            HubEvent::SessionChanges(batch) => {
                for s in batch {
                    info!(
                        "Session {} [{}] {} send={}",
                        s.identifier, s.handle, s.status, s.send_enabled
                    );
                }
            }
            HubEvent::Telemetry(batch) => {
                for record in &batch {
                    debug!(
                        "{} {} from {}: {}",
                        record.timestamp.format("%H:%M:%S%.3f"),
                        record.kind,
                        record.identifier,
                        record.payload
                    );
                }
                info!("Received {} telemetry records", batch.len());
            }
            HubEvent::Status(ServerStatus::Error(reason)) => warn!("Server error: {}", reason),
            HubEvent::Status(status) => info!("Server {:?}", status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Control;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            "start".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Broadcast(AgentCommand::Start)
        );
        assert_eq!(
            "  STOP ".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Broadcast(AgentCommand::Stop)
        );
        assert_eq!(
            "send agentA off".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Send {
                identifier: "agentA".into(),
                enabled: false
            }
        );
        assert_eq!("purge".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Purge));
        assert_eq!("status".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Status));
        assert_eq!("exit".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "reboot".parse::<ConsoleCommand>(),
            Err(ConsoleError::UnknownCommand("reboot".into()))
        );
        assert_eq!(
            "send".parse::<ConsoleCommand>(),
            Err(ConsoleError::MissingArgument("id"))
        );
        assert_eq!(
            "send agentA maybe".parse::<ConsoleCommand>(),
            Err(ConsoleError::InvalidValue("on|off", "maybe".into()))
        );
    }

    #[tokio::test]
    async fn test_run_forwards_to_hub() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let hub = HubHandle::new(tx);
        let input: &[u8] = b"start\nbogus\n\nsend agentA on\npurge\nquit\nclear\n";

        run(hub, input).await.unwrap();

        assert!(matches!(rx.recv().await, Some(Control::Broadcast(c)) if c == "start"));
        assert!(matches!(
            rx.recv().await,
            Some(Control::SetSendEnabled { ref identifier, enabled: true, configuration: None })
                if identifier == "agentA"
        ));
        assert!(matches!(rx.recv().await, Some(Control::PurgeDisconnected)));
        // quit stops before clear; the handle is gone so the channel ends
        assert!(rx.recv().await.is_none());
    }
}
