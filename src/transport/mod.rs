//! Transport boundary.
//!
//! The transport owns sockets; the hub only ever sees [`TransportEvent`]s and
//! writes through a [`PeerSink`]. Whether a handle is still writable is the
//! transport's call, not the registry's.

mod tcp;

use std::net::SocketAddr;

use crate::session::ConnectionHandle;

pub use tcp::{Connections, TcpTransport};

/// Default upper bound on one inbound frame, in bytes.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Something that happened on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection was accepted.
    Connected {
        handle: ConnectionHandle,
        peer: SocketAddr,
    },
    /// The connection is gone; the handle is no longer writable.
    Closed { handle: ConnectionHandle },
    /// One newline-delimited frame, without the terminator.
    Received {
        handle: ConnectionHandle,
        frame: Vec<u8>,
    },
}

/// Outbound write capability.
pub trait PeerSink: Send + Sync {
    /// Queue `bytes` for `handle`. Returns false if the connection is gone.
    fn send(&self, handle: ConnectionHandle, bytes: Vec<u8>) -> bool;

    /// Whether `handle` still has an open connection.
    fn is_open(&self, handle: ConnectionHandle) -> bool;
}
