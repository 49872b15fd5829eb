//! TCP transport: accept loop plus one reader and one writer task per connection.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use super::{PeerSink, TransportEvent, MAX_FRAME_LEN};
use crate::session::ConnectionHandle;
use crate::Result;

/// Outbound queues of all open connections.
#[derive(Debug, Default)]
pub struct Connections {
    writers: RwLock<HashMap<ConnectionHandle, mpsc::UnboundedSender<Vec<u8>>>>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, handle: ConnectionHandle, tx: mpsc::UnboundedSender<Vec<u8>>) {
        if let Ok(mut writers) = self.writers.write() {
            writers.insert(handle, tx);
        }
    }

    fn remove(&self, handle: ConnectionHandle) {
        if let Ok(mut writers) = self.writers.write() {
            writers.remove(&handle);
        }
    }

    /// Number of open connections.
    pub fn count(&self) -> usize {
        self.writers.read().map(|w| w.len()).unwrap_or(0)
    }
}

impl PeerSink for Connections {
    fn send(&self, handle: ConnectionHandle, bytes: Vec<u8>) -> bool {
        self.writers
            .read()
            .ok()
            .and_then(|writers| writers.get(&handle).map(|tx| tx.send(bytes).is_ok()))
            .unwrap_or(false)
    }

    fn is_open(&self, handle: ConnectionHandle) -> bool {
        self.writers
            .read()
            .map(|writers| writers.get(&handle).is_some_and(|tx| !tx.is_closed()))
            .unwrap_or(false)
    }
}

/// Listening TCP socket feeding [`TransportEvent`]s to the hub.
pub struct TcpTransport {
    listener: TcpListener,
    connections: Arc<Connections>,
    events: mpsc::UnboundedSender<TransportEvent>,
    shutdown: watch::Receiver<bool>,
    max_frame_len: usize,
}

impl TcpTransport {
    /// Bind the listening socket.
    pub async fn bind(
        addr: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            connections: Arc::new(Connections::new()),
            events,
            shutdown,
            max_frame_len: MAX_FRAME_LEN,
        })
    }

    /// Longest frame accepted from a peer, terminator excluded. Longer
    /// frames are skipped up to the next newline.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Write side shared with the hub.
    pub fn connections(&self) -> Arc<Connections> {
        Arc::clone(&self.connections)
    }

    /// Accept connections until shutdown.
    pub async fn run(self) {
        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handle = ConnectionHandle::next();
                        info!("New connection {} from {}", handle, peer);
                        tokio::spawn(serve_connection(
                            stream,
                            peer,
                            handle,
                            Arc::clone(&self.connections),
                            self.events.clone(),
                            self.shutdown.clone(),
                            self.max_frame_len,
                        ));
                    }
                    Err(e) => error!("Accept failed: {}", e),
                },
                _ = shutdown.changed() => {
                    debug!("Accept loop stopped");
                    break;
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handle: ConnectionHandle,
    connections: Arc<Connections>,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut shutdown: watch::Receiver<bool>,
    max_frame_len: usize,
) {
    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    connections.insert(handle, tx);

    if events.send(TransportEvent::Connected { handle, peer }).is_err() {
        connections.remove(handle);
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            trace!("{}: writing {} bytes", handle, bytes.len());
            if let Err(e) = write_half.write_all(&bytes).await {
                debug!("{}: write failed: {}", handle, e);
                break;
            }
        }
    });

    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();
    loop {
        tokio::select! {
            read = read_frame(&mut reader, &mut buf, max_frame_len) => match read {
                Ok(Frame::Eof) => {
                    debug!("{}: EOF", handle);
                    break;
                }
                Ok(Frame::Oversized(len)) => {
                    warn!(
                        "{}: dropped {} byte frame (limit {})",
                        handle, len, max_frame_len
                    );
                }
                Ok(Frame::Line) => {
                    let frame = trim_frame(&buf);
                    if frame.is_empty() {
                        continue;
                    }
                    trace!("{}: read {} bytes", handle, frame.len());
                    let event = TransportEvent::Received {
                        handle,
                        frame: frame.to_vec(),
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("{}: read failed: {}", handle, e);
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }

    connections.remove(handle);
    writer.abort();
    let _ = events.send(TransportEvent::Closed { handle });
    info!("Connection {} ({}) closed", handle, peer);
}

#[derive(Debug, PartialEq, Eq)]
enum Frame {
    /// `buf` holds one frame, without its `\n`.
    Line,
    /// A frame longer than the limit was skipped; carries its length.
    Oversized(usize),
    Eof,
}

/// Read one `\n`-terminated frame into `buf`, holding at most `limit` bytes.
///
/// An oversized frame is consumed and discarded so the stream stays in sync.
/// Trailing bytes without a terminator at EOF count as a frame.
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut skipped: Option<usize> = None;

    loop {
        let (used, terminated) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(match skipped {
                    Some(len) => Frame::Oversized(len),
                    None if buf.is_empty() => Frame::Eof,
                    None => Frame::Line,
                });
            }

            let newline = available.iter().position(|&b| b == b'\n');
            let content = &available[..newline.unwrap_or(available.len())];

            match skipped {
                Some(len) => skipped = Some(len + content.len()),
                None if buf.len() + content.len() > limit => {
                    skipped = Some(buf.len() + content.len());
                    buf.clear();
                }
                None => buf.extend_from_slice(content),
            }

            match newline {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            }
        };
        reader.consume(used);

        if terminated {
            return Ok(match skipped {
                Some(len) => Frame::Oversized(len),
                None => Frame::Line,
            });
        }
    }
}

fn trim_frame(buf: &[u8]) -> &[u8] {
    let mut end = buf.len();
    while end > 0 && matches!(buf[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &buf[..end]
}
