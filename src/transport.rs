//! Transport seam and the reconnecting connection runner.
//!
//! The endpoint never touches sockets: it consumes a queue of outbound
//! frames and produces calls into its `on_*` handlers. The runner here
//! bridges the two over any [`Connector`], retrying forever with a fixed
//! short delay and no backoff. Requests in flight across a reconnect are
//! abandoned; frames queued for a dead connection are drained and dropped.

use std::io;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam::channel::Receiver;
use thiserror::Error;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::endpoint::ServiceEndpoint;

/// Delay before every connect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// How long one poll blocks before giving the outbound queue a turn.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// One outbound payload, already encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireFrame {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("websocket error: {0}")]
    Ws(#[from] tungstenite::Error),
}

#[derive(Debug)]
pub enum TransportEvent {
    Text(String),
    Binary(Vec<u8>),
    Closed,
}

pub trait Connection {
    fn send(&mut self, frame: WireFrame) -> Result<(), TransportError>;

    /// Waits up to `timeout` for the next inbound event; `None` on timeout.
    fn poll(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, TransportError>;
}

pub trait Connector {
    type Conn: Connection;

    fn connect(&self) -> Result<Self::Conn, TransportError>;
}

/// Drives `endpoint` over connections dialed from `connector`, forever.
/// `shutdown` is the only way out; the original contract is an unbounded
/// retry loop.
pub fn run<C: Connector>(
    connector: &C,
    endpoint: &ServiceEndpoint,
    outbound: &Receiver<WireFrame>,
    shutdown: &AtomicBool,
) {
    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(RECONNECT_DELAY);

        let conn = match connector.connect() {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!("connect failed, retrying: {err}");
                continue;
            }
        };

        // Frames addressed to the previous connection are stale; a closed
        // transport discards late worker responses rather than crashing.
        drain_stale(outbound);

        endpoint.on_open();
        match drive(conn, endpoint, outbound, shutdown) {
            Ok(()) => endpoint.on_close(),
            Err(err) => endpoint.on_error(&err),
        }
    }
}

/// Runs one established connection until it closes or errors.
fn drive<C: Connection>(
    mut conn: C,
    endpoint: &ServiceEndpoint,
    outbound: &Receiver<WireFrame>,
    shutdown: &AtomicBool,
) -> Result<(), TransportError> {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return Ok(());
        }

        while let Ok(frame) = outbound.try_recv() {
            conn.send(frame)?;
        }

        match conn.poll(POLL_INTERVAL)? {
            Some(TransportEvent::Text(text)) => endpoint.on_message(&text),
            Some(TransportEvent::Binary(bytes)) => {
                tracing::debug!(len = bytes.len(), "ignoring inbound binary frame");
            }
            Some(TransportEvent::Closed) => return Ok(()),
            None => {}
        }
    }
}

fn drain_stale(outbound: &Receiver<WireFrame>) {
    let mut dropped = 0usize;
    while outbound.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        tracing::debug!(dropped, "discarded frames queued for a dead connection");
    }
}

/// Blocking WebSocket client transport.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Connector for WsConnector {
    type Conn = WsConnection;

    fn connect(&self) -> Result<WsConnection, TransportError> {
        let (socket, _response) = tungstenite::connect(self.url.as_str())?;
        Ok(WsConnection { socket })
    }
}

pub struct WsConnection {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
}

impl Connection for WsConnection {
    fn send(&mut self, frame: WireFrame) -> Result<(), TransportError> {
        let message = match frame {
            WireFrame::Text(text) => Message::text(text),
            WireFrame::Binary(bytes) => Message::binary(bytes),
        };
        self.socket.send(message)?;
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, TransportError> {
        // tungstenite has no timed read; a read timeout on the underlying
        // stream turns the blocking read into a poll.
        if let MaybeTlsStream::Plain(stream) = self.socket.get_mut() {
            stream.set_read_timeout(Some(timeout))?;
        }

        match self.socket.read() {
            Ok(Message::Text(text)) => Ok(Some(TransportEvent::Text(text.to_string()))),
            Ok(Message::Binary(bytes)) => Ok(Some(TransportEvent::Binary(bytes.to_vec()))),
            Ok(Message::Close(_)) => Ok(Some(TransportEvent::Closed)),
            Ok(_) => Ok(None),
            Err(tungstenite::Error::Io(err))
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(Some(TransportEvent::Closed))
            }
            Err(err) => Err(err.into()),
        }
    }
}
