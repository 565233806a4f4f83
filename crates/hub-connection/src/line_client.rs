//! TCP line client for one session-server connection.
//!
//! Owns the read, write and heartbeat pumps of a single transport. A client
//! is never reused: reconnecting means building a new one.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::SinkExt;
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::codec::LineDecoder;
use crate::reconnection::LinkContext;
use crate::types::{ConnectConfig, ConnectionEvent, ConnectionState, DisconnectReason};

/// Errors from connecting to or talking with the session server.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not resolve {0}")]
    Resolve(String),

    #[error("connect timed out")]
    Timeout,

    #[error("handshake failed: {0}")]
    Handshake(#[from] LinesCodecError),

    #[error("not connected after {attempts} attempt(s): {reason}")]
    NotConnected { attempts: u32, reason: String },

    #[error("connection closed")]
    Closed,

    #[error("connect cancelled")]
    Cancelled,
}

/// Fires the disconnect notification of one connection at most once.
pub(crate) struct DisconnectSignal {
    connection: u64,
    fired: AtomicBool,
    cancel: CancellationToken,
    events_tx: mpsc::Sender<ConnectionEvent>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
}

impl DisconnectSignal {
    pub(crate) fn new(
        connection: u64,
        cancel: CancellationToken,
        events_tx: mpsc::Sender<ConnectionEvent>,
        state_tx: Arc<watch::Sender<ConnectionState>>,
    ) -> Self {
        Self {
            connection,
            fired: AtomicBool::new(false),
            cancel,
            events_tx,
            state_tx,
        }
    }

    /// Tears the connection down and reports `reason`. Returns `false` when
    /// the connection had already ended or was closed on purpose.
    pub(crate) async fn fire(&self, reason: DisconnectReason) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();
        self.state_tx.send_replace(ConnectionState::Disconnected);
        info!(connection = self.connection, ?reason, "connection lost");
        let _ = self
            .events_tx
            .send(ConnectionEvent::Disconnected {
                connection: self.connection,
                reason,
            })
            .await;
        true
    }

    /// Marks the connection as closed on purpose so no event is emitted.
    pub(crate) fn suppress(&self) {
        self.fired.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }
}

/// Resolves `host` and opens a keep-alive TCP stream within the connect
/// timeout.
pub(crate) async fn open_stream(host: &str, config: &ConnectConfig) -> Result<TcpStream, ConnError> {
    let addr: SocketAddr = tokio::net::lookup_host((host, config.login_port))
        .await?
        .next()
        .ok_or_else(|| ConnError::Resolve(host.to_string()))?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_keepalive(true)?;

    debug!(%addr, "opening connection");
    match tokio::time::timeout(config.connect_timeout, socket.connect(addr)).await {
        Ok(stream) => {
            let stream = stream?;
            stream.set_nodelay(true)?;
            Ok(stream)
        }
        Err(_) => Err(ConnError::Timeout),
    }
}

/// A live connection: handshake sent, pumps running.
pub struct LineClient {
    id: u64,
    write_tx: mpsc::Sender<String>,
    signal: Arc<DisconnectSignal>,
    cancel: CancellationToken,
    peer: Option<SocketAddr>,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _heartbeat_handle: tokio::task::JoinHandle<()>,
}

impl LineClient {
    /// Sends `handshake` over `stream`, in order, marks the link connected
    /// and starts the pumps. `id` tags the disconnect event of this link.
    pub(crate) async fn start(
        id: u64,
        stream: TcpStream,
        handshake: &[String],
        ctx: &LinkContext,
    ) -> Result<Self, ConnError> {
        let config = &ctx.config;
        let peer = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();
        let read = FramedRead::new(read_half, LineDecoder::new(config.max_line_length));
        let mut write = FramedWrite::new(write_half, LinesCodec::new());

        for line in handshake {
            write.feed(line.clone()).await?;
        }
        SinkExt::<String>::flush(&mut write).await?;

        ctx.set_state(ConnectionState::Connected);

        let (write_tx, write_rx) = mpsc::channel::<String>(256);
        let cancel = CancellationToken::new();
        let signal = Arc::new(DisconnectSignal::new(
            id,
            cancel.clone(),
            ctx.events_tx.clone(),
            ctx.state_tx.clone(),
        ));
        let awaiting_ack = Arc::new(AtomicBool::new(false));

        let write_handle = tokio::spawn(crate::pumps::write::write_pump(
            write,
            write_rx,
            signal.clone(),
            cancel.clone(),
        ));

        let read_handle = tokio::spawn(crate::pumps::read::read_pump(
            read,
            awaiting_ack.clone(),
            write_tx.clone(),
            ctx.events_tx.clone(),
            signal.clone(),
            cancel.clone(),
        ));

        let heartbeat_handle = tokio::spawn(crate::pumps::heartbeat::heartbeat_pump(
            write_tx.clone(),
            awaiting_ack,
            signal.clone(),
            config.heartbeat_initial_delay,
            config.heartbeat_period,
            cancel.clone(),
        ));

        Ok(Self {
            id,
            write_tx,
            signal,
            cancel,
            peer,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _heartbeat_handle: heartbeat_handle,
        })
    }

    /// Queues one line for sending.
    pub async fn send_line(&self, line: String) -> Result<(), ConnError> {
        if self.cancel.is_cancelled() {
            return Err(ConnError::Closed);
        }
        self.write_tx.send(line).await.map_err(|_| ConnError::Closed)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_alive(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Closes the connection without reporting a disconnect.
    pub fn close(&self) {
        self.signal.suppress();
    }
}

impl Drop for LineClient {
    fn drop(&mut self) {
        self.signal.suppress();
        self._read_handle.abort();
        self._heartbeat_handle.abort();
    }
}
