//! Public types for the session-server connection.

use std::time::Duration;

use clickerhub_protocol::constants::{
    CONNECT_RETRY_BACKOFF, CONNECT_TIMEOUT, HEARTBEAT_INITIAL_DELAY, HEARTBEAT_PERIOD, LOGIN_PORT,
    MAX_CONNECT_ATTEMPTS, MAX_LINE_LENGTH,
};

/// Connection state of the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live transport.
    Disconnected,
    /// A connect attempt is in progress.
    Connecting { attempt: u32 },
    /// Handshake sent, pumps running.
    Connected,
}

/// Why a live connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the stream.
    EndOfStream,
    /// Reading from the socket failed.
    ReadError,
    /// Writing to the socket failed.
    WriteError,
    /// A liveness probe went unanswered for a full period.
    HeartbeatTimeout,
}

/// Events emitted by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The manager moved to a new state.
    StateChanged(ConnectionState),
    /// A connect attempt is starting.
    Connecting { attempt: u32, max_attempts: u32 },
    /// A protocol line arrived. Heartbeat sentinels are handled internally
    /// and never show up here.
    Line(String),
    /// The live connection ended unexpectedly. Emitted once per connection;
    /// an explicit close never produces it.
    Disconnected {
        /// Id of the connection that ended, see [`LineClient::id`](crate::LineClient::id).
        connection: u64,
        reason: DisconnectReason,
    },
}

/// Transport and liveness settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectConfig {
    pub login_port: u16,
    /// Timeout of a single TCP connect attempt.
    pub connect_timeout: Duration,
    /// Attempts per connect call, including the first.
    pub max_attempts: u32,
    /// Pause between failed attempts.
    pub retry_backoff: Duration,
    pub heartbeat_period: Duration,
    pub heartbeat_initial_delay: Duration,
    /// Longest inbound line accepted, in bytes.
    pub max_line_length: usize,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            login_port: LOGIN_PORT,
            connect_timeout: CONNECT_TIMEOUT,
            max_attempts: MAX_CONNECT_ATTEMPTS,
            retry_backoff: CONNECT_RETRY_BACKOFF,
            heartbeat_period: HEARTBEAT_PERIOD,
            heartbeat_initial_delay: HEARTBEAT_INITIAL_DELAY,
            max_line_length: MAX_LINE_LENGTH,
        }
    }
}
