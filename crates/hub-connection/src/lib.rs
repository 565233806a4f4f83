//! Session-server connection for the hub.
//!
//! Provides the TCP line client with its login handshake, bounded connect
//! retry, and the heartbeat monitor.

pub(crate) mod codec;
pub(crate) mod line_client;
pub mod manager;
pub(crate) mod reconnection;
pub mod types;

pub(crate) mod pumps {
    pub(crate) mod heartbeat;
    pub(crate) mod read;
    pub(crate) mod write;
}

pub use line_client::{ConnError, LineClient};
pub use manager::ConnectionManager;
pub use types::{ConnectConfig, ConnectionEvent, ConnectionState, DisconnectReason};
