//! Connection manager for the session server.
//!
//! Owns at most one live [`LineClient`], performs the login handshake, and
//! reports inbound lines and state changes on an event channel. Reconnecting
//! after an unexpected disconnect is the caller's decision: it calls
//! [`ConnectionManager::connect`] again and gets a fresh handshake.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use clickerhub_protocol::{Codec, Credentials, Outbound};

use crate::line_client::{ConnError, LineClient};
use crate::reconnection::{LinkContext, cancel_any_connect, connect_with_retry};
use crate::types::{ConnectConfig, ConnectionEvent, ConnectionState};

/// Connection manager for one session-server link.
pub struct ConnectionManager {
    credentials: Credentials,
    codec: Codec,
    ctx: LinkContext,
    client: Mutex<Option<LineClient>>,
    events_rx: Mutex<Option<mpsc::Receiver<ConnectionEvent>>>,
    /// Cancel token of the connect loop in progress.
    connect_cancel: Arc<std::sync::Mutex<Option<CancellationToken>>>,
    address: Mutex<Option<String>>,
    /// Id handed to the next connection.
    next_id: AtomicU64,
}

impl ConnectionManager {
    /// Creates a manager. Credentials are fixed for its whole lifetime.
    pub fn new(credentials: Credentials, codec: Codec, config: ConnectConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            credentials,
            codec,
            ctx: LinkContext {
                config,
                events_tx,
                state_tx: Arc::new(state_tx),
            },
            client: Mutex::new(None),
            events_rx: Mutex::new(Some(events_rx)),
            connect_cancel: Arc::new(std::sync::Mutex::new(None)),
            address: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.events_rx.lock().await.take()
    }

    pub fn state(&self) -> ConnectionState {
        self.ctx.state_tx.borrow().clone()
    }

    /// Subscribes to state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.ctx.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn config(&self) -> &ConnectConfig {
        &self.ctx.config
    }

    /// Id of the live connection, if any.
    ///
    /// A [`ConnectionEvent::Disconnected`] whose id differs belongs to a
    /// connection that has already been replaced.
    pub async fn current_connection(&self) -> Option<u64> {
        self.client.lock().await.as_ref().map(LineClient::id)
    }

    /// Address of the most recent connect call.
    pub async fn address(&self) -> Option<String> {
        self.address.lock().await.clone()
    }

    /// Connects to `address`, sends the login line and then the
    /// announcement of `consumer_keys`.
    ///
    /// Any existing connection is closed first, and a connect already in
    /// progress is cancelled.
    pub async fn connect(&self, address: &str, consumer_keys: &[String]) -> Result<(), ConnError> {
        let cancel = CancellationToken::new();
        cancel_any_connect(&self.connect_cancel);
        if let Ok(mut guard) = self.connect_cancel.lock() {
            *guard = Some(cancel.clone());
        }

        if let Some(old) = self.client.lock().await.take() {
            debug!("closing previous connection");
            old.close();
        }
        *self.address.lock().await = Some(address.to_string());

        let handshake = [
            self.codec.encode(&Outbound::Login(self.credentials.clone())),
            self.codec
                .encode(&Outbound::Capabilities(consumer_keys.to_vec())),
        ];

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let client = connect_with_retry(&self.ctx, address, &handshake, &cancel, id).await?;
        if cancel.is_cancelled() {
            client.close();
            self.ctx.set_state(ConnectionState::Disconnected);
            return Err(ConnError::Cancelled);
        }

        info!(
            address = %address,
            connection = id,
            peer = ?client.peer(),
            consumers = consumer_keys.len(),
            "connected to session server"
        );
        *self.client.lock().await = Some(client);
        Ok(())
    }

    /// Sends one line over the live connection.
    pub async fn send_line(&self, line: impl Into<String>) -> Result<(), ConnError> {
        let client = self.client.lock().await;
        let client = client.as_ref().ok_or(ConnError::Closed)?;
        client.send_line(line.into()).await
    }

    /// Closes the connection on purpose. No
    /// [`ConnectionEvent::Disconnected`] is emitted for it.
    pub async fn close(&self) {
        cancel_any_connect(&self.connect_cancel);
        if let Some(client) = self.client.lock().await.take() {
            client.close();
            debug!("connection closed");
        }
        if self.state() != ConnectionState::Disconnected {
            self.ctx.set_state(ConnectionState::Disconnected);
        }
    }

    /// Shuts down the connection manager.
    pub async fn shutdown(&self) {
        self.close().await;
        info!("connection manager shut down");
    }
}
