//! Bounded connect/retry loop.
//!
//! Contains the shared [`LinkContext`], the connect-cancel helpers and the
//! retry loop used for both the first connect and every reconnect.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::line_client::{ConnError, LineClient, open_stream};
use crate::types::{ConnectConfig, ConnectionEvent, ConnectionState};

/// Shared state the retry loop needs from the manager.
#[derive(Clone)]
pub(crate) struct LinkContext {
    pub(crate) config: ConnectConfig,
    pub(crate) events_tx: mpsc::Sender<ConnectionEvent>,
    pub(crate) state_tx: Arc<watch::Sender<ConnectionState>>,
}

impl LinkContext {
    /// Updates the watched state and reports it. Never blocks on a full
    /// event channel.
    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state.clone());
        if let Err(e) = self.events_tx.try_send(ConnectionEvent::StateChanged(state)) {
            debug!("state event not delivered: {e}");
        }
    }
}

/// Cancels the connect loop in progress, if any.
pub(crate) fn cancel_any_connect(connect_cancel: &std::sync::Mutex<Option<CancellationToken>>) {
    if let Ok(mut guard) = connect_cancel.lock()
        && let Some(token) = guard.take()
    {
        token.cancel();
    }
}

/// Connects to `host` and sends `handshake`, retrying up to
/// `config.max_attempts` times with a fixed pause in between. The resulting
/// client is tagged with `connection`.
///
/// Exhausting the attempts leaves the state `Disconnected` and returns
/// [`ConnError::NotConnected`].
pub(crate) async fn connect_with_retry(
    ctx: &LinkContext,
    host: &str,
    handshake: &[String],
    cancel: &CancellationToken,
    connection: u64,
) -> Result<LineClient, ConnError> {
    let max_attempts = ctx.config.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        ctx.set_state(ConnectionState::Connecting { attempt });
        let _ = ctx.events_tx.try_send(ConnectionEvent::Connecting {
            attempt,
            max_attempts,
        });
        info!(host = %host, port = ctx.config.login_port, attempt, max_attempts, "connecting");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ConnError::Cancelled),
            r = connect_once(ctx, host, handshake, connection) => r,
        };

        match result {
            Ok(client) => return Ok(client),
            Err(ConnError::Cancelled) => {
                debug!(host = %host, "connect cancelled");
                ctx.set_state(ConnectionState::Disconnected);
                return Err(ConnError::Cancelled);
            }
            Err(e) => {
                warn!(host = %host, attempt, error = %e, "connect attempt failed");
                last_error = Some(e);
            }
        }

        if attempt < max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => {
                    ctx.set_state(ConnectionState::Disconnected);
                    return Err(ConnError::Cancelled);
                }
                _ = tokio::time::sleep(ctx.config.retry_backoff) => {}
            }
        }
    }

    ctx.set_state(ConnectionState::Disconnected);
    Err(ConnError::NotConnected {
        attempts: max_attempts,
        reason: last_error.map(|e| e.to_string()).unwrap_or_default(),
    })
}

async fn connect_once(
    ctx: &LinkContext,
    host: &str,
    handshake: &[String],
    connection: u64,
) -> Result<LineClient, ConnError> {
    let stream = open_stream(host, &ctx.config).await?;
    LineClient::start(connection, stream, handshake, ctx).await
}
