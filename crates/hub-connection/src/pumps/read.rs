//! Read pump: forwards protocol lines and handles heartbeat sentinels.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use clickerhub_protocol::constants::{HEARTBEAT_ACK, HEARTBEAT_PROBE};

use crate::line_client::DisconnectSignal;
use crate::types::{ConnectionEvent, DisconnectReason};

/// Reads lines until the stream ends, fails, or the connection is cancelled.
///
/// Framing never fails on content (see [`LineDecoder`](crate::codec::LineDecoder)),
/// so an error here is a transport error and ends the link.
///
/// The heartbeat ack clears `awaiting_ack`; a probe from the server is
/// answered with the ack. Every other line, blank ones included, goes out as
/// [`ConnectionEvent::Line`].
pub(crate) async fn read_pump<S>(
    mut read: S,
    awaiting_ack: Arc<AtomicBool>,
    write_tx: mpsc::Sender<String>,
    events_tx: mpsc::Sender<ConnectionEvent>,
    signal: Arc<DisconnectSignal>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<String, io::Error>> + Unpin,
{
    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => return,

            line = read.next() => match line {
                Some(Ok(line)) => match line.trim() {
                    HEARTBEAT_ACK => {
                        trace!("heartbeat ack");
                        awaiting_ack.store(false, Ordering::SeqCst);
                    }
                    HEARTBEAT_PROBE => {
                        trace!("server probe, answering");
                        let _ = write_tx.send(HEARTBEAT_ACK.to_string()).await;
                    }
                    _ => {
                        trace!(%line, "received line");
                        if events_tx.send(ConnectionEvent::Line(line)).await.is_err() {
                            debug!("event receiver dropped, stopping read pump");
                            return;
                        }
                    }
                },
                Some(Err(e)) => {
                    warn!(error = %e, "read error");
                    break DisconnectReason::ReadError;
                }
                None => {
                    debug!("server closed the stream");
                    break DisconnectReason::EndOfStream;
                }
            },
        }
    };

    signal.fire(reason).await;
}
