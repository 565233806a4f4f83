//! Write pump: serialises outbound lines.

use std::sync::Arc;

use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio_util::codec::LinesCodecError;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

use crate::line_client::DisconnectSignal;
use crate::types::DisconnectReason;

/// Writes queued lines to the socket until cancelled.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<String>,
    signal: Arc<DisconnectSignal>,
    cancel: CancellationToken,
) where
    S: Sink<String, Error = LinesCodecError> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = write_rx.recv() => {
                match line {
                    Some(line) => {
                        trace!(%line, "sending line");
                        if let Err(e) = write.send(line).await {
                            error!("write error: {e}");
                            signal.fire(DisconnectReason::WriteError).await;
                            return;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let _ = write.close().await;
}
