//! Heartbeat pump: periodic liveness probes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use clickerhub_protocol::constants::HEARTBEAT_PROBE;

use crate::line_client::DisconnectSignal;
use crate::types::DisconnectReason;

/// Sends a probe every `period` after `initial_delay`.
///
/// `awaiting_ack` is the Idle/AwaitingAck state shared with the read pump.
/// A tick that finds the previous probe still unanswered tears the
/// connection down with [`DisconnectReason::HeartbeatTimeout`].
pub(crate) async fn heartbeat_pump(
    write_tx: mpsc::Sender<String>,
    awaiting_ack: Arc<AtomicBool>,
    signal: Arc<DisconnectSignal>,
    initial_delay: Duration,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + initial_delay, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if awaiting_ack.load(Ordering::SeqCst) {
                    warn!("heartbeat ack not received, closing connection");
                    signal.fire(DisconnectReason::HeartbeatTimeout).await;
                    break;
                }
                awaiting_ack.store(true, Ordering::SeqCst);
                trace!("sending heartbeat probe");
                if write_tx.send(HEARTBEAT_PROBE.to_string()).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConnectionEvent, ConnectionState};
    use tokio::sync::watch;

    const DELAY: Duration = Duration::from_secs(15);
    const PERIOD: Duration = Duration::from_secs(15);

    struct Harness {
        write_rx: mpsc::Receiver<String>,
        events_rx: mpsc::Receiver<ConnectionEvent>,
        awaiting_ack: Arc<AtomicBool>,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<()>,
    }

    fn spawn() -> Harness {
        let (write_tx, write_rx) = mpsc::channel(16);
        let (events_tx, events_rx) = mpsc::channel(16);
        let (state_tx, _) = watch::channel(ConnectionState::Connected);
        let cancel = CancellationToken::new();
        let awaiting_ack = Arc::new(AtomicBool::new(false));
        let signal = Arc::new(DisconnectSignal::new(
            1,
            cancel.clone(),
            events_tx,
            Arc::new(state_tx),
        ));
        let handle = tokio::spawn(heartbeat_pump(
            write_tx,
            awaiting_ack.clone(),
            signal,
            DELAY,
            PERIOD,
            cancel.clone(),
        ));
        Harness {
            write_rx,
            events_rx,
            awaiting_ack,
            cancel,
            handle,
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_probe_waits_for_initial_delay() {
        let mut h = spawn();
        settle().await;

        tokio::time::advance(DELAY - Duration::from_secs(1)).await;
        settle().await;
        assert!(h.write_rx.try_recv().is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(h.write_rx.try_recv().unwrap(), "AreYouStillThere");
        assert!(h.awaiting_ack.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn acked_probes_keep_connection_alive() {
        let mut h = spawn();
        settle().await;

        for _ in 0..3 {
            tokio::time::advance(PERIOD).await;
            settle().await;
            assert_eq!(h.write_rx.try_recv().unwrap(), "AreYouStillThere");
            h.awaiting_ack.store(false, Ordering::SeqCst);
        }
        assert!(h.events_rx.try_recv().is_err());
        assert!(!h.cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_probe_times_out_on_next_tick() {
        let mut h = spawn();
        settle().await;

        tokio::time::advance(DELAY).await;
        settle().await;
        assert_eq!(h.write_rx.try_recv().unwrap(), "AreYouStillThere");

        tokio::time::advance(PERIOD).await;
        settle().await;
        assert!(h.write_rx.try_recv().is_err(), "no second probe in flight");
        assert_eq!(
            h.events_rx.try_recv().unwrap(),
            ConnectionEvent::Disconnected {
                connection: 1,
                reason: DisconnectReason::HeartbeatTimeout
            }
        );
        assert!(h.cancel.is_cancelled());
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_pump() {
        let h = spawn();
        h.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), h.handle)
            .await
            .expect("should stop")
            .expect("no panic");
    }
}
