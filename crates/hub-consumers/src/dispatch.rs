//! Concurrent fan-out of aggregation results to active consumers.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{trace, warn};

use clickerhub_hub_aggregation::{AggregationResult, GroupAnswers, reduce};
use clickerhub_protocol::{ConsumerKind, QuestionSpec};

use crate::error::DeliveryError;
use crate::registry::ActiveConsumer;

/// Outcome of one delivery, sent when a report channel is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub group: String,
    pub consumer: String,
    pub outcome: Result<(), DeliveryError>,
}

/// Runs each delivery as its own task.
///
/// A slow, failing or panicking consumer only affects its own task; the
/// caller never waits on a delivery.
#[derive(Clone)]
pub struct Dispatcher {
    tracker: TaskTracker,
    timeout: Option<Duration>,
    reports: Option<mpsc::UnboundedSender<DeliveryReport>>,
}

impl Dispatcher {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            tracker: TaskTracker::new(),
            timeout,
            reports: None,
        }
    }

    /// Attaches a channel that receives one report per delivery.
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<DeliveryReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    /// Reduces `answers` once per consumer shape and spawns one delivery per
    /// active instance. Returns the number of deliveries spawned.
    pub fn dispatch(
        &self,
        group: &str,
        consumers: &[ActiveConsumer],
        answers: &GroupAnswers,
        question: &QuestionSpec,
    ) -> usize {
        let mut shapes: BTreeMap<(ConsumerKind, &[String]), Option<AggregationResult>> =
            BTreeMap::new();
        let mut spawned = 0;

        for consumer in consumers {
            if !consumer.instance.is_active() {
                continue;
            }
            let descriptor = &consumer.descriptor;
            let result = shapes
                .entry((descriptor.kind, descriptor.params.as_slice()))
                .or_insert_with(|| reduce(descriptor, answers, question));
            let Some(result) = result.clone() else {
                continue;
            };
            self.spawn_delivery(consumer.clone(), result);
            spawned += 1;
        }

        trace!(group = %group, spawned, "dispatched results");
        spawned
    }

    fn spawn_delivery(&self, consumer: ActiveConsumer, result: AggregationResult) {
        let timeout = self.timeout;
        let reports = self.reports.clone();

        self.tracker.spawn(async move {
            let delivery = AssertUnwindSafe(consumer.instance.receive_answers(result)).catch_unwind();
            let caught = match timeout {
                Some(limit) => tokio::time::timeout(limit, delivery)
                    .await
                    .map_err(|_| DeliveryError::TimedOut(limit)),
                None => Ok(delivery.await),
            };

            let outcome = match caught {
                Ok(Ok(Ok(()))) => Ok(()),
                Ok(Ok(Err(e))) => Err(DeliveryError::Failed(e)),
                Ok(Err(panic)) => Err(DeliveryError::Panicked(panic_message(panic.as_ref()))),
                Err(e) => Err(e),
            };

            if let Err(e) = &outcome {
                warn!(
                    group = %consumer.group,
                    consumer = %consumer.descriptor.key,
                    error = %e,
                    "delivery failed"
                );
            }
            if let Some(tx) = reports {
                let _ = tx.send(DeliveryReport {
                    group: consumer.group.clone(),
                    consumer: consumer.descriptor.key.clone(),
                    outcome,
                });
            }
        });
    }

    /// Waits until every delivery spawned so far has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(None)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
