//! Sample consumers that write every result to the log.

use clickerhub_hub_aggregation::AggregationResult;
use clickerhub_hub_consumers::{
    ActiveFlag, Consumer, ConsumerRegistry, DeliveryFuture, FnFactory, RegistryError,
};
use clickerhub_protocol::{ConsumerDescriptor, ConsumerKind, QuestionSpec};

pub const ECHO: &str = "Echo";
pub const TALLY: &str = "Tally";
pub const AVG: &str = "Avg";

/// Logs each result it receives under its group and question.
pub struct LogConsumer {
    descriptor: ConsumerDescriptor,
    group: String,
    question: String,
    active: ActiveFlag,
}

impl LogConsumer {
    pub fn new(descriptor: ConsumerDescriptor) -> Self {
        Self {
            descriptor,
            group: String::new(),
            question: String::new(),
            active: ActiveFlag::default(),
        }
    }
}

impl Consumer for LogConsumer {
    fn descriptor(&self) -> &ConsumerDescriptor {
        &self.descriptor
    }

    fn set_group_identity(&mut self, group: &str) {
        self.group = group.to_string();
    }

    fn set_question_context(&mut self, question: &QuestionSpec) {
        self.question = question.id.clone();
    }

    fn set_active_status(&self, active: bool) {
        self.active.set(active);
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }

    fn receive_answers(&self, result: AggregationResult) -> DeliveryFuture<'_> {
        Box::pin(async move {
            let consumer = self.descriptor.key.as_str();
            match &result {
                AggregationResult::All {
                    participant,
                    answers,
                } => tracing::info!(
                    consumer,
                    group = %self.group,
                    question = %self.question,
                    participant = %participant,
                    ?answers,
                    "answer"
                ),
                AggregationResult::Count(counts) => tracing::info!(
                    consumer,
                    group = %self.group,
                    question = %self.question,
                    ?counts,
                    "tally"
                ),
                AggregationResult::Average(means) => tracing::info!(
                    consumer,
                    group = %self.group,
                    question = %self.question,
                    ?means,
                    "average"
                ),
            }
            Ok(())
        })
    }
}

/// Registers the `Echo`, `Tally` and `Avg` sample consumers.
pub async fn register_samples(registry: &ConsumerRegistry) -> Result<(), RegistryError> {
    for (key, kind) in [
        (ECHO, ConsumerKind::All),
        (TALLY, ConsumerKind::Count),
        (AVG, ConsumerKind::Average),
    ] {
        registry
            .register(FnFactory::new(
                ConsumerDescriptor::new(key, kind),
                |d: &ConsumerDescriptor| -> Box<dyn Consumer> {
                    Box::new(LogConsumer::new(d.clone()))
                },
            ))
            .await?;
    }
    Ok(())
}
