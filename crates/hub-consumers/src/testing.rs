//! Recording consumers shared by this crate's tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use clickerhub_hub_aggregation::AggregationResult;
use clickerhub_protocol::{ConsumerDescriptor, ConsumerKind, QuestionSpec};

use crate::consumer::{ActiveFlag, Consumer, DeliveryFuture, FnFactory};
use crate::error::ConsumerError;

#[derive(Debug, Clone, Copy, Default)]
pub enum Behavior {
    #[default]
    Ok,
    Fail,
    Panic,
    Sleep(Duration),
}

#[derive(Clone, Default)]
pub struct Recorder {
    groups: Arc<Mutex<Vec<String>>>,
    deliveries: Arc<Mutex<Vec<(String, String, AggregationResult)>>>,
}

impl Recorder {
    pub fn groups(&self) -> Vec<String> {
        self.groups.lock().unwrap().clone()
    }

    /// `(group, consumer key, result)` per completed delivery.
    pub fn deliveries(&self) -> Vec<(String, String, AggregationResult)> {
        self.deliveries.lock().unwrap().clone()
    }
}

pub struct RecordingConsumer {
    descriptor: ConsumerDescriptor,
    group: String,
    active: ActiveFlag,
    recorder: Recorder,
    behavior: Behavior,
}

impl Consumer for RecordingConsumer {
    fn descriptor(&self) -> &ConsumerDescriptor {
        &self.descriptor
    }

    fn set_group_identity(&mut self, group: &str) {
        self.group = group.to_string();
        self.recorder.groups.lock().unwrap().push(group.to_string());
    }

    fn set_question_context(&mut self, _question: &QuestionSpec) {}

    fn set_active_status(&self, active: bool) {
        self.active.set(active);
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }

    fn receive_answers(&self, result: AggregationResult) -> DeliveryFuture<'_> {
        Box::pin(async move {
            match self.behavior {
                Behavior::Ok => {}
                Behavior::Fail => return Err(ConsumerError::new("sink refused")),
                Behavior::Panic => panic!("consumer blew up"),
                Behavior::Sleep(d) => tokio::time::sleep(d).await,
            }
            self.recorder.deliveries.lock().unwrap().push((
                self.group.clone(),
                self.descriptor.key.clone(),
                result,
            ));
            Ok(())
        })
    }
}

pub fn recording_factory(
    key: &str,
    kind: ConsumerKind,
    recorder: &Recorder,
) -> FnFactory<impl Fn(&ConsumerDescriptor) -> Box<dyn Consumer> + Send + Sync + 'static> {
    behaving_factory(ConsumerDescriptor::new(key, kind), recorder, Behavior::Ok)
}

pub fn behaving_factory(
    descriptor: ConsumerDescriptor,
    recorder: &Recorder,
    behavior: Behavior,
) -> FnFactory<impl Fn(&ConsumerDescriptor) -> Box<dyn Consumer> + Send + Sync + 'static> {
    let recorder = recorder.clone();
    FnFactory::new(descriptor, move |d: &ConsumerDescriptor| -> Box<dyn Consumer> {
        Box::new(RecordingConsumer {
            descriptor: d.clone(),
            group: String::new(),
            active: ActiveFlag::default(),
            recorder: recorder.clone(),
            behavior,
        })
    })
}
