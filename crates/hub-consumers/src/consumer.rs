//! Plugin traits for result consumers.
//!
//! A consumer type is registered once through a [`ConsumerFactory`]. Every
//! time an Open names its key, the factory builds a fresh [`Consumer`]
//! instance bound to that group; the instance lives until the group closes
//! or is replaced.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use clickerhub_hub_aggregation::AggregationResult;
use clickerhub_protocol::{ConsumerDescriptor, QuestionSpec};

use crate::error::ConsumerError;

/// A boxed future returned by [`Consumer::receive_answers`].
pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ConsumerError>> + Send + 'a>>;

/// One consumer instance bound to a group.
///
/// The identity and question setters run once, before the instance is
/// shared. After that the registry only holds it behind an `Arc`, so the
/// active flag needs interior mutability ([`ActiveFlag`] covers the common
/// case).
pub trait Consumer: Send + Sync + 'static {
    fn descriptor(&self) -> &ConsumerDescriptor;

    fn set_group_identity(&mut self, group: &str);

    /// Receives the parsed question of the Open that created this instance.
    fn set_question_context(&mut self, question: &QuestionSpec);

    fn set_active_status(&self, active: bool);

    fn is_active(&self) -> bool;

    /// Called with a fresh reduction every time the group receives an answer.
    fn receive_answers(&self, result: AggregationResult) -> DeliveryFuture<'_>;
}

/// Builds consumer instances of one registered type.
pub trait ConsumerFactory: Send + Sync + 'static {
    fn descriptor(&self) -> &ConsumerDescriptor;

    fn create(&self) -> Box<dyn Consumer>;
}

/// [`ConsumerFactory`] backed by a closure.
pub struct FnFactory<F> {
    descriptor: ConsumerDescriptor,
    build: F,
}

impl<F> FnFactory<F>
where
    F: Fn(&ConsumerDescriptor) -> Box<dyn Consumer> + Send + Sync + 'static,
{
    pub fn new(descriptor: ConsumerDescriptor, build: F) -> Self {
        Self { descriptor, build }
    }
}

impl<F> ConsumerFactory for FnFactory<F>
where
    F: Fn(&ConsumerDescriptor) -> Box<dyn Consumer> + Send + Sync + 'static,
{
    fn descriptor(&self) -> &ConsumerDescriptor {
        &self.descriptor
    }

    fn create(&self) -> Box<dyn Consumer> {
        (self.build)(&self.descriptor)
    }
}

/// Shared active/inactive flag for consumer implementations.
#[derive(Debug, Default)]
pub struct ActiveFlag(AtomicBool);

impl ActiveFlag {
    pub fn set(&self, active: bool) {
        self.0.store(active, Ordering::SeqCst);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
