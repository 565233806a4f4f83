//! Consumer plugin registry and result distribution.
//!
//! Consumers are registered as factories. An Open instantiates the ones it
//! names for its group; every answer then reaches each live instance through
//! the [`Dispatcher`].

pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use consumer::{ActiveFlag, Consumer, ConsumerFactory, DeliveryFuture, FnFactory};
pub use dispatch::{DeliveryReport, Dispatcher};
pub use error::{ConsumerError, DeliveryError, RegistryError};
pub use registry::{ActiveConsumer, ConsumerRegistry};
