use std::time::Duration;

/// Errors returned by registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("consumer not found: {0}")]
    ConsumerNotFound(String),

    #[error("consumer key already registered: {0}")]
    DuplicateKey(String),
}

/// Error a consumer reports from `receive_answers`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ConsumerError(pub String);

impl ConsumerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Why a single delivery did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("consumer failed: {0}")]
    Failed(#[from] ConsumerError),

    #[error("consumer panicked: {0}")]
    Panicked(String),

    #[error("delivery timed out after {0:?}")]
    TimedOut(Duration),
}
