use clickerhub_hub_connection::ConnError;
use clickerhub_hub_consumers::RegistryError;

/// Errors surfaced by the hub to its operator.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("connection error: {0}")]
    Connection(#[from] ConnError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("no server address set")]
    NoAddress,

    #[error("hub event loop already running")]
    AlreadyRunning,
}
