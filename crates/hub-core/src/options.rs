use std::time::Duration;

use clickerhub_hub_connection::ConnectConfig;
use clickerhub_protocol::Delimiters;

/// Hub settings.
#[derive(Debug, Clone, Default)]
pub struct HubOptions {
    /// Delimiter set spoken with the server.
    pub delimiters: Delimiters,
    /// Upper bound on a single delivery to a consumer. `None` waits for as
    /// long as the consumer takes.
    pub delivery_timeout: Option<Duration>,
    pub connect: ConnectConfig,
}
