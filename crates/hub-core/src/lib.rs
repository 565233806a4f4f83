//! Hub orchestration.
//!
//! [`Hub`] ties the server connection, per-group answer state and the
//! consumer registry together: Open lines create groups and consumer
//! instances, answers are aggregated and fanned out, Close lines and
//! disconnects tear groups down.

pub mod error;
pub mod hub;
pub mod options;

pub use error::HubError;
pub use hub::{Hub, HubStatus};
pub use options::HubOptions;
