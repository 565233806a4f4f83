//! Line protocol spoken between ClickerHub and the session server.

pub mod constants;
pub mod error;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::Delimiters;
pub use error::ProtocolError;
pub use messages::{
    Answer, Codec, ConsumerRequest, GroupTarget, Inbound, OpenKind, OpenQuestion, Outbound,
};
pub use types::{ConsumerDescriptor, ConsumerKind, Credentials, QuestionSpec, Widget};
