/// Errors produced while decoding protocol lines and declarations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("{message} line has {found} segment(s), expected at least {expected}")]
    MissingSegment {
        message: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{message} line names no groups")]
    NoGroups { message: &'static str },

    #[error("malformed credentials: {0}")]
    MalformedCredentials(String),

    #[error("unknown consumer kind: {0}")]
    UnknownConsumerKind(String),

    #[error("malformed consumer declaration: {0}")]
    MalformedDeclaration(String),
}
