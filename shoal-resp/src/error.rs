//! Error types for the RESP codec.

use thiserror::Error;

/// Result type for codec operations.
pub type RespResult<T> = Result<T, RespError>;

/// Errors raised while framing commands or replies.
///
/// Every variant is a protocol violation by the peer; I/O failures are the
/// caller's concern because the codec never touches a socket.
#[derive(Debug, Error)]
pub enum RespError {
    /// The input does not follow the wire protocol grammar.
    #[error("protocol error: {message}")]
    Protocol {
        /// What was malformed.
        message: String,
    },

    /// A command declared more arguments than the proxy accepts.
    #[error("too many arguments: {count} (max {max})")]
    TooManyArgs {
        /// Declared argument count.
        count: u64,
        /// Maximum allowed.
        max: u32,
    },

    /// A bulk string declared a payload larger than the proxy accepts.
    #[error("bulk string too large: {size} bytes (max {max})")]
    BulkTooLarge {
        /// Declared payload size.
        size: u64,
        /// Maximum allowed.
        max: u64,
    },

    /// An array reply nests deeper than the proxy accepts.
    #[error("reply nests deeper than {max} levels")]
    DepthExceeded {
        /// Maximum allowed nesting depth.
        max: u32,
    },
}

impl RespError {
    /// Creates a protocol error from any displayable cause.
    pub fn protocol<M: std::fmt::Display>(message: M) -> Self {
        Self::Protocol {
            message: message.to_string(),
        }
    }
}
