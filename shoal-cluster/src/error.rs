//! Error types for topology handling.

use thiserror::Error;

/// Result type for topology operations.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors raised while parsing or installing cluster topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// A topology record has fewer fields than the grammar requires.
    #[error("malformed topology record: {record:?}")]
    MalformedRecord {
        /// The offending record line.
        record: String,
    },

    /// A slot specification could not be parsed or is out of range.
    #[error("invalid slot spec {spec:?}")]
    InvalidSlot {
        /// The offending slot token.
        spec: String,
    },

    /// The topology reply contained no usable node records.
    #[error("topology reply contained no usable nodes")]
    Empty,
}
