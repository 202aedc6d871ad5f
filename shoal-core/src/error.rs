//! Error types for foundation checks.
//!
//! All errors must be handled explicitly. No silent failures, no ignored
//! errors.

use std::fmt;

/// The result type for foundation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by foundation checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An invalid argument was provided.
    InvalidArgument {
        /// The name of the argument.
        name: &'static str,
        /// Why it was invalid.
        reason: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { name, reason } => {
                write!(f, "invalid argument '{name}': {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidArgument {
            name: "max_redirects",
            reason: "must be positive",
        };
        assert_eq!(
            format!("{err}"),
            "invalid argument 'max_redirects': must be positive"
        );
    }
}
