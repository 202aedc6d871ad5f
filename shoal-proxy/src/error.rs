//! Error types for the proxy engine.
//!
//! Only configuration problems are fatal; see [`crate::config`]. Everything
//! here stays scoped to one request or one session: a failed dispatch turns
//! into an error reply to the client and the session keeps serving.

use thiserror::Error;

use shoal_cluster::TopologyError;
use shoal_resp::RespError;

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Errors raised while serving client requests.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// I/O failure on the client connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer violated the wire protocol.
    #[error(transparent)]
    Protocol(#[from] RespError),

    /// Dialing a backend failed or timed out.
    #[error("failed to connect to {addr}: {reason}")]
    Connect {
        /// The backend address.
        addr: String,
        /// The underlying failure.
        reason: String,
    },

    /// The per-backend connection pool is at capacity.
    #[error("pool exhausted")]
    PoolExhausted {
        /// The backend address.
        addr: String,
    },

    /// The connection pool has been shut down.
    #[error("proxy is shutting down")]
    PoolClosed,

    /// Reading or writing a backend socket failed mid-request.
    #[error("backend {addr} failed: {source}")]
    Backend {
        /// The backend address.
        addr: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A backend reply did not arrive within the reply deadline.
    #[error("backend {addr} reply timed out")]
    ReplyTimeout {
        /// The backend address.
        addr: String,
    },

    /// The ASKING handshake on a redirect target was not accepted.
    #[error("ASKING handshake with {addr} failed: {reason}")]
    AskHandshake {
        /// The redirect target.
        addr: String,
        /// The backend's answer, or the transport failure.
        reason: String,
    },

    /// One request chased more redirections than allowed.
    #[error("too many redirections")]
    TooManyRedirects {
        /// The redirection limit that was exceeded.
        limit: u32,
    },

    /// A topology reply could not be parsed.
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_reply_wording() {
        // The client-facing text for these two is pinned by compatibility.
        assert_eq!(
            ProxyError::PoolExhausted {
                addr: "x:1".to_string()
            }
            .to_string(),
            "pool exhausted"
        );
        assert_eq!(
            ProxyError::TooManyRedirects { limit: 5 }.to_string(),
            "too many redirections"
        );
    }
}
