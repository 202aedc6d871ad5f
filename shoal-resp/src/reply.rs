//! Backend reply representation and redirection detection.

use bytes::{BufMut, Bytes, BytesMut};

use shoal_core::SlotId;

/// The liveness probe answer (`+PONG`).
pub const PONG_FRAME: &[u8] = b"+PONG\r\n";

/// A redirection extracted from an error reply's first line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// Permanent redirection: the slot has moved to another node.
    Moved {
        /// The slot named in the reply.
        slot: SlotId,
        /// The owning node's `host:port`.
        addr: String,
    },
    /// Provisional redirection during slot migration; valid for one command
    /// after an `ASKING` handshake on the target connection.
    Ask {
        /// The slot named in the reply.
        slot: SlotId,
        /// The migration target's `host:port`.
        addr: String,
    },
}

impl Redirect {
    /// Returns the target address of the redirection.
    #[must_use]
    pub fn addr(&self) -> &str {
        match self {
            Self::Moved { addr, .. } | Self::Ask { addr, .. } => addr,
        }
    }
}

/// One complete backend reply, byte-identical to what the backend wrote.
///
/// The proxy never re-encodes replies; it forwards these bytes as-is, which
/// preserves every upstream semantic it does not interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    bytes: Bytes,
}

impl Reply {
    /// Wraps a complete reply frame. The codec guarantees completeness.
    pub(crate) fn new(bytes: Bytes) -> Self {
        debug_assert!(!bytes.is_empty(), "reply frame cannot be empty");
        Self { bytes }
    }

    /// Returns the reply's exact wire bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the reply, yielding its wire bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Returns the leading type byte (`+ - : $ *`).
    #[must_use]
    pub fn type_byte(&self) -> u8 {
        self.bytes[0]
    }

    /// Returns true for an error reply.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.type_byte() == b'-'
    }

    /// Returns true for the `+OK` simple-string reply.
    #[must_use]
    pub fn is_simple_ok(&self) -> bool {
        self.bytes.starts_with(b"+OK")
    }

    /// Returns the first line without its CRLF terminator.
    #[must_use]
    pub fn first_line(&self) -> &[u8] {
        let end = self
            .bytes
            .iter()
            .position(|&b| b == b'\r')
            .unwrap_or(self.bytes.len());
        &self.bytes[..end]
    }

    /// Classifies the reply as a redirection, if it is one.
    ///
    /// Only the first line is inspected: `-MOVED <slot> <host:port>` or
    /// `-ASK <slot> <host:port>`. Every other reply, including other
    /// errors, is passed through untouched and yields `None`. A redirect
    /// line with an unparsable slot or missing address is treated the same
    /// way; forwarding a malformed redirect is safer than acting on it.
    #[must_use]
    pub fn redirect(&self) -> Option<Redirect> {
        if !self.is_error() {
            return None;
        }

        let line = self.first_line();
        let mut fields = line[1..].split(|&b| b == b' ').filter(|f| !f.is_empty());

        let kind = fields.next()?;
        if kind != b"MOVED" && kind != b"ASK" {
            return None;
        }

        let slot: SlotId = std::str::from_utf8(fields.next()?).ok()?.parse().ok()?;
        let addr = std::str::from_utf8(fields.next()?).ok()?.to_string();

        if kind == b"MOVED" {
            Some(Redirect::Moved { slot, addr })
        } else {
            Some(Redirect::Ask { slot, addr })
        }
    }
}

/// Formats a protocol error reply: `-ERR <msg>\r\n`.
#[must_use]
pub fn format_error(message: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(message.len() + 8);
    buf.put_slice(b"-ERR ");
    buf.put_slice(message.as_bytes());
    buf.put_slice(b"\r\n");
    buf.freeze()
}
