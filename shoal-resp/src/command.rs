//! Client command representation.

use bytes::{BufMut, Bytes, BytesMut};

/// One client request: an ordered sequence of binary-safe arguments.
///
/// `args[0]` is the verb (matched case-insensitively by the router) and
/// `args[1]`, when present, is the candidate routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    /// Creates a command from its argument vector.
    #[must_use]
    pub fn new(args: Vec<Bytes>) -> Self {
        Self { args }
    }

    /// Returns the arguments in order.
    #[must_use]
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Returns the number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Returns true for a zero-argument command.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Returns the verb uppercased, or `None` for an empty command.
    #[must_use]
    pub fn verb(&self) -> Option<String> {
        self.args
            .first()
            .map(|arg| String::from_utf8_lossy(arg).to_ascii_uppercase())
    }

    /// Returns the candidate routing key (`args[1]`), if present.
    #[must_use]
    pub fn key(&self) -> Option<&[u8]> {
        self.args.get(1).map(|arg| arg.as_ref())
    }

    /// Encodes the command as a wire-protocol array of bulk strings.
    ///
    /// Always emits the array form, regardless of whether the command was
    /// parsed from an array or an inline line; backends accept both and the
    /// array form is binary-safe.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(16 + self.args.iter().map(|a| a.len() + 16).sum::<usize>());
        buf.put_slice(format!("*{}\r\n", self.args.len()).as_bytes());
        for arg in &self.args {
            buf.put_slice(format!("${}\r\n", arg.len()).as_bytes());
            buf.put_slice(arg);
            buf.put_slice(b"\r\n");
        }
        buf.freeze()
    }
}

impl<const N: usize> From<[&[u8]; N]> for Command {
    fn from(args: [&[u8]; N]) -> Self {
        Self::new(args.iter().map(|a| Bytes::copy_from_slice(a)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_is_uppercased() {
        let cmd = Command::from([b"get".as_ref(), b"foo".as_ref()]);
        assert_eq!(cmd.verb().as_deref(), Some("GET"));
    }

    #[test]
    fn test_empty_command_has_no_verb() {
        let cmd = Command::new(Vec::new());
        assert!(cmd.verb().is_none());
        assert!(cmd.key().is_none());
        assert!(cmd.is_empty());
    }

    #[test]
    fn test_key_is_second_argument() {
        let cmd = Command::from([b"SET".as_ref(), b"foo".as_ref(), b"1".as_ref()]);
        assert_eq!(cmd.key(), Some(b"foo".as_ref()));
    }

    #[test]
    fn test_encode_bulk_array_form() {
        let cmd = Command::from([b"SET".as_ref(), b"foo".as_ref(), b"1".as_ref()]);
        assert_eq!(
            cmd.encode().as_ref(),
            b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$1\r\n1\r\n"
        );
    }

    #[test]
    fn test_encode_binary_safe() {
        let cmd = Command::new(vec![
            Bytes::from_static(b"SET"),
            Bytes::from_static(b"k\x00\xff"),
            Bytes::from_static(b"\r\n"),
        ]);
        assert_eq!(
            cmd.encode().as_ref(),
            b"*3\r\n$3\r\nSET\r\n$4\r\nk\x00\xff\r\n$2\r\n\r\n\r\n"
        );
    }
}
