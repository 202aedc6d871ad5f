//! Streaming frame codec.
//!
//! # Wire format
//!
//! ```text
//! Request (client -> proxy), two accepted forms:
//!   Array:  *<n>\r\n  then n bulk strings  $<len>\r\n<bytes>\r\n
//!   Inline: one \r\n-terminated line, whitespace-split into tokens
//!
//! Reply (backend -> proxy), dispatched on the leading byte:
//!   +line\r\n   -line\r\n   :int\r\n
//!   $<len>\r\n<bytes>\r\n        ($-1\r\n is a null bulk)
//!   *<n>\r\n<n nested replies>   (*-1\r\n is a null array)
//! ```
//!
//! Both decoders consume a whole frame or nothing: a short buffer yields
//! `Ok(None)` so the caller can read more from the socket and retry.

use bytes::{Buf, Bytes, BytesMut};
use shoal_core::Limits;

use crate::command::Command;
use crate::error::{RespError, RespResult};
use crate::reply::Reply;

/// Codec bounds; fixed at build time.
const LIMITS: Limits = Limits::new();

/// The `ASKING` handshake sent before a command redirected with ASK.
pub const ASKING_FRAME: &[u8] = b"*1\r\n$6\r\nASKING\r\n";

/// The liveness probe sent to idle pooled sockets.
pub const PING_FRAME: &[u8] = b"PING\r\n";

/// The topology query issued by the refresher.
pub const CLUSTER_NODES_FRAME: &[u8] = b"CLUSTER NODES\r\n";

/// Returns the index one past the LF of the line starting at `from`.
fn line_end(buf: &[u8], from: usize) -> Option<usize> {
    buf[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|i| from + i + 1)
}

/// Checks that a header line (type byte included) ends with CRLF.
fn require_crlf(line: &[u8]) -> RespResult<()> {
    if line.len() < 3 || line[line.len() - 2] != b'\r' {
        return Err(RespError::protocol("line not CRLF-terminated"));
    }
    Ok(())
}

/// Parses the decimal integer of a `<type><int>\r\n` header line.
fn header_int(line: &[u8]) -> RespResult<i64> {
    require_crlf(line)?;
    let digits = &line[1..line.len() - 2];
    let text = std::str::from_utf8(digits)
        .map_err(|_| RespError::protocol("non-ASCII length header"))?;
    text.parse()
        .map_err(|_| RespError::protocol(format!("invalid length header {text:?}")))
}

/// Decodes the next complete client command from the buffer.
///
/// Consumes the command's bytes on success; consumes nothing and returns
/// `Ok(None)` when the buffer holds less than one complete command.
///
/// # Errors
///
/// Returns an error on malformed headers, non-numeric counts, or counts
/// and lengths beyond the codec limits.
pub fn decode_command(buf: &mut BytesMut) -> RespResult<Option<Command>> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf[0] == b'*' {
        decode_array_command(buf)
    } else {
        decode_inline_command(buf)
    }
}

/// Decodes the `*<n>` array-of-bulk-strings command form.
fn decode_array_command(buf: &mut BytesMut) -> RespResult<Option<Command>> {
    let Some(header_end) = line_end(buf, 0) else {
        return Ok(None);
    };
    let declared = header_int(&buf[..header_end])?;

    // A non-positive count frames an empty command; the session skips it.
    if declared <= 0 {
        buf.advance(header_end);
        return Ok(Some(Command::new(Vec::new())));
    }
    if declared > i64::from(LIMITS.max_command_args) {
        return Err(RespError::TooManyArgs {
            count: declared.unsigned_abs(),
            max: LIMITS.max_command_args,
        });
    }
    let count = usize::try_from(declared)
        .map_err(|_| RespError::protocol("argument count out of range"))?;

    let mut args = Vec::with_capacity(count);
    let mut pos = header_end;

    for _ in 0..count {
        let Some(len_end) = line_end(buf, pos) else {
            return Ok(None);
        };
        let line = &buf[pos..len_end];
        if line[0] != b'$' {
            return Err(RespError::protocol(format!(
                "expected bulk string header, got {:?}",
                char::from(line[0])
            )));
        }
        let len = header_int(line)?;
        pos = len_end;

        if len == -1 {
            // Null argument; decoded as empty.
            args.push(Bytes::new());
            continue;
        }
        if len < -1 {
            return Err(RespError::protocol(format!("negative bulk length {len}")));
        }
        let len_u64 = len.unsigned_abs();
        if len_u64 > LIMITS.max_bulk_bytes {
            return Err(RespError::BulkTooLarge {
                size: len_u64,
                max: LIMITS.max_bulk_bytes,
            });
        }
        let len = usize::try_from(len)
            .map_err(|_| RespError::protocol("bulk length out of range"))?;

        if buf.len() < pos + len + 2 {
            return Ok(None);
        }
        if &buf[pos + len..pos + len + 2] != b"\r\n" {
            return Err(RespError::protocol("bulk payload not CRLF-terminated"));
        }
        args.push(Bytes::copy_from_slice(&buf[pos..pos + len]));
        pos += len + 2;
    }

    buf.advance(pos);
    Ok(Some(Command::new(args)))
}

/// Decodes a whitespace-split inline command line.
fn decode_inline_command(buf: &mut BytesMut) -> RespResult<Option<Command>> {
    let Some(end) = line_end(buf, 0) else {
        return Ok(None);
    };

    // Tolerate bare-LF lines from hand-typed clients.
    let mut body = &buf[..end - 1];
    if body.last() == Some(&b'\r') {
        body = &body[..body.len() - 1];
    }

    let args = body
        .split(|&b| b == b' ' || b == b'\t')
        .filter(|token| !token.is_empty())
        .map(Bytes::copy_from_slice)
        .collect();

    buf.advance(end);
    Ok(Some(Command::new(args)))
}

/// Decodes the next complete backend reply from the buffer.
///
/// The reply's bytes are carried through verbatim. Consumes nothing and
/// returns `Ok(None)` when the buffer holds less than one complete reply.
///
/// # Errors
///
/// Returns an error on unknown type bytes, malformed headers, or replies
/// beyond the codec limits.
pub fn decode_reply(buf: &mut BytesMut) -> RespResult<Option<Reply>> {
    match reply_frame_len(buf, 0, 0)? {
        Some(len) => Ok(Some(Reply::new(buf.split_to(len).freeze()))),
        None => Ok(None),
    }
}

/// Computes the total byte length of one complete reply starting at `pos`.
///
/// Recurses for array elements; `depth` bounds the nesting.
fn reply_frame_len(buf: &[u8], pos: usize, depth: u32) -> RespResult<Option<usize>> {
    if depth > LIMITS.max_reply_depth {
        return Err(RespError::DepthExceeded {
            max: LIMITS.max_reply_depth,
        });
    }
    if pos >= buf.len() {
        return Ok(None);
    }
    let Some(end) = line_end(buf, pos) else {
        return Ok(None);
    };
    let line = &buf[pos..end];

    match line[0] {
        b'+' | b'-' | b':' => {
            require_crlf(line)?;
            Ok(Some(end - pos))
        }
        b'$' => {
            let len = header_int(line)?;
            if len == -1 {
                return Ok(Some(end - pos));
            }
            if len < -1 {
                return Err(RespError::protocol(format!("negative bulk length {len}")));
            }
            let len_u64 = len.unsigned_abs();
            if len_u64 > LIMITS.max_bulk_bytes {
                return Err(RespError::BulkTooLarge {
                    size: len_u64,
                    max: LIMITS.max_bulk_bytes,
                });
            }
            let len = usize::try_from(len)
                .map_err(|_| RespError::protocol("bulk length out of range"))?;

            let total = (end - pos) + len + 2;
            if buf.len() < pos + total {
                return Ok(None);
            }
            if &buf[pos + total - 2..pos + total] != b"\r\n" {
                return Err(RespError::protocol("bulk payload not CRLF-terminated"));
            }
            Ok(Some(total))
        }
        b'*' => {
            let declared = header_int(line)?;
            if declared == -1 {
                return Ok(Some(end - pos));
            }
            if declared < -1 {
                return Err(RespError::protocol(format!(
                    "negative array length {declared}"
                )));
            }

            let mut total = end - pos;
            for _ in 0..declared {
                match reply_frame_len(buf, pos + total, depth + 1)? {
                    Some(element) => total += element,
                    None => return Ok(None),
                }
            }
            Ok(Some(total))
        }
        other => Err(RespError::protocol(format!(
            "unknown reply type byte {:?}",
            char::from(other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(bytes: &[u8]) -> BytesMut {
        BytesMut::from(bytes)
    }

    // --- command decoding ---

    #[test]
    fn test_decode_array_command() {
        let mut b = buf(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$1\r\n1\r\n");
        let cmd = decode_command(&mut b).unwrap().unwrap();
        assert_eq!(cmd.verb().as_deref(), Some("SET"));
        assert_eq!(cmd.key(), Some(b"foo".as_ref()));
        assert_eq!(cmd.args()[2].as_ref(), b"1");
        assert!(b.is_empty(), "command bytes fully consumed");
    }

    #[test]
    fn test_decode_inline_command() {
        let mut b = buf(b"GET foo\r\n");
        let cmd = decode_command(&mut b).unwrap().unwrap();
        assert_eq!(cmd.verb().as_deref(), Some("GET"));
        assert_eq!(cmd.key(), Some(b"foo".as_ref()));
        assert!(b.is_empty());
    }

    #[test]
    fn test_decode_inline_bare_lf_and_extra_whitespace() {
        let mut b = buf(b"  GET \t foo \n");
        let cmd = decode_command(&mut b).unwrap().unwrap();
        assert_eq!(cmd.args().len(), 2);
        assert_eq!(cmd.key(), Some(b"foo".as_ref()));
    }

    #[test]
    fn test_decode_empty_inline_line() {
        let mut b = buf(b"\r\n");
        let cmd = decode_command(&mut b).unwrap().unwrap();
        assert!(cmd.is_empty());
        assert!(b.is_empty());
    }

    #[test]
    fn test_decode_zero_and_negative_array_commands() {
        let mut b = buf(b"*0\r\n");
        assert!(decode_command(&mut b).unwrap().unwrap().is_empty());

        let mut b = buf(b"*-1\r\n");
        assert!(decode_command(&mut b).unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_decode_null_argument_is_empty() {
        let mut b = buf(b"*1\r\n$-1\r\n");
        let cmd = decode_command(&mut b).unwrap().unwrap();
        assert_eq!(cmd.args().len(), 1);
        assert!(cmd.args()[0].is_empty());
    }

    #[test]
    fn test_decode_command_binary_safe() {
        let mut b = buf(b"*2\r\n$3\r\nGET\r\n$4\r\nk\x00\r\x0a\r\n");
        let cmd = decode_command(&mut b).unwrap().unwrap();
        assert_eq!(cmd.key(), Some(b"k\x00\r\x0a".as_ref()));
        assert!(b.is_empty());
    }

    #[test]
    fn test_partial_command_consumes_nothing() {
        let full = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$1\r\n1\r\n";
        for cut in 1..full.len() {
            let mut b = buf(&full[..cut]);
            let got = decode_command(&mut b).unwrap();
            assert!(got.is_none(), "cut at {cut} must not decode");
            assert_eq!(b.len(), cut, "cut at {cut} must not consume");
        }
    }

    #[test]
    fn test_command_encode_decode_round_trip() {
        let original = Command::from([b"MSET".as_ref(), b"{tag}a".as_ref(), b"".as_ref()]);
        let mut b = BytesMut::from(original.encode().as_ref());
        let decoded = decode_command(&mut b).unwrap().unwrap();
        assert_eq!(decoded, original);
        assert!(b.is_empty());
    }

    #[test]
    fn test_decode_command_bad_count() {
        let mut b = buf(b"*abc\r\n");
        assert!(matches!(
            decode_command(&mut b),
            Err(RespError::Protocol { .. })
        ));
    }

    #[test]
    fn test_decode_command_missing_bulk_header() {
        let mut b = buf(b"*1\r\n+OK\r\n");
        assert!(matches!(
            decode_command(&mut b),
            Err(RespError::Protocol { .. })
        ));
    }

    #[test]
    fn test_decode_command_arg_count_limit() {
        let mut b = buf(b"*99999999\r\n");
        assert!(matches!(
            decode_command(&mut b),
            Err(RespError::TooManyArgs { .. })
        ));
    }

    #[test]
    fn test_decode_command_bulk_size_limit() {
        let mut b = buf(b"*1\r\n$999999999999\r\n");
        assert!(matches!(
            decode_command(&mut b),
            Err(RespError::BulkTooLarge { .. })
        ));
    }

    #[test]
    fn test_pipeline_decodes_one_command_at_a_time() {
        let mut b = buf(b"PING\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\nPING\r\n");
        assert_eq!(
            decode_command(&mut b).unwrap().unwrap().verb().as_deref(),
            Some("PING")
        );
        assert_eq!(
            decode_command(&mut b).unwrap().unwrap().verb().as_deref(),
            Some("GET")
        );
        assert_eq!(
            decode_command(&mut b).unwrap().unwrap().verb().as_deref(),
            Some("PING")
        );
        assert!(decode_command(&mut b).unwrap().is_none());
    }

    // --- reply decoding ---

    fn decode_whole(bytes: &[u8]) -> Reply {
        let mut b = buf(bytes);
        let reply = decode_reply(&mut b).unwrap().unwrap();
        assert!(b.is_empty(), "reply must consume the frame exactly");
        reply
    }

    #[test]
    fn test_decode_line_replies() {
        assert_eq!(decode_whole(b"+OK\r\n").as_bytes(), b"+OK\r\n");
        assert_eq!(decode_whole(b":1000\r\n").as_bytes(), b":1000\r\n");
        assert_eq!(
            decode_whole(b"-ERR bad thing\r\n").as_bytes(),
            b"-ERR bad thing\r\n"
        );
    }

    #[test]
    fn test_decode_bulk_reply() {
        assert_eq!(decode_whole(b"$3\r\nbar\r\n").as_bytes(), b"$3\r\nbar\r\n");
    }

    #[test]
    fn test_decode_bulk_boundaries() {
        // Null bulk, empty bulk.
        assert_eq!(decode_whole(b"$-1\r\n").as_bytes(), b"$-1\r\n");
        assert_eq!(decode_whole(b"$0\r\n\r\n").as_bytes(), b"$0\r\n\r\n");
    }

    #[test]
    fn test_decode_bulk_payload_may_contain_crlf() {
        assert_eq!(
            decode_whole(b"$6\r\nab\r\ncd\r\n").as_bytes(),
            b"$6\r\nab\r\ncd\r\n"
        );
    }

    #[test]
    fn test_decode_array_boundaries() {
        // Null array, empty array, single null element.
        assert_eq!(decode_whole(b"*-1\r\n").as_bytes(), b"*-1\r\n");
        assert_eq!(decode_whole(b"*0\r\n").as_bytes(), b"*0\r\n");
        assert_eq!(decode_whole(b"*1\r\n$-1\r\n").as_bytes(), b"*1\r\n$-1\r\n");
    }

    #[test]
    fn test_decode_nested_array_reply() {
        let frame = b"*2\r\n*2\r\n:1\r\n$2\r\nab\r\n*1\r\n+OK\r\n";
        assert_eq!(decode_whole(frame).as_bytes(), frame);
    }

    #[test]
    fn test_partial_reply_consumes_nothing() {
        let full = b"*2\r\n$3\r\nfoo\r\n*2\r\n:1\r\n$2\r\nab\r\n";
        for cut in 1..full.len() {
            let mut b = buf(&full[..cut]);
            let got = decode_reply(&mut b).unwrap();
            assert!(got.is_none(), "cut at {cut} must not decode");
            assert_eq!(b.len(), cut, "cut at {cut} must not consume");
        }
    }

    #[test]
    fn test_reply_round_trip() {
        // Re-feeding a decoded reply's bytes yields the same reply and an
        // empty buffer.
        for frame in [
            b"+OK\r\n".as_ref(),
            b"-MOVED 7365 10.0.0.1:7001\r\n".as_ref(),
            b"$3\r\nbar\r\n".as_ref(),
            b"*3\r\n:1\r\n$-1\r\n*1\r\n+X\r\n".as_ref(),
        ] {
            let first = decode_whole(frame);
            let mut again = BytesMut::from(first.as_bytes());
            let second = decode_reply(&mut again).unwrap().unwrap();
            assert_eq!(second, first);
            assert!(again.is_empty());
        }
    }

    #[test]
    fn test_decode_reply_unknown_type_byte() {
        let mut b = buf(b"!oops\r\n");
        assert!(matches!(
            decode_reply(&mut b),
            Err(RespError::Protocol { .. })
        ));
    }

    #[test]
    fn test_decode_reply_depth_limit() {
        // 40 nested single-element arrays exceed the depth bound.
        let mut frame = Vec::new();
        for _ in 0..40 {
            frame.extend_from_slice(b"*1\r\n");
        }
        frame.extend_from_slice(b"+OK\r\n");
        let mut b = BytesMut::from(frame.as_slice());
        assert!(matches!(
            decode_reply(&mut b),
            Err(RespError::DepthExceeded { .. })
        ));
    }

    #[test]
    fn test_canned_frames_are_valid() {
        let mut b = buf(ASKING_FRAME);
        let cmd = decode_command(&mut b).unwrap().unwrap();
        assert_eq!(cmd.verb().as_deref(), Some("ASKING"));

        let mut b = buf(CLUSTER_NODES_FRAME);
        let cmd = decode_command(&mut b).unwrap().unwrap();
        assert_eq!(cmd.verb().as_deref(), Some("CLUSTER"));
        assert_eq!(cmd.args().len(), 2);

        let mut b = buf(crate::reply::PONG_FRAME);
        assert!(decode_reply(&mut b).unwrap().is_some());
    }
}
