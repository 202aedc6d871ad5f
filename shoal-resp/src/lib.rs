//! Shoal RESP - wire codec for the cluster protocol.
//!
//! This crate translates bytes into [`Command`]s (client side) and
//! [`Reply`]s (backend side). The codec is streaming and stateless: callers
//! keep a `BytesMut` read buffer per connection, append socket reads to it,
//! and ask the codec for the next complete frame. Incomplete input yields
//! `Ok(None)` and consumes nothing, so a pipeline of requests is never
//! buffered whole.
//!
//! Replies are kept as the exact bytes the backend produced. The proxy
//! forwards them untouched; the only interpretation applied is redirection
//! detection on the first line.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod codec;
mod command;
mod error;
mod reply;

pub use codec::{decode_command, decode_reply, ASKING_FRAME, CLUSTER_NODES_FRAME, PING_FRAME};
pub use command::Command;
pub use error::{RespError, RespResult};
pub use reply::{format_error, Redirect, Reply, PONG_FRAME};
