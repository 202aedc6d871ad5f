//! Per-client session.
//!
//! One session per accepted client connection, strictly sequential: frame a
//! command, route it, dispatch with bounded redirection, write the reply
//! bytes back, repeat. The byte stream a client sees is whole replies in
//! the order its requests arrived.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use shoal_core::Limits;
use shoal_resp::{
    decode_command, decode_reply, format_error, Command, Redirect, Reply, RespError, ASKING_FRAME,
};

use crate::error::{ProxyError, ProxyResult};
use crate::pool::{ConnectionPool, PooledConn};
use crate::router::Router;

/// Reads one complete reply from a backend socket under a deadline.
///
/// Bytes already in `buf` are considered first, and any bytes past the
/// decoded reply stay in `buf`; the caller decides whether the socket is
/// clean enough to re-pool.
pub(crate) async fn read_reply(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    deadline: Duration,
    addr: &str,
) -> ProxyResult<Reply> {
    let read_one = async {
        loop {
            if let Some(reply) = decode_reply(buf)? {
                return Ok::<_, ProxyError>(reply);
            }
            let n = stream
                .read_buf(buf)
                .await
                .map_err(|source| ProxyError::Backend {
                    addr: addr.to_string(),
                    source,
                })?;
            if n == 0 {
                return Err(ProxyError::Backend {
                    addr: addr.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed mid-reply",
                    ),
                });
            }
        }
    };

    match timeout(deadline, read_one).await {
        Ok(result) => result,
        Err(_) => Err(ProxyError::ReplyTimeout {
            addr: addr.to_string(),
        }),
    }
}

/// Serves one client connection.
pub struct Session {
    stream: TcpStream,
    peer: SocketAddr,
    buf: BytesMut,
    router: Arc<Router>,
    pool: Arc<ConnectionPool>,
    limits: Limits,
}

impl Session {
    /// Wraps an accepted client socket.
    #[must_use]
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        router: Arc<Router>,
        pool: Arc<ConnectionPool>,
        limits: Limits,
    ) -> Self {
        Self {
            stream,
            peer,
            buf: BytesMut::with_capacity(4096),
            router,
            pool,
            limits,
        }
    }

    /// Runs the session until the client disconnects or misbehaves.
    pub async fn run(mut self) {
        info!(peer = %self.peer, "client connected");

        loop {
            let command = match self.next_command().await {
                Ok(Some(command)) => command,
                Ok(None) => {
                    info!(peer = %self.peer, "client disconnected");
                    return;
                }
                Err(ProxyError::Protocol(error)) => {
                    warn!(peer = %self.peer, %error, "client protocol error");
                    let _ = self.stream.write_all(&format_error(&error.to_string())).await;
                    return;
                }
                Err(error) => {
                    debug!(peer = %self.peer, %error, "client read failed");
                    return;
                }
            };

            // Empty frames (bare CRLF, *0) carry nothing to route.
            if command.is_empty() {
                continue;
            }

            let verb = command.verb().unwrap_or_default();
            debug!(peer = %self.peer, verb = %verb, args = command.len(), "dispatching");

            let reply = match self.dispatch(&command).await {
                Ok(bytes) => bytes,
                Err(error) => {
                    // Per-request fault: report it and keep serving.
                    warn!(peer = %self.peer, verb = %verb, %error, "request failed");
                    format_error(&error.to_string())
                }
            };

            if let Err(error) = self.stream.write_all(&reply).await {
                debug!(peer = %self.peer, %error, "client write failed");
                return;
            }
        }
    }

    /// Frames the next command, reading more bytes as needed.
    ///
    /// `Ok(None)` is a clean disconnect (EOF between commands).
    async fn next_command(&mut self) -> ProxyResult<Option<Command>> {
        loop {
            if let Some(command) = decode_command(&mut self.buf)? {
                return Ok(Some(command));
            }
            let n = self.stream.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(RespError::protocol("connection closed mid-command").into());
            }
        }
    }

    /// Dispatches one command, chasing redirections up to the limit.
    async fn dispatch(&self, command: &Command) -> ProxyResult<Bytes> {
        let mut addr = self.router.target_for(command);
        let mut asking = false;

        // The initial attempt plus up to `max_redirects` chased hops.
        for _ in 0..=self.limits.max_redirects {
            let reply = self.exchange(&addr, command, asking).await?;

            let Some(redirect) = reply.redirect() else {
                return Ok(reply.into_bytes());
            };
            if !self.router.auto_redirect(command) {
                // The client deals with the redirect itself.
                return Ok(reply.into_bytes());
            }

            match redirect {
                Redirect::Moved { slot, addr: next } => {
                    debug!(peer = %self.peer, slot, from = %addr, to = %next, "following MOVED");
                    asking = false;
                    addr = next;
                }
                Redirect::Ask { slot, addr: next } => {
                    debug!(peer = %self.peer, slot, from = %addr, to = %next, "following ASK");
                    asking = true;
                    addr = next;
                }
            }
        }

        Err(ProxyError::TooManyRedirects {
            limit: self.limits.max_redirects,
        })
    }

    /// One request/reply round-trip against a backend.
    ///
    /// The socket goes back to the pool only after a clean exchange; any
    /// failure or trailing unread bytes closes it instead.
    async fn exchange(&self, addr: &str, command: &Command, asking: bool) -> ProxyResult<Reply> {
        let mut conn = self.pool.acquire(addr).await?;
        let mut buf = BytesMut::with_capacity(4096);

        let result = self.exchange_on(&mut conn, &mut buf, command, asking).await;
        match result {
            Ok(reply) if buf.is_empty() => {
                conn.release();
                Ok(reply)
            }
            Ok(reply) => {
                debug!(addr, "backend sent trailing bytes; closing socket");
                conn.discard();
                Ok(reply)
            }
            Err(error) => {
                conn.discard();
                Err(error)
            }
        }
    }

    /// Writes the (optionally ASK-prefixed) command and reads its reply.
    async fn exchange_on(
        &self,
        conn: &mut PooledConn,
        buf: &mut BytesMut,
        command: &Command,
        asking: bool,
    ) -> ProxyResult<Reply> {
        let addr = conn.addr().to_string();

        if asking {
            conn.write_all(ASKING_FRAME)
                .await
                .map_err(|source| ProxyError::AskHandshake {
                    addr: addr.clone(),
                    reason: source.to_string(),
                })?;
            let answer = read_reply(conn, buf, self.limits.reply_timeout(), &addr)
                .await
                .map_err(|error| ProxyError::AskHandshake {
                    addr: addr.clone(),
                    reason: error.to_string(),
                })?;
            if !answer.is_simple_ok() {
                return Err(ProxyError::AskHandshake {
                    addr,
                    reason: String::from_utf8_lossy(answer.first_line()).into_owned(),
                });
            }
        }

        conn.write_all(&command.encode())
            .await
            .map_err(|source| ProxyError::Backend {
                addr: addr.clone(),
                source,
            })?;

        read_reply(conn, buf, self.limits.reply_timeout(), &addr).await
    }
}
