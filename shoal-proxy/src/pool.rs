//! Per-backend connection pooling.
//!
//! One bounded [`NodePool`] per backend address amortizes TCP handshakes
//! and caps resource use. Sockets are affinely owned: [`acquire`] hands out
//! a [`PooledConn`] guard whose consuming methods either return the socket
//! cleanly or close it; dropping the guard closes too. A socket is never in
//! two places at once and every exit path fixes the open-socket count.
//!
//! The pool contract requires that a socket is only released after a clean
//! request/reply round-trip; anything half-read must be discarded, or the
//! idle probe would race the stale reply still in flight.
//!
//! [`acquire`]: ConnectionPool::acquire

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::debug;

use shoal_core::Limits;
use shoal_resp::{PING_FRAME, PONG_FRAME};

use crate::error::{ProxyError, ProxyResult};

/// Bookkeeping for one backend's sockets.
struct PoolState {
    /// Sockets waiting for reuse, oldest first.
    idle: VecDeque<TcpStream>,
    /// Sockets alive: idle plus checked out.
    open: u32,
    /// Set once at shutdown; no more checkouts or returns.
    closed: bool,
}

/// Bounded socket pool for a single backend address.
pub struct NodePool {
    addr: String,
    limits: Limits,
    state: Mutex<PoolState>,
}

impl NodePool {
    fn new(addr: &str, limits: Limits) -> Self {
        Self {
            addr: addr.to_string(),
            limits,
            state: Mutex::new(PoolState {
                idle: VecDeque::with_capacity(limits.pool_size_per_node as usize),
                open: 0,
                closed: false,
            }),
        }
    }

    /// Locks the state, recovering from a poisoned lock; the bookkeeping is
    /// plain counters and remains sound after a panic elsewhere.
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Checks out a socket, reusing a live idle one or dialing.
    async fn acquire(self: &Arc<Self>) -> ProxyResult<PooledConn> {
        // Reuse: pop idle sockets until one answers the probe.
        loop {
            let candidate = {
                let mut state = self.lock();
                if state.closed {
                    return Err(ProxyError::PoolClosed);
                }
                state.idle.pop_front()
            };
            let Some(stream) = candidate else { break };

            if let Some(stream) = self.probe(stream).await {
                return Ok(PooledConn {
                    stream: Some(stream),
                    pool: Arc::clone(self),
                });
            }
            self.note_closed();
        }

        // Dial: reserve a slot first so concurrent dials respect the cap.
        {
            let mut state = self.lock();
            if state.closed {
                return Err(ProxyError::PoolClosed);
            }
            if state.open >= self.limits.pool_size_per_node {
                return Err(ProxyError::PoolExhausted {
                    addr: self.addr.clone(),
                });
            }
            state.open += 1;
        }

        match timeout(self.limits.connect_timeout(), TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => match stream.set_nodelay(true) {
                Ok(()) => Ok(PooledConn {
                    stream: Some(stream),
                    pool: Arc::clone(self),
                }),
                Err(error) => {
                    self.lock().open -= 1;
                    Err(ProxyError::Connect {
                        addr: self.addr.clone(),
                        reason: error.to_string(),
                    })
                }
            },
            Ok(Err(error)) => {
                self.lock().open -= 1;
                Err(ProxyError::Connect {
                    addr: self.addr.clone(),
                    reason: error.to_string(),
                })
            }
            Err(_) => {
                self.lock().open -= 1;
                Err(ProxyError::Connect {
                    addr: self.addr.clone(),
                    reason: "connection timed out".to_string(),
                })
            }
        }
    }

    /// Liveness-probes an idle socket: ping, expect pong, under a tight
    /// deadline. Returns the socket if it answered, `None` if it is dead.
    async fn probe(&self, mut stream: TcpStream) -> Option<TcpStream> {
        let check = timeout(self.limits.probe_timeout(), async {
            stream.write_all(PING_FRAME).await?;
            let mut answer = [0_u8; 7];
            stream.read_exact(&mut answer).await?;
            if &answer[..] != PONG_FRAME {
                return Err(std::io::Error::other("unexpected probe answer"));
            }
            Ok::<_, std::io::Error>(())
        })
        .await;

        match check {
            Ok(Ok(())) => Some(stream),
            _ => {
                debug!(addr = %self.addr, "discarding dead idle connection");
                None
            }
        }
    }

    /// Returns a socket after a clean round-trip.
    fn put_back(&self, stream: TcpStream) {
        let mut state = self.lock();
        if state.closed || state.idle.len() >= self.limits.pool_size_per_node as usize {
            // Dropping the stream closes it.
            state.open = state.open.saturating_sub(1);
        } else {
            state.idle.push_back(stream);
        }
    }

    /// Records that a checked-out socket was closed instead of returned.
    fn note_closed(&self) {
        let mut state = self.lock();
        state.open = state.open.saturating_sub(1);
    }

    /// Closes the pool: drops every idle socket and refuses new checkouts.
    fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        let drained = state.idle.len() as u32;
        state.idle.clear();
        state.open = state.open.saturating_sub(drained);
    }
}

/// A checked-out backend socket.
///
/// Exactly one of [`release`](Self::release) (clean round-trip) or
/// [`discard`](Self::discard) (any failure) should be called; merely
/// dropping the guard behaves like `discard`.
pub struct PooledConn {
    stream: Option<TcpStream>,
    pool: Arc<NodePool>,
}

impl PooledConn {
    /// The backend address this socket is connected to.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.pool.addr
    }

    /// Returns the socket to the pool for reuse.
    pub fn release(mut self) {
        if let Some(stream) = self.stream.take() {
            self.pool.put_back(stream);
        }
    }

    /// Closes the socket. Required after any I/O error or half-read state.
    pub fn discard(mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            self.pool.note_closed();
        }
    }
}

impl std::ops::Deref for PooledConn {
    type Target = TcpStream;

    fn deref(&self) -> &TcpStream {
        match &self.stream {
            Some(stream) => stream,
            // The stream is only taken by the consuming release/discard.
            None => unreachable!("pooled connection already consumed"),
        }
    }
}

impl std::ops::DerefMut for PooledConn {
    fn deref_mut(&mut self) -> &mut TcpStream {
        match &mut self.stream {
            Some(stream) => stream,
            None => unreachable!("pooled connection already consumed"),
        }
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            self.pool.note_closed();
        }
    }
}

/// Process-wide map of backend address to [`NodePool`].
pub struct ConnectionPool {
    limits: Limits,
    pools: RwLock<HashMap<String, Arc<NodePool>>>,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Creates an empty pool map.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            pools: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Checks out a socket to the given backend.
    ///
    /// # Errors
    /// Fails when dialing fails, the per-node cap is reached, or the pool
    /// is shut down.
    pub async fn acquire(&self, addr: &str) -> ProxyResult<PooledConn> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProxyError::PoolClosed);
        }
        let pool = self.node_pool(addr).await;
        pool.acquire().await
    }

    /// Finds or creates the per-node pool, read-mostly with a write lock
    /// only on first touch.
    async fn node_pool(&self, addr: &str) -> Arc<NodePool> {
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(addr) {
                return Arc::clone(pool);
            }
        }

        let mut pools = self.pools.write().await;
        Arc::clone(
            pools
                .entry(addr.to_string())
                .or_insert_with(|| Arc::new(NodePool::new(addr, self.limits))),
        )
    }

    /// Closes every node pool and refuses further checkouts.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut pools = self.pools.write().await;
        for pool in pools.values() {
            pool.close();
        }
        pools.clear();
    }

    /// Count of live sockets (idle plus checked out) for a backend.
    pub async fn open_connections(&self, addr: &str) -> u32 {
        let pools = self.pools.read().await;
        pools.get(addr).map_or(0, |pool| pool.lock().open)
    }

    /// Count of idle sockets for a backend.
    pub async fn idle_connections(&self, addr: &str) -> usize {
        let pools = self.pools.read().await;
        pools.get(addr).map_or(0, |pool| pool.lock().idle.len())
    }
}
