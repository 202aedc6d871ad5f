//! Background topology refresh.
//!
//! A single task per proxy keeps the shard map fresh: an immediate refresh
//! at startup (so traffic stops depending on seed fallback as soon as
//! possible), then a periodic tick that refreshes only when the map has
//! gone stale. Refresh connections are always fresh dials, never pooled
//! sockets; a wedged pool must not be able to starve topology updates.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use shoal_cluster::{parse_cluster_nodes, ClusterNode, ShardMap};
use shoal_core::Limits;
use shoal_resp::{RespError, CLUSTER_NODES_FRAME};

use crate::error::{ProxyError, ProxyResult};
use crate::session::read_reply;

/// Periodically repopulates the shard map from the cluster itself.
pub struct Refresher {
    shard_map: Arc<ShardMap>,
    limits: Limits,
    shutdown: Arc<Notify>,
}

impl Refresher {
    /// Creates a refresher over the given shard map.
    ///
    /// The shutdown signal is separate from the accept loop's so graceful
    /// stop is deterministic: accepts stop first, the refresher after.
    #[must_use]
    pub fn new(shard_map: Arc<ShardMap>, limits: Limits, shutdown: Arc<Notify>) -> Self {
        Self {
            shard_map,
            limits,
            shutdown,
        }
    }

    /// Runs until the shutdown signal fires.
    pub async fn run(self) {
        // Cold start: route against real topology as soon as we can.
        self.refresh().await;

        let mut ticker = interval(self.limits.refresh_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the cold-start refresh
        // above already covered it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.shard_map.is_stale() {
                        debug!("topology is stale, refreshing");
                        self.refresh().await;
                    }
                }
                () = self.shutdown.notified() => {
                    info!("topology refresher shutting down");
                    return;
                }
            }
        }
    }

    /// Walks the seed list in order and installs the first topology that
    /// parses. On a full-walk failure the previous map stays in place.
    pub async fn refresh(&self) {
        for seed in self.shard_map.seeds() {
            match self.fetch_topology(seed).await {
                Ok(nodes) => {
                    self.shard_map.replace(nodes);
                    let stats = self.shard_map.stats();
                    info!(
                        seed = %seed,
                        total_nodes = stats.total_nodes,
                        masters = stats.masters,
                        replicas = stats.replicas,
                        "topology refreshed"
                    );
                    return;
                }
                Err(error) => {
                    warn!(seed = %seed, %error, "topology fetch failed");
                }
            }
        }
        warn!("topology refresh failed on every seed; keeping previous map");
    }

    /// Queries one node for the cluster topology over a fresh connection.
    async fn fetch_topology(&self, addr: &str) -> ProxyResult<Vec<ClusterNode>> {
        let mut stream = match timeout(self.limits.connect_timeout(), TcpStream::connect(addr)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(error)) => {
                return Err(ProxyError::Connect {
                    addr: addr.to_string(),
                    reason: error.to_string(),
                })
            }
            Err(_) => {
                return Err(ProxyError::Connect {
                    addr: addr.to_string(),
                    reason: "connection timed out".to_string(),
                })
            }
        };

        stream
            .write_all(CLUSTER_NODES_FRAME)
            .await
            .map_err(|source| ProxyError::Backend {
                addr: addr.to_string(),
                source,
            })?;

        let mut buf = BytesMut::with_capacity(16 * 1024);
        let reply = read_reply(&mut stream, &mut buf, self.limits.reply_timeout(), addr).await?;

        // The topology query answers with one bulk string; read it through
        // the general reply decoder so a large body cannot be short-read.
        if reply.type_byte() != b'$' {
            return Err(RespError::protocol(format!(
                "topology reply was not a bulk string (got {:?})",
                char::from(reply.type_byte())
            ))
            .into());
        }

        let bytes = reply.as_bytes();
        let body_start = bytes
            .iter()
            .position(|&b| b == b'\n')
            .map_or(bytes.len(), |i| i + 1);
        let body = if bytes.len() >= body_start + 2 {
            // Strip the trailing CRLF of the bulk payload.
            &bytes[body_start..bytes.len() - 2]
        } else {
            // A null or empty bulk; the parser reports it as unusable.
            &[]
        };

        let nodes = parse_cluster_nodes(&String::from_utf8_lossy(body))?;
        Ok(nodes)
    }
}
