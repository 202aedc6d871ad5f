//! Proxy server: listener, accept loop, lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use socket2::{Domain, Socket, Type};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use shoal_cluster::ShardMap;
use shoal_core::Limits;

use crate::config::ProxyConfig;
use crate::error::ProxyResult;
use crate::pool::ConnectionPool;
use crate::refresher::Refresher;
use crate::router::Router;
use crate::session::Session;

/// Signals a running [`Proxy`] to stop accepting and shut down.
#[derive(Clone)]
pub struct ShutdownHandle {
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    /// Initiates graceful shutdown.
    pub fn stop(&self) {
        self.notify.notify_one();
    }
}

/// The proxy server.
///
/// Owns the listener and the shared state every session routes through.
pub struct Proxy {
    config: ProxyConfig,
    limits: Limits,
    listener: TcpListener,
    shard_map: Arc<ShardMap>,
    pool: Arc<ConnectionPool>,
    router: Arc<Router>,
    shutdown: Arc<Notify>,
    refresher_shutdown: Arc<Notify>,
}

impl Proxy {
    /// Binds the listener and assembles the routing state.
    ///
    /// # Errors
    /// Returns an error when the listen port cannot be bound.
    pub fn bind(config: ProxyConfig) -> ProxyResult<Self> {
        let limits = Limits::new();
        let listener = create_reusable_listener(config.listen_addr())?;

        let shard_map = Arc::new(ShardMap::new(
            config.redis_nodes.clone(),
            limits.staleness_threshold(),
        ));
        let pool = Arc::new(ConnectionPool::new(limits));
        let router = Arc::new(Router::new(Arc::clone(&shard_map), config.auto_redirect));

        Ok(Self {
            config,
            limits,
            listener,
            shard_map,
            pool,
            router,
            shutdown: Arc::new(Notify::new()),
            refresher_shutdown: Arc::new(Notify::new()),
        })
    }

    /// Returns the bound listen address.
    ///
    /// # Errors
    /// Returns an error if the listener's local address is unavailable.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Returns a handle that stops the proxy when signaled.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            notify: Arc::clone(&self.shutdown),
        }
    }

    /// Returns the topology cache, for introspection.
    #[must_use]
    pub fn shard_map(&self) -> Arc<ShardMap> {
        Arc::clone(&self.shard_map)
    }

    /// Returns the connection pool, for introspection.
    #[must_use]
    pub fn pool(&self) -> Arc<ConnectionPool> {
        Arc::clone(&self.pool)
    }

    /// Accepts clients until shutdown is signaled, then stops in order:
    /// accepts first, the refresher next, the pool last. In-flight
    /// sessions finish their current request.
    ///
    /// # Errors
    /// Returns an error if the listener's local address is unavailable.
    pub async fn run(self) -> ProxyResult<()> {
        info!(
            addr = %self.listener.local_addr()?,
            seeds = ?self.config.redis_nodes,
            auto_redirect = self.config.auto_redirect,
            "proxy listening"
        );

        let refresher = Refresher::new(
            Arc::clone(&self.shard_map),
            self.limits,
            Arc::clone(&self.refresher_shutdown),
        );
        let refresher_task = tokio::spawn(refresher.run());

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(peer = %peer, "accepted connection");
                            let session = Session::new(
                                stream,
                                peer,
                                Arc::clone(&self.router),
                                Arc::clone(&self.pool),
                                self.limits,
                            );
                            tokio::spawn(session.run());
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
                () = self.shutdown.notified() => {
                    info!("proxy shutting down");
                    break;
                }
            }
        }

        // The listener drops with self when run returns; stop the
        // refresher and drain the pool behind it.
        self.refresher_shutdown.notify_one();
        let _ = refresher_task.await;
        self.pool.shutdown().await;

        info!("proxy stopped");
        Ok(())
    }
}

/// Creates a TCP listener with `SO_REUSEADDR` enabled.
///
/// This allows the proxy to rebind a port still in `TIME_WAIT`, which
/// matters for fast restarts.
fn create_reusable_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    // Backlog of 128 pending connections.
    socket.listen(128)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_on_ephemeral_port() {
        let config = ProxyConfig {
            proxy_port: 0,
            ..ProxyConfig::default()
        };
        let proxy = Proxy::bind(config).unwrap();
        let addr = proxy.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let config = ProxyConfig {
            proxy_port: 0,
            redis_nodes: vec!["127.0.0.1:1".to_string()],
            ..ProxyConfig::default()
        };
        let proxy = Proxy::bind(config).unwrap();
        let handle = proxy.shutdown_handle();

        let server = tokio::spawn(proxy.run());
        handle.stop();

        let result = tokio::time::timeout(std::time::Duration::from_secs(10), server)
            .await
            .expect("run should stop after shutdown")
            .expect("run task should not panic");
        assert!(result.is_ok());
    }
}
