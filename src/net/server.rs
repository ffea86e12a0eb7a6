//! Server: accept loop, connection ownership, and dialing.
//!
//! # Responsibilities
//! - Bind and run the accept loop with capped exponential backoff
//! - Wrap accepted and dialed sockets into connections and start their pumps
//! - Own the registry and the reaper that keeps it free of closed entries
//! - Turn a panic in the accept loop into a fatal error instead of a crash

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures_util::FutureExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::{validate_config, ServerConfig};
use crate::error::ServerError;
use crate::handler::{EventHandler, SharedHandler};
use crate::lifecycle::shutdown::{triggered, Shutdown};
use crate::net::connection::{Connection, ConnectionOptions};
use crate::net::listener::{self, Accept};
use crate::net::reaper::Reaper;
use crate::net::registry::ConnectionRegistry;
use crate::observability::metrics;
use crate::protocol::{Protocol, SharedProtocol};
use crate::resilience::backoff::AcceptBackoff;

/// Connection-oriented TCP server generic over the message type `M`.
///
/// Share it behind an `Arc` to call [`Server::close`] while
/// [`Server::serve`] is running.
pub struct Server<M: Send + 'static> {
    config: ServerConfig,
    handler: SharedHandler<M>,
    protocol: SharedProtocol<M>,
    registry: ConnectionRegistry<M>,
    shutdown: Shutdown,
    /// Bound address while the accept loop runs.
    listening: ArcSwapOption<SocketAddr>,
    serving: AtomicBool,
    /// Idle read timeout for new connections in nanoseconds, 0 when disabled.
    read_timeout_nanos: AtomicU64,
}

impl<M: Send + 'static> Server<M> {
    /// Create a server for `bind_address` with default settings.
    pub fn new<H, P>(bind_address: impl Into<String>, handler: H, protocol: P) -> Self
    where
        H: EventHandler<M>,
        P: Protocol<Message = M>,
    {
        let mut config = ServerConfig::default();
        config.listener.bind_address = bind_address.into();
        Self::from_parts(config, Arc::new(handler), Arc::new(protocol))
    }

    /// Create a server from a configuration, validating it first.
    pub fn with_config<H, P>(config: ServerConfig, handler: H, protocol: P) -> Result<Self, ServerError>
    where
        H: EventHandler<M>,
        P: Protocol<Message = M>,
    {
        Self::with_shared(config, Arc::new(handler), Arc::new(protocol))
    }

    /// Like [`Server::with_config`] for handlers and protocols already behind an `Arc`.
    pub fn with_shared(
        config: ServerConfig,
        handler: SharedHandler<M>,
        protocol: SharedProtocol<M>,
    ) -> Result<Self, ServerError> {
        validate_config(&config).map_err(ServerError::Config)?;
        Ok(Self::from_parts(config, handler, protocol))
    }

    fn from_parts(config: ServerConfig, handler: SharedHandler<M>, protocol: SharedProtocol<M>) -> Self {
        let server = Self {
            handler,
            protocol,
            registry: ConnectionRegistry::new(),
            shutdown: Shutdown::new(),
            listening: ArcSwapOption::empty(),
            serving: AtomicBool::new(false),
            read_timeout_nanos: AtomicU64::new(0),
            config,
        };
        if let Some(timeout) = server.config.connection.read_timeout() {
            server.set_read_timeout(timeout);
        }
        server
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry<M> {
        &self.registry
    }

    /// Address the accept loop is bound to, while it runs.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.load_full().map(|addr| *addr)
    }

    /// Whether [`Server::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Resolve the configured bind address, bind it, and serve.
    pub async fn listen_and_serve(&self) -> Result<(), ServerError> {
        let listener = listener::bind(&self.config.listener.bind_address).await?;
        self.serve(listener).await
    }

    /// Run the accept loop on `listener` until shutdown or a fatal error.
    ///
    /// Always returns an error: [`ServerError::Closed`] after
    /// [`Server::close`], otherwise the failure that stopped the loop.
    pub async fn serve<L: Accept>(&self, listener: L) -> Result<(), ServerError> {
        if self.shutdown.is_triggered() {
            return Err(ServerError::Closed);
        }
        if self.serving.swap(true, Ordering::AcqRel) {
            return Err(ServerError::AlreadyServing);
        }
        let mut guard = ServeGuard {
            listening: &self.listening,
            serving: &self.serving,
            reaper: None,
        };

        let local_addr = listener.local_addr().ok();
        self.listening.store(local_addr.map(Arc::new));
        if let Some(addr) = local_addr {
            tracing::info!(address = %addr, "Server accepting connections");
        }

        guard.reaper = Some(tokio::spawn(
            Reaper::new(self.registry.clone(), self.config.reaper.interval())
                .run(self.shutdown.subscribe()),
        ));

        let outcome = AssertUnwindSafe(self.accept_loop(&listener))
            .catch_unwind()
            .await;

        drop(listener);
        drop(guard);

        let err = match outcome {
            Ok(err) => err,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(panic = %message, "Accept loop panicked");
                ServerError::Panicked(message)
            }
        };
        if err.is_closed() {
            tracing::info!("Server stopped");
        }
        Err(err)
    }

    async fn accept_loop<L: Accept>(&self, listener: &L) -> ServerError {
        let mut shutdown = self.shutdown.subscribe();
        let mut backoff = AcceptBackoff::new(
            self.config.accept.backoff_base_ms,
            self.config.accept.backoff_max_ms,
        );

        loop {
            if self.shutdown.is_triggered() {
                return ServerError::Closed;
            }

            let accepted = tokio::select! {
                biased;
                _ = triggered(&mut shutdown) => return ServerError::Closed,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    backoff.reset();
                    tracing::debug!(peer_addr = %peer, "Connection accepted");
                    self.adopt(stream, peer, None, None, false);
                }
                Err(e) if listener::is_transient(&e) => {
                    let delay = backoff.next_delay();
                    metrics::record_accept_error(true);
                    tracing::warn!(
                        error = %e,
                        attempt = backoff.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "Transient accept error, backing off"
                    );
                    tokio::select! {
                        biased;
                        _ = triggered(&mut shutdown) => return ServerError::Closed,
                        _ = time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    metrics::record_accept_error(false);
                    tracing::error!(error = %e, "Accept failed, stopping server");
                    return ServerError::Accept(e);
                }
            }
        }
    }

    /// Wrap a socket, register it when accepted, and start its pumps.
    fn adopt(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        handler: Option<SharedHandler<M>>,
        protocol: Option<SharedProtocol<M>>,
        dialed: bool,
    ) -> Connection<M> {
        let handler = handler.unwrap_or_else(|| Arc::clone(&self.handler));
        let protocol = protocol.unwrap_or_else(|| Arc::clone(&self.protocol));

        let mut options = ConnectionOptions::from_config(&self.config.connection);
        options.read_timeout = self.read_timeout();
        options.dialed = dialed;

        let (conn, driver) = Connection::open(stream, peer, handler, protocol, &options);
        if !dialed {
            self.registry.put(conn.remote_addr(), conn.clone());
        }
        driver.serve();

        // Accepted concurrently with close(): it may have missed the snapshot.
        if !dialed && self.shutdown.is_triggered() {
            conn.close();
        }
        conn
    }

    /// Dial `address` and run the resulting socket as a connection.
    ///
    /// `handler` and `protocol` default to the server's own. Dialed
    /// connections are not registered; the caller owns them.
    pub async fn connect(
        &self,
        address: &str,
        handler: Option<SharedHandler<M>>,
        protocol: Option<SharedProtocol<M>>,
    ) -> Result<Connection<M>, ServerError> {
        let addr = listener::resolve(address).await?;
        let connect_error = |source| ServerError::Connect {
            address: address.to_string(),
            source,
        };

        let stream = TcpStream::connect(addr).await.map_err(connect_error)?;
        let peer = stream.peer_addr().map_err(connect_error)?;

        tracing::debug!(peer_addr = %peer, "Dialed remote");
        Ok(self.adopt(stream, peer, handler, protocol, true))
    }

    /// Stop accepting and close every registered connection.
    ///
    /// Idempotent and non-blocking: connections are signalled, not awaited.
    pub fn close(&self) {
        let first = self.shutdown.trigger();

        let mut signalled = 0usize;
        for conn in self.registry.get_all().into_values() {
            if !conn.is_closed() {
                conn.close();
                signalled += 1;
            }
        }

        if first {
            tracing::info!(connections = signalled, "Server closing");
        }
    }

    /// Snapshot of all registered connections.
    pub fn get_all_connections(&self) -> Vec<Connection<M>> {
        self.registry.get_all().into_values().collect()
    }

    pub fn get_connection(&self, address: &str) -> Option<Connection<M>> {
        self.registry.get(address)
    }

    /// Idle read timeout for connections created from now on.
    /// `Duration::ZERO` disables it. Running connections keep theirs.
    pub fn set_read_timeout(&self, timeout: Duration) {
        let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        self.read_timeout_nanos.store(nanos, Ordering::Relaxed);
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        match self.read_timeout_nanos.load(Ordering::Relaxed) {
            0 => None,
            nanos => Some(Duration::from_nanos(nanos)),
        }
    }
}

/// Undoes the per-`serve` state when `serve` returns or its future is dropped.
struct ServeGuard<'a> {
    listening: &'a ArcSwapOption<SocketAddr>,
    serving: &'a AtomicBool,
    reaper: Option<JoinHandle<()>>,
}

impl Drop for ServeGuard<'_> {
    fn drop(&mut self) {
        if let Some(reaper) = self.reaper.take() {
            reaper.abort();
        }
        self.listening.store(None);
        self.serving.store(false, Ordering::Release);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
