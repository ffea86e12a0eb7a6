//! Listening socket abstraction.
//!
//! # Responsibilities
//! - Resolve and bind the configured address
//! - Expose accept behind a trait so the accept loop can be driven by any source
//! - Classify accept errors as transient (retry) or fatal (stop serving)

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::{lookup_host, TcpListener, TcpStream};

use crate::error::ServerError;

/// Source of accepted sockets for `Server::serve`.
#[async_trait]
pub trait Accept: Send + Sync {
    /// Wait for the next inbound connection.
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;

    /// The address this source is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Accept for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

#[async_trait]
impl<A: Accept + ?Sized> Accept for Arc<A> {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        (**self).accept().await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        (**self).local_addr()
    }
}

/// Resolve `address` to the first socket address it names.
pub async fn resolve(address: &str) -> Result<SocketAddr, ServerError> {
    let mut addrs = lookup_host(address)
        .await
        .map_err(|source| ServerError::Resolution {
            address: address.to_string(),
            source,
        })?;

    addrs.next().ok_or_else(|| ServerError::Resolution {
        address: address.to_string(),
        source: io::Error::new(io::ErrorKind::NotFound, "no socket address found"),
    })
}

/// Resolve `address` and bind a listening socket on it.
pub async fn bind(address: &str) -> Result<TcpListener, ServerError> {
    let addr = resolve(address).await?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { address: addr, source })?;

    let local_addr = listener
        .local_addr()
        .map_err(|source| ServerError::Bind { address: addr, source })?;

    tracing::info!(address = %local_addr, "Listener bound");

    Ok(listener)
}

/// Whether an accept error is worth retrying after a pause.
///
/// Covers connections that died in the backlog, interrupted calls and
/// temporary resource exhaustion (file descriptors, buffers, memory).
pub fn is_transient(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::OutOfMemory
    ) {
        return true;
    }

    #[cfg(unix)]
    if let Some(code) = err.raw_os_error() {
        return matches!(
            code,
            libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM | libc::EAGAIN
        );
    }

    false
}
