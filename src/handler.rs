//! Application callbacks for connection events.

use std::sync::Arc;

use async_trait::async_trait;

use crate::net::connection::Connection;

/// Reacts to connection lifecycle events.
///
/// `on_connect` and `on_message` run on the connection's inbound pump, so for
/// one connection they are never concurrent and messages arrive in wire order.
/// Slow callbacks therefore stall reading from that connection only.
/// `on_close` runs exactly once per connection, after it reached the closed
/// state.
#[async_trait]
pub trait EventHandler<M: Send + 'static>: Send + Sync + 'static {
    /// Called once before the first message is read.
    async fn on_connect(&self, _conn: &Connection<M>) {}

    /// Called for every decoded message.
    async fn on_message(&self, conn: &Connection<M>, message: M);

    /// Called once after both pumps have exited.
    async fn on_close(&self, _conn: &Connection<M>) {}
}

/// Shared handler as stored by the server and its connections.
pub type SharedHandler<M> = Arc<dyn EventHandler<M>>;
