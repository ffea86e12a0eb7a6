//! Concurrent registry of connections keyed by peer address.
//!
//! # Responsibilities
//! - Track every accepted connection until it is reaped
//! - Serve lookups and snapshots to the application
//! - Remove entries only after their connection reports closed

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::net::connection::Connection;

/// Thread-safe map of peer address → connection.
///
/// Clones share the same underlying map.
pub struct ConnectionRegistry<M: Send + 'static> {
    inner: Arc<DashMap<String, Connection<M>>>,
}

impl<M: Send + 'static> Clone for ConnectionRegistry<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Send + 'static> Default for ConnectionRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Send + 'static> ConnectionRegistry<M> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Insert or replace the entry for `address`. Returns the previous entry.
    pub fn put(&self, address: impl Into<String>, conn: Connection<M>) -> Option<Connection<M>> {
        let address = address.into();
        let previous = self.inner.insert(address.clone(), conn);
        if let Some(prev) = &previous {
            if !prev.is_closed() {
                tracing::warn!(
                    address = %address,
                    replaced = %prev.id(),
                    "Registry entry replaced while previous connection still open"
                );
            }
        }
        previous
    }

    pub fn get(&self, address: &str) -> Option<Connection<M>> {
        self.inner.get(address).map(|entry| entry.value().clone())
    }

    /// Copy of every entry. Later registry changes do not affect it.
    pub fn get_all(&self) -> HashMap<String, Connection<M>> {
        self.inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn delete(&self, address: &str) -> Option<Connection<M>> {
        self.inner.remove(address).map(|(_, conn)| conn)
    }

    /// Remove the entry for `address` only if its connection is closed.
    pub fn remove_if_closed(&self, address: &str) -> bool {
        self.inner
            .remove_if(address, |_, conn| conn.is_closed())
            .is_some()
    }

    /// Evict every closed connection. Returns how many were removed.
    pub fn reap_closed(&self) -> usize {
        // Collect first: removing while iterating would deadlock on the shard lock.
        let closed: Vec<String> = self
            .inner
            .iter()
            .filter(|entry| entry.value().is_closed())
            .map(|entry| entry.key().clone())
            .collect();

        closed
            .iter()
            .filter(|address| self.remove_if_closed(address.as_str()))
            .count()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
