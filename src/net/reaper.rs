//! Background eviction of closed connections.
//!
//! # Responsibilities
//! - Periodically scan the registry
//! - Remove entries whose connection already reached `Closed`
//!
//! The reaper never closes anything itself.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::lifecycle::shutdown::triggered;
use crate::net::registry::ConnectionRegistry;
use crate::observability::metrics;

pub struct Reaper<M: Send + 'static> {
    registry: ConnectionRegistry<M>,
    interval: Duration,
}

impl<M: Send + 'static> Reaper<M> {
    pub fn new(registry: ConnectionRegistry<M>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Scan every interval until `shutdown` fires.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!(interval_ms = self.interval.as_millis() as u64, "Reaper starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = triggered(&mut shutdown) => {
                    tracing::debug!("Reaper received shutdown signal, exiting loop");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep();
                }
            }
        }
    }

    /// One scan. Returns the number of evicted entries.
    pub fn sweep(&self) -> usize {
        let reaped = self.registry.reap_closed();
        if reaped > 0 {
            metrics::record_reaped(reaped);
            tracing::debug!(
                reaped,
                remaining = self.registry.len(),
                "Evicted closed connections"
            );
        }
        reaped
    }
}
