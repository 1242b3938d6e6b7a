//! Background TTL sweeps.
//!
//! [`spawn_maintenance`] runs [`CacheRegistry::perform_maintenance`] on a
//! fixed interval until the supplied token is cancelled. The caller owns the
//! returned handle and decides when to await it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::registry::CacheRegistry;
use crate::time::Clock;

/// Spawns the sweep loop on the current tokio runtime.
///
/// The first sweep happens one `interval` after spawning.
pub fn spawn_maintenance<V, C>(
    registry: Arc<CacheRegistry<V, C>>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
    C: Clock + Clone,
{
    info!(interval_ms = interval.as_millis() as u64, "cache_maintenance_started");
    tokio::spawn(maintenance_worker(registry, interval, cancel))
}

/// Sweep loop, separated from the spawn so tests can drive it directly.
#[instrument(skip(registry, cancel))]
pub async fn maintenance_worker<V, C>(
    registry: Arc<CacheRegistry<V, C>>,
    interval: Duration,
    cancel: CancellationToken,
) where
    V: Clone + Send + Sync + 'static,
    C: Clock + Clone,
{
    let period = interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cache_maintenance_stopped");
                break;
            }
            _ = ticker.tick() => {
                let removed = registry.perform_maintenance();
                debug!(removed, caches = registry.len(), "cache_maintenance_tick");
            }
        }
    }
}
