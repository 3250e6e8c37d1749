//! Periodic eviction of stale cache entries.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::cache::store::ResponseCache;

pub struct CacheSweeper {
    cache: ResponseCache,
    interval: Duration,
}

impl CacheSweeper {
    pub fn new(cache: ResponseCache, interval: Duration) -> Self {
        Self { cache, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if self.interval.is_zero() {
            tracing::info!("Cache sweeper disabled");
            return;
        }

        tracing::info!(interval_secs = self.interval.as_secs(), "Cache sweeper starting");

        let mut ticker = time::interval(self.interval);
        // The first tick completes immediately; nothing can be stale yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.cache.purge_expired();
                    if removed > 0 {
                        tracing::debug!(
                            removed,
                            remaining = self.cache.len(),
                            "Swept expired cache entries"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Cache sweeper received shutdown signal");
                    break;
                }
            }
        }
    }
}
