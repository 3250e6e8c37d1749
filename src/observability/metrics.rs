//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Keep process-lifetime request counters for the console
//! - Mirror them into the `metrics` facade
//! - Optionally expose a Prometheus scrape endpoint
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by outcome
//! - `proxy_request_duration_seconds` (histogram): latency by outcome
//! - `proxy_active_connections` (gauge): relays in flight
//! - `proxy_cache_entries` (gauge): entries in the response cache

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::observability::telemetry::Outcome;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(outcome: Outcome, elapsed: Duration) {
    metrics::counter!("proxy_requests_total", "outcome" => outcome.as_str()).increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "outcome" => outcome.as_str())
        .record(elapsed.as_secs_f64());
}

pub fn record_active_connections(count: u64) {
    metrics::gauge!("proxy_active_connections").set(count as f64);
}

pub fn record_cache_size(entries: usize) {
    metrics::gauge!("proxy_cache_entries").set(entries as f64);
}

/// Aggregate request counters shared by every relay.
#[derive(Debug, Default)]
pub struct ProxyStats {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    blocked: AtomicU64,
    hit_time_ms: AtomicU64,
    miss_time_ms: AtomicU64,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished request.
    pub fn record(&self, outcome: Outcome, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Outcome::Hit => {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                self.hit_time_ms.fetch_add(ms, Ordering::Relaxed);
            }
            Outcome::Miss => {
                self.cache_misses.fetch_add(1, Ordering::Relaxed);
                self.miss_time_ms.fetch_add(ms, Ordering::Relaxed);
            }
            Outcome::Blocked => {
                self.blocked.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            hit_time_ms: self.hit_time_ms.load(Ordering::Relaxed),
            miss_time_ms: self.miss_time_ms.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ProxyStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub blocked: u64,
    pub hit_time_ms: u64,
    pub miss_time_ms: u64,
}

impl StatsSnapshot {
    /// Hits as a percentage of all requests.
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            100.0 * self.cache_hits as f64 / self.total_requests as f64
        }
    }

    pub fn avg_hit_ms(&self) -> u64 {
        self.hit_time_ms.checked_div(self.cache_hits).unwrap_or(0)
    }

    pub fn avg_miss_ms(&self) -> u64 {
        self.miss_time_ms.checked_div(self.cache_misses).unwrap_or(0)
    }
}
