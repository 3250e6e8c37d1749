//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the forward proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, worker limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Size limits on request and response heads.
    pub limits: LimitsConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Initial blocklist.
    pub access: AccessConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Administration console settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:4000").
    pub bind_address: String,

    /// Maximum concurrent relays; further connections wait for a free slot.
    pub max_connections: usize,
}

impl ListenerConfig {
    /// Replace the port of `bind_address`, keeping its host part.
    pub fn set_port(&mut self, port: u16) {
        let host = match self.bind_address.rsplit_once(':') {
            Some((host, _)) => host,
            None => self.bind_address.as_str(),
        };
        self.bind_address = format!("{}:{}", host, port);
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4000".to_string(),
            max_connections: 50,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Origin connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Per-read timeout on both client and origin sockets, in seconds.
    pub read_secs: u64,

    /// How long shutdown waits for in-flight relays, in seconds.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            read_secs: 10,
            drain_secs: 5,
        }
    }
}

/// Bounds on what a relay holds in memory while reading a head.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Longest accepted line (request, status, header or chunk-size line).
    pub max_line_bytes: usize,

    /// Total size of one request or response head.
    pub max_head_bytes: usize,

    /// Header lines allowed in one head.
    pub max_headers: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: 8 * 1024,
            max_head_bytes: 64 * 1024,
            max_headers: 100,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Serve and store cacheable GET responses.
    pub enabled: bool,

    /// Lifetime for responses without freshness headers, in seconds.
    pub default_ttl_secs: u64,

    /// Responses with a larger body are relayed but not stored.
    pub max_entry_bytes: usize,

    /// Interval between expired-entry sweeps in seconds (0 disables).
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: 60,
            max_entry_bytes: 10 * 1024 * 1024, // 10MB
            sweep_interval_secs: 30,
        }
    }
}

/// Blocklist seeded at startup.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AccessConfig {
    /// Hosts refused with 403 (exact match).
    pub blocked_hosts: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// CSV file for per-request timings (empty disables).
    pub timing_csv_path: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            timing_csv_path: "proxy_timing.csv".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Administration console configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Read commands from stdin while running.
    pub console_enabled: bool,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
        }
    }
}
