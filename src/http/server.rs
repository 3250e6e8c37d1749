//! Proxy server setup.
//!
//! # Responsibilities
//! - Hold the state every relay shares (cache, blocklist, telemetry)
//! - Accept connections and spawn one relay task per connection
//! - Stop accepting on shutdown, drain in-flight relays, flush telemetry

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::Instrument;

use crate::cache::policy::CachePolicy;
use crate::cache::ResponseCache;
use crate::config::{LimitsConfig, ProxyConfig, TimeoutConfig};
use crate::http::relay::ConnectionRelay;
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::observability::Telemetry;
use crate::security::AccessControl;

/// Socket deadlines applied by every relay.
#[derive(Debug, Clone, Copy)]
pub struct RelayTimeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl From<&TimeoutConfig> for RelayTimeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            connect: Duration::from_secs(config.connect_secs),
            read: Duration::from_secs(config.read_secs),
        }
    }
}

/// Bounds on a request or response head.
#[derive(Debug, Clone, Copy)]
pub struct HeadLimits {
    pub max_line: usize,
    pub max_head_bytes: usize,
    pub max_headers: usize,
}

impl From<&LimitsConfig> for HeadLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            max_line: config.max_line_bytes,
            max_head_bytes: config.max_head_bytes,
            max_headers: config.max_headers,
        }
    }
}

/// State shared by every relay. Cloning is cheap; all maps are shared.
#[derive(Debug, Clone)]
pub struct ProxyState {
    pub cache: ResponseCache,
    pub access: AccessControl,
    pub telemetry: Telemetry,
    pub policy: CachePolicy,
    pub timeouts: RelayTimeouts,
    pub limits: HeadLimits,
}

impl ProxyState {
    /// Build fresh shared state; the blocklist is seeded from the config.
    pub fn from_config(config: &ProxyConfig, telemetry: Telemetry) -> Self {
        Self {
            cache: ResponseCache::new(),
            access: AccessControl::with_blocked(config.access.blocked_hosts.iter().cloned()),
            telemetry,
            policy: CachePolicy::from_config(&config.cache),
            timeouts: RelayTimeouts::from(&config.timeouts),
            limits: HeadLimits::from(&config.limits),
        }
    }
}

/// Accept loop for the forward proxy.
pub struct ProxyServer {
    state: ProxyState,
    tracker: ConnectionTracker,
    drain_timeout: Duration,
}

impl ProxyServer {
    pub fn new(state: ProxyState, drain_timeout: Duration) -> Self {
        Self {
            state,
            tracker: ConnectionTracker::new(),
            drain_timeout,
        }
    }

    /// Handle for observing in-flight relays.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Accept until shutdown, then drain.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "Proxy accepting connections");
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => self.spawn_relay(stream, peer, permit),
                    Err(ListenerError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
            }
        }

        let remaining = self.tracker.drain(self.drain_timeout).await;
        if remaining > 0 {
            tracing::warn!(remaining, "Drain deadline passed, abandoning in-flight relays");
        }
        self.state.telemetry.flush();
        tracing::info!("Proxy stopped");
    }

    fn spawn_relay(
        &self,
        stream: tokio::net::TcpStream,
        peer: SocketAddr,
        permit: crate::net::ConnectionPermit,
    ) {
        let guard = self.tracker.track();
        let span = tracing::info_span!("relay", conn = %guard.id(), peer = %peer);
        let relay = ConnectionRelay::new(self.state.clone(), peer);
        tokio::spawn(
            async move {
                relay.run(stream).await;
                drop(guard);
                drop(permit);
            }
            .instrument(span),
        );
    }
}
