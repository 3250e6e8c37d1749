//! Host blocklist.
//!
//! The relay only ever calls [`AccessControl::is_blocked`]; `block` and
//! `unblock` belong to the administration console. Matching is exact and
//! case-sensitive: the host is compared as it appeared in the request line.

use std::sync::Arc;

use dashmap::DashSet;

/// Shared set of blocked hostnames.
#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    blocked: Arc<DashSet<String>>,
}

impl AccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the blocklist, e.g. from configuration.
    pub fn with_blocked<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let access = Self::new();
        for host in hosts {
            access.block(host);
        }
        access
    }

    pub fn is_blocked(&self, host: &str) -> bool {
        self.blocked.contains(host)
    }

    /// Returns false if the host was already blocked.
    pub fn block(&self, host: impl Into<String>) -> bool {
        let host = host.into();
        tracing::info!(host = %host, "Host blocked");
        self.blocked.insert(host)
    }

    /// Returns false if the host was not blocked.
    pub fn unblock(&self, host: &str) -> bool {
        let removed = self.blocked.remove(host).is_some();
        if removed {
            tracing::info!(host = %host, "Host unblocked");
        }
        removed
    }

    /// Blocked hosts, sorted.
    pub fn blocked_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.blocked.iter().map(|h| h.key().clone()).collect();
        hosts.sort();
        hosts
    }

    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_and_unblock() {
        let access = AccessControl::new();
        assert!(!access.is_blocked("b.com"));

        assert!(access.block("b.com"));
        assert!(!access.block("b.com"));
        assert!(access.is_blocked("b.com"));

        assert!(access.unblock("b.com"));
        assert!(!access.unblock("b.com"));
        assert!(!access.is_blocked("b.com"));
    }

    #[test]
    fn test_exact_match_only() {
        let access = AccessControl::with_blocked(["ads.example.com"]);
        assert!(access.is_blocked("ads.example.com"));
        assert!(!access.is_blocked("example.com"));
        assert!(!access.is_blocked("x.ads.example.com"));
        assert!(!access.is_blocked("ADS.EXAMPLE.COM"));
    }

    #[test]
    fn test_clones_share_state() {
        let console_side = AccessControl::new();
        let relay_side = console_side.clone();
        console_side.block("b.com");
        assert!(relay_side.is_blocked("b.com"));
        assert_eq!(relay_side.blocked_hosts(), vec!["b.com".to_string()]);
    }
}
