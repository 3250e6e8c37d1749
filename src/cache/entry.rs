//! Cached response entries.

use std::time::{Duration, SystemTime};

/// A fully materialized origin response.
///
/// Never mutated after construction; `expiry >= created` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    status_line: String,
    headers: Vec<String>,
    body: Vec<u8>,
    created: SystemTime,
    expiry: SystemTime,
}

impl CachedEntry {
    /// Build an entry that stays fresh for `ttl` after `created`.
    pub fn new(
        status_line: String,
        headers: Vec<String>,
        body: Vec<u8>,
        created: SystemTime,
        ttl: Duration,
    ) -> Self {
        let expiry = created.checked_add(ttl).unwrap_or(created);
        Self {
            status_line,
            headers,
            body,
            created,
            expiry,
        }
    }

    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    /// Header lines in origin order, without the blank terminator.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn created(&self) -> SystemTime {
        self.created
    }

    pub fn expiry(&self) -> SystemTime {
        self.expiry
    }

    /// Stale once `expiry <= now`.
    pub fn is_fresh_at(&self, now: SystemTime) -> bool {
        self.expiry > now
    }

    /// Time left before the entry goes stale, `None` if it already has.
    pub fn remaining_at(&self, now: SystemTime) -> Option<Duration> {
        self.expiry
            .duration_since(now)
            .ok()
            .filter(|left| !left.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(created: SystemTime, ttl: Duration) -> CachedEntry {
        CachedEntry::new(
            "HTTP/1.1 200 OK".into(),
            vec!["Content-Length: 2".into()],
            b"ok".to_vec(),
            created,
            ttl,
        )
    }

    #[test]
    fn test_freshness_window() {
        let now = SystemTime::now();
        let e = entry(now, Duration::from_secs(30));
        assert!(e.expiry() >= e.created());
        assert!(e.is_fresh_at(now));
        assert!(e.is_fresh_at(now + Duration::from_secs(29)));
        assert!(!e.is_fresh_at(now + Duration::from_secs(30)));
        assert_eq!(e.remaining_at(now), Some(Duration::from_secs(30)));
        assert_eq!(e.remaining_at(now + Duration::from_secs(31)), None);
    }

    #[test]
    fn test_zero_ttl_is_stale() {
        let now = SystemTime::now();
        let e = entry(now, Duration::ZERO);
        assert!(!e.is_fresh_at(now));
    }
}
