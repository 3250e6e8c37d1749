//! Cacheability and freshness policy.
//!
//! # Responsibilities
//! - Decide whether a relayed response may be stored
//! - Derive its freshness lifetime from the origin headers
//!
//! # Rules
//! - Only `GET` with status `200` and no `no-store` directive is eligible
//! - `s-maxage` beats `max-age`; either beats `Expires`
//! - An `Expires` in the past (or unparsable) means already stale
//! - Otherwise the configured default TTL applies

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::CacheConfig;
use crate::http::request::ParsedRequest;

/// Upper bound on any computed lifetime.
const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct CachePolicy {
    enabled: bool,
    default_ttl: Duration,
    max_entry_bytes: usize,
}

impl CachePolicy {
    pub fn new(enabled: bool, default_ttl: Duration, max_entry_bytes: usize) -> Self {
        Self {
            enabled,
            default_ttl,
            max_entry_bytes,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.enabled,
            Duration::from_secs(config.default_ttl_secs),
            config.max_entry_bytes,
        )
    }

    pub fn max_entry_bytes(&self) -> usize {
        self.max_entry_bytes
    }

    /// May the request be answered from, or stored into, the cache at all?
    pub fn is_cacheable_request(&self, request: &ParsedRequest) -> bool {
        self.enabled && request.is_get()
    }

    /// Is this origin response eligible for storage?
    pub fn is_storable(&self, request: &ParsedRequest, status: &str, headers: &[String]) -> bool {
        self.is_cacheable_request(request)
            && status == "200"
            && !cache_control(headers).any(|d| d.eq_ignore_ascii_case("no-store"))
    }

    /// How long a stored response stays fresh.
    pub fn freshness_lifetime(&self, headers: &[String], now: DateTime<Utc>) -> Duration {
        let ttl = max_age(headers)
            .map(Duration::from_secs)
            .or_else(|| header_values(headers, "expires").next().map(|v| until_expires(v, now)))
            .unwrap_or(self.default_ttl);
        ttl.min(MAX_TTL)
    }
}

fn header_values<'a>(headers: &'a [String], name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    headers.iter().filter_map(move |line| {
        let (n, v) = line.split_once(':')?;
        n.trim().eq_ignore_ascii_case(name).then(|| v.trim())
    })
}

fn cache_control<'a>(headers: &'a [String]) -> impl Iterator<Item = &'a str> + 'a {
    header_values(headers, "cache-control")
        .flat_map(|v| v.split(','))
        .map(str::trim)
}

fn max_age(headers: &[String]) -> Option<u64> {
    let mut max_age = None;
    let mut s_maxage = None;
    for directive in cache_control(headers) {
        let Some((name, value)) = directive.split_once('=') else {
            continue;
        };
        let Ok(secs) = value.trim().trim_matches('"').parse::<u64>() else {
            continue;
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "s-maxage" => s_maxage = Some(secs),
            "max-age" => max_age = Some(secs),
            _ => {}
        }
    }
    s_maxage.or(max_age)
}

fn until_expires(value: &str, now: DateTime<Utc>) -> Duration {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .and_then(|at| (at.with_timezone(&Utc) - now).to_std().ok())
        .unwrap_or(Duration::ZERO)
}
