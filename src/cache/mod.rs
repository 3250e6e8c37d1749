//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! GET request
//!     → store.rs (lookup by absolute URL, lazy expiry)
//!     → hit: replay entry.rs verbatim
//!     → miss: relay from origin while capturing
//!         → policy.rs (eligible? TTL?)
//!         → store.rs (publish new entry, last write wins)
//!
//! Background:
//!     sweeper.rs → store.rs purge_expired() on an interval
//! ```
//!
//! # Design Decisions
//! - Entries are immutable and shared as `Arc`; a refresh replaces the slot
//! - Expired entries read as absent but stay until swept or overwritten
//! - Cacheability is decided by the relay via policy.rs, not by the store

pub mod entry;
pub mod policy;
pub mod store;
pub mod sweeper;

pub use entry::CachedEntry;
pub use store::ResponseCache;
pub use sweeper::CacheSweeper;
