//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Parsed request (host known)
//!     → access_control.rs (exact-match blocklist)
//!     → blocked: 403, no origin connection
//!     → allowed: continue to cache / origin
//! ```
//!
//! # Design Decisions
//! - Checked before any origin connection is attempted
//! - Exact string match, no wildcard or suffix rules
//! - Mutated only through the administration console

pub mod access_control;

pub use access_control::AccessControl;
