//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (acquire worker slot, then accept)
//!     → connection.rs (lifecycle tracking for drain on shutdown)
//!     → Hand off to the relay
//! ```
//!
//! # Design Decisions
//! - A slot is taken before accept, so excess clients wait in the backlog
//! - Each connection tracked for graceful shutdown

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
