//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     Ctrl+C → wait_for_signal returns
//!
//! Shutdown (shutdown.rs):
//!     trigger → accept loop stops → relays drain → sinks flush → exit
//! ```
//!
//! # Design Decisions
//! - One broadcast channel reaches every long-running task
//! - Drain has a deadline; relays still running after it are abandoned

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
