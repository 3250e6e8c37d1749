//! Administration subsystem.
//!
//! # Data Flow
//! ```text
//! stdin line
//!     → commands.rs (parse into AdminCommand)
//!     → console.rs (execute against the shared blocklist, cache and stats)
//!     → reply text on stdout
//! ```
//!
//! # Design Decisions
//! - Parsing and execution are synchronous and return text, so both are unit-tested
//! - Only the console loop touches stdin/stdout
//! - The console holds the same handles the relays use; changes apply to the next request

pub mod commands;
pub mod console;

pub use commands::AdminCommand;
pub use console::Console;
