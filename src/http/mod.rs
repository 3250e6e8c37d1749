//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, one task per connection)
//!     → relay.rs (per-connection state machine)
//!         → request.rs (parse request line)
//!         → io.rs (line reads, body copies, chunked framing)
//!         → response.rs (error pages, status token, framing detection)
//!     → Send to client
//! ```

pub mod io;
pub mod relay;
pub mod request;
pub mod response;
pub mod server;

pub use relay::ConnectionRelay;
pub use request::{ParseError, ParsedRequest};
pub use server::{HeadLimits, ProxyServer, ProxyState, RelayTimeouts};
