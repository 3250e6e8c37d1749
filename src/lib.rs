//! Caching forward HTTP/1.1 proxy.
//!
//! Browsers send absolute-URI requests; the proxy rewrites them to origin
//! form, relays the response byte for byte, and keeps a host blocklist and a
//! response cache in front of the origin.

pub mod admin;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use cache::ResponseCache;
pub use config::ProxyConfig;
pub use error::RelayError;
pub use http::{ProxyServer, ProxyState};
pub use lifecycle::Shutdown;
pub use security::AccessControl;
