//! Request line parsing.
//!
//! # Responsibilities
//! - Split the first line of a proxy request into method, target and version
//! - Resolve the origin host and port from an absolute `http://` target
//! - Rebuild the origin-relative request line sent upstream
//!
//! # Design Decisions
//! - Tokens are separated by single spaces; nothing is normalized
//! - Only the literal `http://` scheme prefix is recognised
//! - A bare path is accepted with no host; the relay rejects it

use std::fmt;

use thiserror::Error;

/// Port used when the target does not name one.
pub const DEFAULT_PORT: u16 = 80;

const HTTP_SCHEME: &str = "http://";

/// Request line parse failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Fewer than three tokens.
    #[error("bad request line: {0}")]
    MalformedRequestLine(String),
    /// Non-numeric (or out of range) port segment.
    #[error("bad port in: {0}")]
    InvalidPort(String),
}

/// A decoded request line. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    method: String,
    host: Option<String>,
    port: u16,
    path: String,
    version: String,
}

impl ParsedRequest {
    /// Parse a request line with its terminator already removed.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut tokens: Vec<&str> = line.split(' ').collect();
        while tokens.last() == Some(&"") {
            tokens.pop();
        }
        if tokens.len() < 3 {
            return Err(ParseError::MalformedRequestLine(line.to_string()));
        }

        let method = tokens[0].to_uppercase();
        let target = tokens[1];
        let version = tokens[2].to_string();

        if method == "CONNECT" {
            let (host, port) = split_host_port(target)?;
            return Ok(Self {
                method,
                host: Some(host),
                port,
                path: String::new(),
                version,
            });
        }

        if let Some(rest) = target.strip_prefix(HTTP_SCHEME) {
            let (host_port, path) = match rest.find('/') {
                Some(slash) => (&rest[..slash], rest[slash..].to_string()),
                None => (rest, "/".to_string()),
            };
            let (host, port) = split_host_port(host_port)?;
            return Ok(Self {
                method,
                host: Some(host),
                port,
                path,
                version,
            });
        }

        Ok(Self {
            method,
            host: None,
            port: DEFAULT_PORT,
            path: target.to_string(),
            version,
        })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Origin host, absent for a relative target.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn is_connect(&self) -> bool {
        self.method == "CONNECT"
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    /// The line sent to the origin: `METHOD /path VERSION`.
    pub fn relative_request_line(&self) -> String {
        format!("{} {} {}", self.method, self.path, self.version)
    }

    /// `host` or `host:port` when the port is not the default.
    pub fn authority(&self) -> Option<String> {
        self.host.as_ref().map(|host| {
            if self.port == DEFAULT_PORT {
                host.clone()
            } else {
                format!("{}:{}", host, self.port)
            }
        })
    }

    /// Value for a synthesized `Host` header.
    pub fn host_header(&self) -> Option<String> {
        self.authority().map(|authority| format!("Host: {}", authority))
    }

    /// Normalized absolute URL, also used as the cache key.
    pub fn absolute_url(&self) -> Option<String> {
        self.authority()
            .map(|authority| format!("{}{}{}", HTTP_SCHEME, authority, self.path))
    }
}

impl fmt::Display for ParsedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.absolute_url() {
            Some(url) => write!(f, "{} {}", self.method, url),
            None => write!(f, "{} {}", self.method, self.path),
        }
    }
}

/// Split `host[:port]` at the rightmost colon.
fn split_host_port(host_port: &str) -> Result<(String, u16), ParseError> {
    match host_port.rfind(':') {
        None => Ok((host_port.to_string(), DEFAULT_PORT)),
        Some(colon) => {
            let port = host_port[colon + 1..]
                .parse::<u16>()
                .map_err(|_| ParseError::InvalidPort(host_port.to_string()))?;
            Ok((host_port[..colon].to_string(), port))
        }
    }
}
