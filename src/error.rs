//! Error types for the relay path.
//!
//! Every failure a single connection can hit is one of these variants. The
//! relay maps each to the response the client should see (if any).

use thiserror::Error;

use crate::http::request::ParseError;

/// Failure of a single relay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The request line did not have method, target and version.
    #[error("malformed request line: {0}")]
    MalformedRequestLine(String),

    /// The port segment of the target was not a number.
    #[error("invalid port in: {0}")]
    InvalidPort(String),

    /// CONNECT tunnelling is not supported.
    #[error("method not supported: {0}")]
    UnsupportedMethod(String),

    /// The target was a bare path; the origin cannot be determined.
    #[error("no host in request")]
    MissingHost,

    /// The target host is on the blocklist.
    #[error("host is blocked: {0}")]
    AccessDenied(String),

    /// The origin could not be connected to.
    #[error("could not reach {host}:{port}: {source}")]
    OriginUnreachable {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The origin closed before sending a status line.
    #[error("empty response from origin")]
    EmptyOriginResponse,

    /// A single line ran past the configured limit.
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    /// The client's request line or header block ran past its limits.
    #[error("request head too large: {0}")]
    RequestHeadTooLarge(String),

    /// The origin's status line or header block ran past its limits.
    #[error("response head too large: {0}")]
    ResponseHeadTooLarge(String),

    /// A connect or read exceeded its deadline.
    #[error("timed out while {0}")]
    Timeout(&'static str),

    /// Any other I/O failure mid-relay.
    #[error("stream error: {0}")]
    Stream(#[from] std::io::Error),
}

impl RelayError {
    /// Status code and reason phrase the client should receive, if any.
    ///
    /// `Stream` has none: by the time it happens the response channel may
    /// already carry a partial response.
    pub fn status(&self) -> Option<(u16, &'static str)> {
        match self {
            RelayError::MalformedRequestLine(_)
            | RelayError::InvalidPort(_)
            | RelayError::MissingHost
            | RelayError::RequestHeadTooLarge(_) => Some((400, "Bad Request")),
            RelayError::AccessDenied(_) => Some((403, "Forbidden")),
            RelayError::UnsupportedMethod(_) => Some((501, "Not Implemented")),
            RelayError::OriginUnreachable { .. }
            | RelayError::EmptyOriginResponse
            | RelayError::LineTooLong(_)
            | RelayError::ResponseHeadTooLarge(_) => Some((502, "Bad Gateway")),
            RelayError::Timeout(_) => Some((504, "Gateway Timeout")),
            RelayError::Stream(_) => None,
        }
    }
}

impl From<ParseError> for RelayError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::MalformedRequestLine(line) => RelayError::MalformedRequestLine(line),
            ParseError::InvalidPort(hp) => RelayError::InvalidPort(hp),
        }
    }
}

/// Result type alias using RelayError.
pub type Result<T> = std::result::Result<T, RelayError>;
