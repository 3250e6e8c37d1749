//! Response-side helpers.
//!
//! # Responsibilities
//! - Synthesize error pages for failures the proxy answers itself
//! - Pull the status code out of an origin status line
//! - Detect body framing from origin response headers
//!
//! # Design Decisions
//! - Error pages always carry `Content-Length` and `Connection: close`
//! - Origin status and header lines are never rewritten, only inspected

/// Placeholder status used for logging when the status line is malformed.
pub const UNKNOWN_STATUS: &str = "???";

/// Build a complete `text/html` error response.
pub fn error_response(status: u16, reason: &str, detail: &str) -> Vec<u8> {
    let page = format!(
        "<html><body><h1>{} {}</h1><p>{}</p></body></html>",
        status, reason, detail
    );
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\
         Connection: close\r\n\r\n{}",
        status,
        reason,
        page.len(),
        page
    )
    .into_bytes()
}

/// Escape text for inclusion in an error page.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Second space-separated token of a status line, or the placeholder.
pub fn status_token(status_line: &str) -> &str {
    let mut parts = status_line.splitn(3, ' ');
    parts.next();
    match parts.next() {
        Some(code) if !code.is_empty() => code,
        _ => UNKNOWN_STATUS,
    }
}

/// Whether a response to `method` with `status` can carry a body.
///
/// Responses to HEAD, and 1xx, 204 and 304 responses, end at the header block
/// whatever their framing headers say.
pub fn response_has_body(method: &str, status: &str) -> bool {
    if method.eq_ignore_ascii_case("HEAD") {
        return false;
    }
    match status.parse::<u16>() {
        Ok(code) => !(100..200).contains(&code) && code != 204 && code != 304,
        Err(_) => true,
    }
}

/// How the origin delimits the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    Chunked,
    Length(u64),
    CloseDelimited,
}

/// Accumulates framing hints while response headers stream past.
#[derive(Debug, Default)]
pub struct FramingDetector {
    content_length: Option<u64>,
    chunked: bool,
}

impl FramingDetector {
    pub fn observe(&mut self, header: &str) {
        let Some((name, value)) = header.split_once(':') else {
            return;
        };
        let name = name.trim();
        if name.eq_ignore_ascii_case("content-length") {
            if let Ok(len) = value.trim().parse::<u64>() {
                self.content_length = Some(len);
            }
        } else if name.eq_ignore_ascii_case("transfer-encoding")
            && value.to_ascii_lowercase().contains("chunked")
        {
            self.chunked = true;
        }
    }

    /// Chunked wins over a content length.
    pub fn framing(&self) -> BodyFraming {
        if self.chunked {
            BodyFraming::Chunked
        } else if let Some(len) = self.content_length {
            BodyFraming::Length(len)
        } else {
            BodyFraming::CloseDelimited
        }
    }
}
