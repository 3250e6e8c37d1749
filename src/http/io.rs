//! Line and body transfer primitives.
//!
//! All reads go through the same buffered reader that owns the socket, so a
//! line read never loses the body bytes behind it. Every read carries its own
//! deadline; hitting it yields `RelayError::Timeout`.
//!
//! Header lines are decoded as ISO-8859-1 so that any byte sequence survives
//! the decode/encode round trip unchanged.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{RelayError, Result};

const COPY_BUF_SIZE: usize = 8 * 1024;

/// Decode bytes one-to-one into chars.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Inverse of [`decode_latin1`]; chars outside the range become `?`.
pub fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Optional copy of everything relayed, bounded in size.
///
/// Exceeding the bound drops the buffer for good; the relay itself carries on.
#[derive(Debug)]
pub struct BodyCapture {
    buf: Option<Vec<u8>>,
    max_bytes: usize,
}

impl BodyCapture {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buf: Some(Vec::new()),
            max_bytes,
        }
    }

    pub fn disabled() -> Self {
        Self {
            buf: None,
            max_bytes: 0,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        if let Some(buf) = self.buf.as_mut() {
            if buf.len() + data.len() > self.max_bytes {
                self.buf = None;
            } else {
                buf.extend_from_slice(data);
            }
        }
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        self.buf
    }
}

/// Read one line of at most `max_len` bytes, stripping its CRLF (or bare LF).
///
/// Returns `None` on a clean end of stream. A final unterminated line is
/// returned as-is. Nothing past `max_len` plus the terminator is buffered;
/// a longer line fails with `RelayError::LineTooLong`.
pub async fn read_line<R>(
    reader: &mut R,
    limit: Duration,
    max_len: usize,
) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let cap = max_len.saturating_add(2);
    let mut raw = Vec::new();
    let mut bounded = (&mut *reader).take(cap as u64);
    let n = timeout(limit, bounded.read_until(b'\n', &mut raw))
        .await
        .map_err(|_| RelayError::Timeout("reading a line"))??;
    if n == 0 {
        return Ok(None);
    }
    if raw.last() == Some(&b'\n') {
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
    } else if n >= cap {
        return Err(RelayError::LineTooLong(max_len));
    }
    if raw.len() > max_len {
        return Err(RelayError::LineTooLong(max_len));
    }
    Ok(Some(decode_latin1(&raw)))
}

/// Write `line` followed by CRLF.
pub async fn write_line<W>(writer: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = encode_latin1(line);
    bytes.extend_from_slice(b"\r\n");
    writer.write_all(&bytes).await?;
    Ok(())
}

async fn emit_line<W>(writer: &mut W, capture: &mut BodyCapture, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = encode_latin1(line);
    bytes.extend_from_slice(b"\r\n");
    writer.write_all(&bytes).await?;
    capture.push(&bytes);
    Ok(())
}

/// Copy exactly `len` bytes, stopping early if the source closes first.
///
/// Returns the number of bytes copied.
pub async fn copy_exact<R, W>(
    reader: &mut R,
    writer: &mut W,
    len: u64,
    limit: Duration,
    capture: &mut BodyCapture,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut left = len;
    while left > 0 {
        let want = left.min(COPY_BUF_SIZE as u64) as usize;
        let got = timeout(limit, reader.read(&mut buf[..want]))
            .await
            .map_err(|_| RelayError::Timeout("reading a body"))??;
        if got == 0 {
            break;
        }
        writer.write_all(&buf[..got]).await?;
        capture.push(&buf[..got]);
        left -= got as u64;
    }
    Ok(len - left)
}

/// Copy until the source closes (close-delimited framing).
pub async fn copy_to_end<R, W>(
    reader: &mut R,
    writer: &mut W,
    limit: Duration,
    capture: &mut BodyCapture,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut total = 0u64;
    loop {
        let got = timeout(limit, reader.read(&mut buf))
            .await
            .map_err(|_| RelayError::Timeout("reading a body"))??;
        if got == 0 {
            return Ok(total);
        }
        writer.write_all(&buf[..got]).await?;
        capture.push(&buf[..got]);
        total += got as u64;
    }
}

/// Relay a chunked body, preserving its framing byte for byte.
///
/// A malformed chunk-size line ends the relay after forwarding it. Returns
/// whether the terminal zero-size chunk was seen.
pub async fn relay_chunked<R, W>(
    reader: &mut R,
    writer: &mut W,
    limit: Duration,
    max_line: usize,
    capture: &mut BodyCapture,
) -> Result<bool>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let Some(size_line) = read_line(reader, limit, max_line).await? else {
            return Ok(false);
        };
        emit_line(writer, capture, &size_line).await?;

        let hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = match u64::from_str_radix(hex, 16) {
            Ok(size) => size,
            Err(_) => {
                tracing::debug!(line = %size_line, "Malformed chunk size, ending relay");
                return Ok(false);
            }
        };

        if size == 0 {
            // Trailer fields, if any, then the terminating blank line.
            while let Some(line) = read_line(reader, limit, max_line).await? {
                emit_line(writer, capture, &line).await?;
                if line.is_empty() {
                    break;
                }
            }
            return Ok(true);
        }

        copy_exact(reader, writer, size, limit, capture).await?;

        if let Some(after) = read_line(reader, limit, max_line).await? {
            emit_line(writer, capture, &after).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: Duration = Duration::from_secs(1);
    const MAX_LINE: usize = 64;

    #[tokio::test]
    async fn test_read_line_keeps_following_bytes() {
        let mut input: &[u8] = b"GET / HTTP/1.1\r\n\x00\xffbody";
        let line = read_line(&mut input, LIMIT, MAX_LINE).await.unwrap();
        assert_eq!(line.as_deref(), Some("GET / HTTP/1.1"));
        assert_eq!(input, b"\x00\xffbody");
    }

    #[tokio::test]
    async fn test_read_line_end_of_stream() {
        let mut input: &[u8] = b"partial";
        assert_eq!(
            read_line(&mut input, LIMIT, MAX_LINE).await.unwrap().as_deref(),
            Some("partial")
        );
        assert_eq!(read_line(&mut input, LIMIT, MAX_LINE).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_line_length_bound() {
        let exact = format!("{}\r\nnext", "a".repeat(MAX_LINE));
        let mut input: &[u8] = exact.as_bytes();
        let line = read_line(&mut input, LIMIT, MAX_LINE).await.unwrap().unwrap();
        assert_eq!(line.len(), MAX_LINE);
        assert_eq!(input, b"next");

        let over = format!("X-Junk: {}\r\n", "a".repeat(4 * MAX_LINE));
        let mut input: &[u8] = over.as_bytes();
        let err = read_line(&mut input, LIMIT, MAX_LINE).await.unwrap_err();
        assert!(matches!(err, RelayError::LineTooLong(MAX_LINE)));
        // Only the bounded prefix was consumed.
        assert_eq!(input.len(), over.len() - (MAX_LINE + 2));

        let bare_lf = format!("{}\n", "a".repeat(MAX_LINE + 1));
        let mut input: &[u8] = bare_lf.as_bytes();
        assert!(read_line(&mut input, LIMIT, MAX_LINE).await.is_err());
    }

    #[tokio::test]
    async fn test_chunk_size_line_bounded() {
        let wire = format!("{}\r\n", "f".repeat(MAX_LINE * 2));
        let mut input: &[u8] = wire.as_bytes();
        let mut out = Vec::new();
        let mut capture = BodyCapture::disabled();
        let err = relay_chunked(&mut input, &mut out, LIMIT, MAX_LINE, &mut capture)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::LineTooLong(_)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_latin1_round_trip() {
        let raw: Vec<u8> = (0u8..=255).filter(|b| *b != b'\n').collect();
        let text = decode_latin1(&raw);
        assert_eq!(encode_latin1(&text), raw);
    }

    #[tokio::test]
    async fn test_copy_exact_stops_at_eof() {
        let mut input: &[u8] = b"abc";
        let mut out = Vec::new();
        let mut capture = BodyCapture::disabled();
        let n = copy_exact(&mut input, &mut out, 10, LIMIT, &mut capture)
            .await
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(out, b"abc");
    }

    #[tokio::test]
    async fn test_copy_exact_leaves_rest() {
        let mut input: &[u8] = b"hello world";
        let mut out = Vec::new();
        let mut capture = BodyCapture::new(1024);
        copy_exact(&mut input, &mut out, 5, LIMIT, &mut capture)
            .await
            .unwrap();
        assert_eq!(out, b"hello");
        assert_eq!(input, b" world");
        assert_eq!(capture.into_bytes().unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_copy_to_end() {
        let mut input: &[u8] = b"until close";
        let mut out = Vec::new();
        let mut capture = BodyCapture::new(4);
        let n = copy_to_end(&mut input, &mut out, LIMIT, &mut capture)
            .await
            .unwrap();
        assert_eq!(n, 11);
        assert_eq!(out, b"until close");
        // Over the bound, so nothing is kept.
        assert!(capture.into_bytes().is_none());
    }

    #[tokio::test]
    async fn test_chunked_preserves_framing() {
        let wire = b"5\r\nhello\r\n0\r\n\r\n";
        let mut input: &[u8] = wire;
        let mut out = Vec::new();
        let mut capture = BodyCapture::new(1024);
        let complete = relay_chunked(&mut input, &mut out, LIMIT, MAX_LINE, &mut capture)
            .await
            .unwrap();
        assert!(complete);
        assert_eq!(out, wire);
        assert_eq!(capture.into_bytes().unwrap(), wire);
    }

    #[tokio::test]
    async fn test_chunked_extension_and_trailers() {
        let wire = b"3;name=v\r\nabc\r\n0\r\nX-Trailer: 1\r\n\r\n";
        let mut input: &[u8] = wire;
        let mut out = Vec::new();
        relay_chunked(&mut input, &mut out, LIMIT, MAX_LINE, &mut BodyCapture::disabled())
            .await
            .unwrap();
        assert_eq!(out, wire);
    }

    #[tokio::test]
    async fn test_chunked_bad_size_stops() {
        let mut input: &[u8] = b"zz\r\nignored";
        let mut out = Vec::new();
        let mut capture = BodyCapture::disabled();
        let complete = relay_chunked(&mut input, &mut out, LIMIT, MAX_LINE, &mut capture)
            .await
            .unwrap();
        assert!(!complete);
        assert_eq!(out, b"zz\r\n");
    }
}
