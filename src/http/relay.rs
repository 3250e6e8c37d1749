//! Per-connection relay engine.
//!
//! # States
//! ```text
//! ReadRequestLine → RejectUnsupported → ReadHeaders → AccessCheck
//!     → CacheCheck (GET) ──hit──→ replay entry → Close
//!     → Connect → ForwardRequest → ReadStatusLine → ReadResponseHeaders
//!     → RelayBody (chunked | length | close-delimited) → CacheStore → Close
//! ```
//!
//! Every failure ends the machine with a `RelayError`. If nothing has been
//! written to the client yet and the error has a status, an error page is sent;
//! otherwise the connection is just dropped. Both sockets are owned by the
//! relay and closed when it returns, whatever state it reached.
//!
//! Request and response heads are bounded by `HeadLimits`. The origin head is
//! read in full before any of it reaches the client, so an oversized or
//! malformed head can still be answered with `502`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use chrono::Utc;
use tokio::io::{AsyncBufRead, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::cache::CachedEntry;
use crate::error::{RelayError, Result};
use crate::http::io::{copy_exact, copy_to_end, read_line, relay_chunked, write_line, BodyCapture};
use crate::http::request::ParsedRequest;
use crate::http::response::{
    error_response, html_escape, response_has_body, status_token, BodyFraming, FramingDetector,
};
use crate::http::server::{HeadLimits, ProxyState};
use crate::observability::metrics;
use crate::observability::{Outcome, RequestRecord};

/// Client side of the relay.
struct ClientConn {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    /// Set once any response byte may have reached the client.
    response_started: bool,
}

/// Request headers as they will be sent upstream.
#[derive(Debug, Default)]
struct RequestHead {
    lines: Vec<String>,
    body_len: Option<u64>,
}

/// Origin status line and headers, read before anything is forwarded.
#[derive(Debug)]
struct ResponseHead {
    status_line: String,
    headers: Vec<String>,
    /// False if the origin closed before the blank line.
    terminated: bool,
}

/// Running size of one head against its limits.
struct HeadBudget {
    limits: HeadLimits,
    headers: usize,
    bytes: usize,
}

impl HeadBudget {
    fn new(limits: HeadLimits, first_line: &str) -> Self {
        Self {
            limits,
            headers: 0,
            bytes: first_line.len() + 2,
        }
    }

    /// Account for one header line; the error names the limit it broke.
    fn admit(&mut self, line: &str) -> std::result::Result<(), String> {
        self.headers += 1;
        self.bytes += line.len() + 2;
        if self.headers > self.limits.max_headers {
            return Err(format!("more than {} header lines", self.limits.max_headers));
        }
        if self.bytes > self.limits.max_head_bytes {
            return Err(format!("head over {} bytes", self.limits.max_head_bytes));
        }
        Ok(())
    }
}

/// Over-long lines from the client are the client's fault.
fn request_side(err: RelayError) -> RelayError {
    match err {
        RelayError::LineTooLong(max) => {
            RelayError::RequestHeadTooLarge(format!("line over {} bytes", max))
        }
        other => other,
    }
}

/// Over-long lines from the origin make its head unusable.
fn response_side(err: RelayError) -> RelayError {
    match err {
        RelayError::LineTooLong(max) => {
            RelayError::ResponseHeadTooLarge(format!("line over {} bytes", max))
        }
        other => other,
    }
}

/// Drives one client connection from request line to close.
pub struct ConnectionRelay {
    state: ProxyState,
    peer: SocketAddr,
    started: Instant,
}

impl ConnectionRelay {
    pub fn new(state: ProxyState, peer: SocketAddr) -> Self {
        Self {
            state,
            peer,
            started: Instant::now(),
        }
    }

    /// Run to completion. Never fails; errors are answered or logged here.
    pub async fn run(self, stream: TcpStream) {
        let (read_half, write_half) = stream.into_split();
        let mut client = ClientConn {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            response_started: false,
        };

        if let Err(err) = self.serve(&mut client).await {
            self.fail(&mut client, err).await;
        }

        let _ = client.writer.shutdown().await;
    }

    async fn serve(&self, client: &mut ClientConn) -> Result<()> {
        let read_timeout = self.state.timeouts.read;
        let max_line = self.state.limits.max_line;

        let line = read_line(&mut client.reader, read_timeout, max_line)
            .await
            .map_err(request_side)?;
        let Some(line) = line else {
            return Ok(());
        };
        if line.is_empty() {
            return Ok(());
        }

        let request = ParsedRequest::parse(&line)?;
        tracing::debug!(request = %request, "Request parsed");
        if request.is_connect() {
            return Err(RelayError::UnsupportedMethod(request.method().to_string()));
        }
        let Some(host) = request.host() else {
            return Err(RelayError::MissingHost);
        };

        let head = self
            .read_request_head(client, &request, &line)
            .await
            .map_err(request_side)?;

        if self.state.access.is_blocked(host) {
            self.record(&request, "403", Outcome::Blocked);
            return Err(RelayError::AccessDenied(host.to_string()));
        }

        let cache_key = if self.state.policy.is_cacheable_request(&request) {
            request.absolute_url()
        } else {
            None
        };
        if let Some(entry) = cache_key.as_deref().and_then(|key| self.state.cache.lookup(key)) {
            return self.replay(client, &request, entry).await;
        }

        let origin = self.connect(host, request.port()).await?;
        self.forward(client, origin, &request, head, cache_key).await
    }

    /// Read client headers, rewriting `Proxy-Connection` and filling in `Host`.
    async fn read_request_head(
        &self,
        client: &mut ClientConn,
        request: &ParsedRequest,
        request_line: &str,
    ) -> Result<RequestHead> {
        let mut head = RequestHead::default();
        let mut budget = HeadBudget::new(self.state.limits, request_line);
        let mut saw_host = false;
        let mut content_length: Option<i64> = None;

        let (read_timeout, max_line) = (self.state.timeouts.read, self.state.limits.max_line);
        while let Some(line) = read_line(&mut client.reader, read_timeout, max_line).await? {
            if line.is_empty() {
                break;
            }
            budget.admit(&line).map_err(RelayError::RequestHeadTooLarge)?;

            let name = line.split_once(':').map(|(n, _)| n.trim()).unwrap_or_default();
            if name.eq_ignore_ascii_case("proxy-connection") {
                head.lines.push("Connection: close".to_string());
                continue;
            }
            if name.eq_ignore_ascii_case("host") {
                saw_host = true;
            }
            if name.eq_ignore_ascii_case("content-length") && content_length.is_none() {
                content_length = line
                    .split_once(':')
                    .and_then(|(_, v)| v.trim().parse::<i64>().ok());
            }
            head.lines.push(line);
        }

        if !saw_host {
            if let Some(host_header) = request.host_header() {
                head.lines.push(host_header);
            }
        }
        head.body_len = content_length.and_then(|n| u64::try_from(n).ok()).filter(|n| *n > 0);
        Ok(head)
    }

    /// Serve a fresh cached entry without touching the origin.
    async fn replay(
        &self,
        client: &mut ClientConn,
        request: &ParsedRequest,
        entry: Arc<CachedEntry>,
    ) -> Result<()> {
        client.response_started = true;
        write_line(&mut client.writer, entry.status_line()).await?;
        for header in entry.headers() {
            write_line(&mut client.writer, header).await?;
        }
        write_line(&mut client.writer, "").await?;
        client.writer.write_all(entry.body()).await?;
        client.writer.flush().await?;

        self.record(request, status_token(entry.status_line()), Outcome::Hit);
        Ok(())
    }

    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream> {
        match timeout(self.state.timeouts.connect, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                tracing::debug!(host, port, "Connected to origin");
                Ok(stream)
            }
            Ok(Err(source)) => Err(RelayError::OriginUnreachable {
                host: host.to_string(),
                port,
                source,
            }),
            Err(_) => Err(RelayError::Timeout("connecting to origin")),
        }
    }

    /// Read the origin's status line and headers within the head limits.
    async fn read_response_head<R>(&self, reader: &mut R) -> Result<ResponseHead>
    where
        R: AsyncBufRead + Unpin,
    {
        let (read_timeout, max_line) = (self.state.timeouts.read, self.state.limits.max_line);

        let status_line = read_line(reader, read_timeout, max_line)
            .await
            .map_err(response_side)?;
        let Some(status_line) = status_line else {
            return Err(RelayError::EmptyOriginResponse);
        };

        let mut budget = HeadBudget::new(self.state.limits, &status_line);
        let mut headers = Vec::new();
        let mut terminated = false;
        loop {
            let line = read_line(reader, read_timeout, max_line)
                .await
                .map_err(response_side)?;
            let Some(line) = line else {
                break;
            };
            if line.is_empty() {
                terminated = true;
                break;
            }
            budget.admit(&line).map_err(RelayError::ResponseHeadTooLarge)?;
            headers.push(line);
        }

        Ok(ResponseHead {
            status_line,
            headers,
            terminated,
        })
    }

    /// Send the request upstream and stream the response back.
    async fn forward(
        &self,
        client: &mut ClientConn,
        origin: TcpStream,
        request: &ParsedRequest,
        head: RequestHead,
        cache_key: Option<String>,
    ) -> Result<()> {
        let read_timeout = self.state.timeouts.read;
        let max_line = self.state.limits.max_line;
        let (origin_read, origin_write) = origin.into_split();
        let mut origin_reader = BufReader::new(origin_read);
        let mut origin_writer = BufWriter::new(origin_write);

        write_line(&mut origin_writer, &request.relative_request_line()).await?;
        for line in &head.lines {
            write_line(&mut origin_writer, line).await?;
        }
        write_line(&mut origin_writer, "").await?;
        if let Some(len) = head.body_len {
            copy_exact(
                &mut client.reader,
                &mut origin_writer,
                len,
                read_timeout,
                &mut BodyCapture::disabled(),
            )
            .await?;
        }
        origin_writer.flush().await?;

        let response = self.read_response_head(&mut origin_reader).await?;
        let status = status_token(&response.status_line).to_string();

        client.response_started = true;
        write_line(&mut client.writer, &response.status_line).await?;
        let mut detector = FramingDetector::default();
        for line in &response.headers {
            write_line(&mut client.writer, line).await?;
            detector.observe(line);
        }
        if response.terminated {
            write_line(&mut client.writer, "").await?;
        }
        client.writer.flush().await?;

        self.record(request, &status, Outcome::Miss);

        if !response.terminated {
            tracing::debug!(status = %status, "Origin closed inside the header block");
            return Ok(());
        }

        let headers = response.headers;
        let store_key =
            cache_key.filter(|_| self.state.policy.is_storable(request, &status, &headers));
        let mut capture = match store_key {
            Some(_) => BodyCapture::new(self.state.policy.max_entry_bytes()),
            None => BodyCapture::disabled(),
        };

        let framing = if response_has_body(request.method(), &status) {
            Some(detector.framing())
        } else {
            None
        };
        let reader = &mut origin_reader;
        let writer = &mut client.writer;
        let complete = match framing {
            None => true,
            Some(BodyFraming::Chunked) => {
                relay_chunked(reader, writer, read_timeout, max_line, &mut capture).await?
            }
            Some(BodyFraming::Length(len)) => {
                copy_exact(reader, writer, len, read_timeout, &mut capture).await? == len
            }
            Some(BodyFraming::CloseDelimited) => {
                copy_to_end(reader, writer, read_timeout, &mut capture).await?;
                true
            }
        };
        client.writer.flush().await?;

        if let Some(key) = store_key {
            self.store(key, response.status_line, headers, capture, complete);
        }
        Ok(())
    }

    fn store(
        &self,
        key: String,
        status_line: String,
        headers: Vec<String>,
        capture: BodyCapture,
        complete: bool,
    ) {
        if !complete {
            tracing::debug!(key = %key, "Body incomplete, not caching");
            return;
        }
        let Some(body) = capture.into_bytes() else {
            tracing::debug!(key = %key, "Body over size limit, not caching");
            return;
        };
        let ttl = self.state.policy.freshness_lifetime(&headers, Utc::now());
        if ttl.is_zero() {
            tracing::debug!(key = %key, "Response already stale, not caching");
            return;
        }
        let entry = CachedEntry::new(status_line, headers, body, SystemTime::now(), ttl);
        self.state.cache.store(key, entry);
        metrics::record_cache_size(self.state.cache.len());
    }

    fn record(&self, request: &ParsedRequest, status: &str, outcome: Outcome) {
        self.state.telemetry.record(RequestRecord {
            timestamp: Utc::now(),
            client_ip: self.peer.ip(),
            method: request.method().to_string(),
            url: request
                .absolute_url()
                .unwrap_or_else(|| request.path().to_string()),
            status: status.to_string(),
            outcome,
            elapsed: self.started.elapsed(),
        });
    }

    async fn fail(&self, client: &mut ClientConn, err: RelayError) {
        match err.status() {
            Some((status, reason)) if !client.response_started => {
                if status >= 500 {
                    tracing::warn!(error = %err, status, "Relay failed");
                } else {
                    tracing::debug!(error = %err, status, "Request rejected");
                }
                let page = error_response(status, reason, &html_escape(&err.to_string()));
                if let Err(e) = client.writer.write_all(&page).await {
                    tracing::debug!(error = %e, "Could not send error response");
                    return;
                }
                let _ = client.writer.flush().await;
            }
            _ => {
                tracing::warn!(error = %err, "Relay aborted");
            }
        }
    }
}
