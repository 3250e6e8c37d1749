//! Shared fixtures for integration tests: mock origins and a running proxy.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use forward_proxy::config::ProxyConfig;
use forward_proxy::lifecycle::Shutdown;
use forward_proxy::net::{ConnectionTracker, Listener};
use forward_proxy::observability::{ProxyStats, Telemetry};
use forward_proxy::{ProxyServer, ProxyState};

/// An origin server on an ephemeral port that answers with canned bytes.
pub struct MockOrigin {
    pub addr: SocketAddr,
    accepts: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockOrigin {
    /// Connections accepted so far.
    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    /// Raw requests received, head and body.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// What a mock origin does after reading a request.
#[derive(Clone)]
enum Reply {
    /// Send the bytes, then close.
    Close(Vec<u8>),
    /// Send the bytes, then hold the socket open until the proxy hangs up.
    Stall(Vec<u8>),
}

/// Origin that sends `response` to every connection, then closes.
pub async fn start_origin(response: impl Into<Vec<u8>>) -> MockOrigin {
    start_origin_sequence(vec![response.into()]).await
}

/// Origin whose n-th connection gets `responses[n]`; the last one repeats.
pub async fn start_origin_sequence(responses: Vec<Vec<u8>>) -> MockOrigin {
    start(responses.into_iter().map(Reply::Close).collect()).await
}

/// Origin that reads the request and never answers.
pub async fn start_silent_origin() -> MockOrigin {
    start_stalling_origin(Vec::new()).await
}

/// Origin that sends `prefix` and then goes quiet without closing.
pub async fn start_stalling_origin(prefix: impl Into<Vec<u8>>) -> MockOrigin {
    start(vec![Reply::Stall(prefix.into())]).await
}

async fn start(replies: Vec<Reply>) -> MockOrigin {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let replies = Arc::new(replies);

    let (a, r) = (accepts.clone(), requests.clone());
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let n = a.fetch_add(1, Ordering::SeqCst);
            let reply = replies[n.min(replies.len() - 1)].clone();
            let requests = r.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(socket);
                let request = read_request(&mut reader).await;
                requests.lock().unwrap().push(request);

                match reply {
                    Reply::Close(bytes) => {
                        let mut socket = reader.into_inner();
                        let _ = socket.write_all(&bytes).await;
                        let _ = socket.shutdown().await;
                    }
                    Reply::Stall(bytes) => {
                        let _ = reader.get_mut().write_all(&bytes).await;
                        let mut rest = Vec::new();
                        let _ = tokio::time::timeout(
                            Duration::from_secs(30),
                            reader.read_to_end(&mut rest),
                        )
                        .await;
                    }
                }
            });
        }
    });

    MockOrigin {
        addr,
        accepts,
        requests,
    }
}

/// Read one request head, its `Content-Length` body, and whatever else is already buffered.
async fn read_request(reader: &mut BufReader<TcpStream>) -> String {
    let mut raw = String::new();
    let mut body_len = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
            return raw;
        }
        raw.push_str(&line);
        if line == "\r\n" {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                body_len = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut body = vec![0u8; body_len];
    if reader.read_exact(&mut body).await.is_ok() {
        raw.push_str(&String::from_utf8_lossy(&body));
    }
    raw.push_str(&String::from_utf8_lossy(reader.buffer()));
    raw
}

/// A proxy listening on an ephemeral port. Shuts down when dropped.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub state: ProxyState,
    pub stats: Arc<ProxyStats>,
    pub tracker: ConnectionTracker,
    shutdown: Shutdown,
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_proxy() -> TestProxy {
    start_proxy_with(|_| {}).await
}

pub async fn start_proxy_with(configure: impl FnOnce(&mut ProxyConfig)) -> TestProxy {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    configure(&mut config);

    let stats = Arc::new(ProxyStats::new());
    let state = ProxyState::from_config(&config, Telemetry::new(stats.clone(), Vec::new()));
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = ProxyServer::new(state.clone(), Duration::from_secs(1));
    let tracker = server.tracker();
    let shutdown = Shutdown::new();
    tokio::spawn(server.run(listener, shutdown.subscribe()));

    TestProxy {
        addr,
        state,
        stats,
        tracker,
        shutdown,
    }
}

/// Write `request`, half-close, and read until the proxy closes the connection.
pub async fn send_raw(proxy: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(request).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("proxy did not close the connection")
        .unwrap();
    response
}

pub async fn send_text(proxy: SocketAddr, request: &str) -> String {
    String::from_utf8(send_raw(proxy, request.as_bytes()).await).unwrap()
}

/// Wait for every relay task to finish.
pub async fn wait_idle(tracker: &ConnectionTracker) {
    for _ in 0..100 {
        if tracker.active_count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} relays still active", tracker.active_count());
}

pub fn ok_response(body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
    .into_bytes()
}

/// Declared `Content-Length` and the actual body of a response.
pub fn declared_and_actual_len(response: &str) -> (usize, usize) {
    let (head, body) = response.split_once("\r\n\r\n").unwrap();
    let declared = head
        .lines()
        .find_map(|l| l.strip_prefix("Content-Length: "))
        .unwrap()
        .parse()
        .unwrap();
    (declared, body.len())
}
