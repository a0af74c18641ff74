//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use egress_proxy::config::{MappingConfig, ProxyConfig};
use egress_proxy::http::{HttpServer, ProxyRequest, ProxyResponse, ProxyService, Transport, TransportError};
use egress_proxy::lifecycle::Shutdown;
use egress_proxy::store::{BreakerRepository, BreakerState, StoreError, StoreResult};

/// Arbitrary fixed start time, aligned to a one-second window.
pub const T0_MS: u64 = 1_700_000_000_000;

/// A path-prefix mapping with the prefix as its key.
pub fn prefix_mapping(prefix: &str, base: &str) -> MappingConfig {
    MappingConfig {
        key: None,
        host: None,
        path_prefix: Some(prefix.to_string()),
        egress_base_url: base.to_string(),
    }
}

/// Defaults plus one `/api` mapping to `https://api.gov.example`.
pub fn api_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.mappings.push(prefix_mapping("/api", "https://api.gov.example"));
    config
}

pub fn response(status: u16, body: &str) -> ProxyResponse {
    ProxyResponse::new(StatusCode::from_u16(status).unwrap(), HeaderMap::new(), body.to_string())
}

pub fn redirect(status: u16, location: &str) -> ProxyResponse {
    let mut resp = response(status, "");
    resp.headers.insert(header::LOCATION, HeaderValue::from_str(location).unwrap());
    resp
}

/// Transport that replays a script, then falls back to a fixed reply.
/// Every request it sees is recorded.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<ProxyResponse, TransportError>>>,
    fallback: Mutex<Option<ProxyResponse>>,
    seen: Mutex<Vec<ProxyRequest>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            seen: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Always answer with `resp` once the script runs out.
    pub fn always(resp: ProxyResponse) -> Self {
        let t = Self::new();
        t.set_fallback(resp);
        t
    }

    /// Sleep (on the Tokio clock) before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, resp: ProxyResponse) {
        self.script.lock().unwrap().push_back(Ok(resp));
    }

    pub fn push_err(&self, err: TransportError) {
        self.script.lock().unwrap().push_back(Err(err));
    }

    pub fn set_fallback(&self, resp: ProxyResponse) {
        *self.fallback.lock().unwrap() = Some(resp);
    }

    pub fn seen(&self) -> Vec<ProxyRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ProxyRequest) -> Result<ProxyResponse, TransportError> {
        self.seen.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => self
                .fallback
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| TransportError::Connect("script exhausted".into())),
        }
    }
}

/// Repository whose every operation fails, for fail-closed checks.
pub struct FailingRepository {
    pub calls: AtomicUsize,
}

impl FailingRepository {
    pub fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }

    fn fail<T>(&self) -> StoreResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Backend("connection refused".into()))
    }
}

#[async_trait]
impl BreakerRepository for FailingRepository {
    async fn increment_and_get(&self, _key: &str, _window: u64, _ttl: Duration) -> StoreResult<u64> {
        self.fail()
    }

    async fn load_breaker_state(&self, _key: &str) -> StoreResult<BreakerState> {
        self.fail()
    }

    async fn save_breaker_state(&self, _key: &str, _state: &BreakerState) -> StoreResult<bool> {
        self.fail()
    }

    fn store_type(&self) -> &'static str {
        "failing"
    }
}

/// One request as seen by a mock backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    /// Header names lowercased.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == &name.to_ascii_lowercase())
            .map(|(_, v)| v.as_str())
    }
}

/// Canned reply from a mock backend.
pub struct MockReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MockReply {
    pub fn ok(body: &str) -> Self {
        Self { status: 200, headers: Vec::new(), body: body.to_string() }
    }

    pub fn status(status: u16) -> Self {
        Self { status, headers: Vec::new(), body: String::new() }
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Self {
            status,
            headers: vec![("Location".to_string(), location.to_string())],
            body: String::new(),
        }
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(n, v)| (n.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(n, _)| n == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(RecordedRequest { method, target, headers, body })
}

/// Start a programmable raw-TCP backend on an ephemeral port. Returns its
/// address and the log of requests it received.
pub async fn start_programmable_backend<F>(f: F) -> (SocketAddr, Arc<Mutex<Vec<RecordedRequest>>>)
where
    F: Fn(&RecordedRequest) -> MockReply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let log_task = log.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            let log = log_task.clone();
            tokio::spawn(async move {
                let Some(request) = read_request(&mut socket).await else {
                    return;
                };
                let reply = f(&request);
                log.lock().unwrap().push(request);

                let reason = StatusCode::from_u16(reply.status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown");
                let mut out = format!("HTTP/1.1 {} {}\r\n", reply.status, reason);
                for (name, value) in &reply.headers {
                    out.push_str(&format!("{}: {}\r\n", name, value));
                }
                out.push_str(&format!(
                    "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    reply.body.len(),
                    reply.body
                ));
                let _ = socket.write_all(out.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, log)
}

/// Start a backend that always returns 200 with `body`.
pub async fn start_mock_backend(body: &'static str) -> (SocketAddr, Arc<Mutex<Vec<RecordedRequest>>>) {
    start_programmable_backend(move |_| MockReply::ok(body)).await
}

/// Run the proxy's HTTP server on an ephemeral port.
pub async fn start_proxy(config: &ProxyConfig, service: Arc<ProxyService>) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(service, config);
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });
    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
