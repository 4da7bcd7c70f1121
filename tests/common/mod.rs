//! In-process mock wiki server for integration tests
//!
//! Speaks just enough HTTP/1.1 for reqwest GETs: one request per
//! connection, `Connection: close`, explicit `Content-Length`. Tests hand
//! in a routing closure mapping the percent-decoded request target to a
//! [`MockResponse`]. The server counts total hits and tracks the maximum
//! number of requests in flight at once, which is what the bounded
//! concurrency property is asserted against.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Canned response returned by a route handler
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    /// Served before the body; lets tests hold requests open
    pub delay: Duration,
    /// Overrides Content-Length to simulate a truncated transfer
    pub declared_len: Option<usize>,
}

impl MockResponse {
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: value.to_string().into_bytes(),
            delay: Duration::ZERO,
            declared_len: None,
        }
    }

    pub fn html() -> Self {
        Self {
            status: 200,
            content_type: "text/html",
            body: b"<html><body>Access denied</body></html>".to_vec(),
            delay: Duration::ZERO,
            declared_len: None,
        }
    }

    pub fn bytes(body: Vec<u8>, content_type: &'static str) -> Self {
        Self {
            status: 200,
            content_type,
            body,
            delay: Duration::ZERO,
            declared_len: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: Vec::new(),
            delay: Duration::ZERO,
            declared_len: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_declared_len(mut self, len: usize) -> Self {
        self.declared_len = Some(len);
        self
    }
}

/// Handler mapping a percent-decoded request target to a response
pub type Handler = Arc<dyn Fn(&str) -> MockResponse + Send + Sync>;

pub struct MockServer {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&str) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
        let addr = listener.local_addr().expect("mock server addr");

        let handler: Handler = Arc::new(handler);
        let hits = Arc::new(AtomicUsize::new(0));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let accept_hits = Arc::clone(&hits);
        let accept_in_flight = Arc::clone(&in_flight);
        let accept_max = Arc::clone(&max_in_flight);

        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let handler = Arc::clone(&handler);
                let hits = Arc::clone(&accept_hits);
                let in_flight = Arc::clone(&accept_in_flight);
                let max = Arc::clone(&accept_max);

                tokio::spawn(async move {
                    let _ = serve_connection(stream, handler, hits, in_flight, max).await;
                });
            }
        });

        Self {
            addr,
            hits,
            max_in_flight,
            accept_task,
        }
    }

    /// API endpoint URL for a [`wikivoice_core::ClientConfig`]
    pub fn endpoint(&self) -> String {
        format!("http://{}/api.php", self.addr)
    }

    /// Absolute URL under this server
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_connection(
    mut stream: tokio::net::TcpStream,
    handler: Handler,
    hits: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        head.extend_from_slice(&buf[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n".as_slice()) {
            break;
        }
    }

    let head_text = String::from_utf8_lossy(&head);
    let target = head_text
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let decoded = urlencoding::decode(&target)
        .map(|s| s.into_owned())
        .unwrap_or(target);

    hits.fetch_add(1, Ordering::SeqCst);
    let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    max_in_flight.fetch_max(current, Ordering::SeqCst);

    let response = handler(&decoded);
    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    let declared = response.declared_len.unwrap_or(response.body.len());
    let reason = match response.status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        403 => "Forbidden",
        503 => "Service Unavailable",
        _ => "Mock",
    };
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status, reason, response.content_type, declared
    );

    stream.write_all(header.as_bytes()).await?;
    stream.write_all(&response.body).await?;
    stream.flush().await?;

    in_flight.fetch_sub(1, Ordering::SeqCst);
    Ok(())
}
