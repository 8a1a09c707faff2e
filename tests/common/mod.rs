//! Shared utilities for integration tests.
#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use streaming_relay::config::AppConfig;
use streaming_relay::lifecycle::Shutdown;
use streaming_relay::net::Listener;
use streaming_relay::streaming::SourceError;
use streaming_relay::{HttpServer, RawServer, ReadCallback, RelayServer, Streamer};

/// Record emitted by test sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub seq: usize,
}

/// Both HTTP adapters, for tests that must hold for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adapter {
    Axum,
    Hyper,
}

pub const ADAPTERS: [Adapter; 2] = [Adapter::Axum, Adapter::Hyper];

/// Source returning `Tick { seq: n }` for the n-th read, failing on read
/// `fail_at`. The counter is shared with the caller.
pub fn counting_source(fail_at: Option<usize>) -> (ReadCallback<Tick>, Arc<AtomicUsize>) {
    let reads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reads);
    let source = ReadCallback::plain(move || {
        let seq = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if Some(seq) == fail_at {
                Err::<Tick, SourceError>(format!("read {seq} failed").into())
            } else {
                Ok(Tick { seq })
            }
        }
    });
    (source, reads)
}

pub fn reads(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}

/// A server running on an ephemeral port. Dropping it shuts it down.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.relay.bind_address = "127.0.0.1:0".to_string();
    config.timeouts.shutdown_grace_secs = 2;
    config
}

/// Start a streaming server serving `source` on `/ping`.
pub async fn spawn_server<T>(adapter: Adapter, source: ReadCallback<T>) -> TestServer
where
    T: Serialize + Send + 'static,
{
    let config = test_config();
    let shutdown = Shutdown::new();
    let streamer = Streamer::new(shutdown.subscribe()).with_record_mirror(true);
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();

    match adapter {
        Adapter::Axum => {
            let server = HttpServer::new(&config, streamer, source);
            tokio::spawn(async move {
                let _ = server.run(tcp).await;
            });
        }
        Adapter::Hyper => {
            let listener = Listener::from_tcp(tcp, config.listener.max_connections).unwrap();
            let server = RawServer::new(&config, streamer, source);
            tokio::spawn(async move {
                let _ = server.run(listener).await;
            });
        }
    }

    TestServer { addr, shutdown }
}

/// Start a relay in front of `upstream` with `/api` stripped.
pub async fn spawn_relay(upstream: SocketAddr, compression: bool) -> TestServer {
    let mut config = test_config();
    config.relay.upstream = format!("http://{upstream}");
    config.relay.compression.enabled = compression;

    let shutdown = Shutdown::new();
    let server = RelayServer::new(&config, shutdown.token()).unwrap();
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run(tcp).await;
    });

    TestServer { addr, shutdown }
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    tcp.local_addr().unwrap()
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Reads a response body line by line as chunks arrive.
pub struct LineReader {
    response: reqwest::Response,
    buf: Vec<u8>,
}

impl LineReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buf: Vec::new(),
        }
    }

    /// Next line including its `\n`; `None` at a clean end of body.
    pub async fn next_line(&mut self) -> Option<Result<String, reqwest::Error>> {
        loop {
            if let Some(end) = self.buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=end).collect();
                return Some(Ok(String::from_utf8(line).unwrap()));
            }
            match self.response.chunk().await {
                Ok(Some(chunk)) => self.buf.extend_from_slice(&chunk),
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// Next line, failing the test if it takes longer than `limit`.
    pub async fn expect_line(&mut self, limit: Duration) -> String {
        tokio::time::timeout(limit, self.next_line())
            .await
            .expect("timed out waiting for a record")
            .expect("stream ended")
            .expect("stream failed")
    }
}
