//! Streaming relay library.
//!
//! Serves an endless stream of JSON records over plain HTTP (one record per
//! line, each flushed on its own), plus a reverse proxy and a client to
//! check that records survive the trip through intermediaries.
//!
//! # Architecture Overview
//!
//! ```text
//!   client ──▶ relay (optional) ──▶ http adapter ──▶ streaming session
//!                                  (axum | hyper)         │
//!                                                         ▼
//!                                                 producer task ──▶ data source
//!
//!   Cross-cutting: config, observability, lifecycle (shutdown), net
//! ```

pub mod client;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pong;
pub mod relay;
pub mod streaming;

pub use config::AppConfig;
pub use http::{HttpServer, RawServer, RequestContext};
pub use lifecycle::Shutdown;
pub use relay::RelayServer;
pub use streaming::{ReadCallback, StreamError, StreamSession, Streamer};
