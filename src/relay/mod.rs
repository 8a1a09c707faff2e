//! Relay subsystem.
//!
//! # Data Flow
//! ```text
//! Client request (<prefix>/...)
//!     → server.rs (request ID, trace span)
//!     → forward.rs (strip prefix, drop hop-by-hop headers, X-Forwarded-*)
//!     → upstream via hyper-util legacy client (HTTP/1.1)
//!     → response frames relayed as they arrive
//!     → compression (skipped for configured prefixes)
//! ```
//!
//! # Design Decisions
//! - One fixed upstream; no balancing or retries
//! - Bodies are streamed in both directions, never collected
//! - Upstream failures map to 502 Bad Gateway

pub mod forward;
pub mod server;

pub use server::{RelayError, RelayServer, RelayState};
