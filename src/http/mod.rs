//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum Router + tower-http layers)      ┐
//!       or raw.rs (hyper service on hyper-util builder)  ┘ pick one
//!     → request.rs (request ID, RequestContext)
//!     → handler.rs / raw.rs adapter → streaming::Streamer::open
//!     → response.rs (stream head, error mapping)
//!     → compression.rs (skipped for stream responses)
//!     → Send to client, one chunk per record
//! ```
//!
//! # Design Decisions
//! - Both adapters share the session; only error rendering differs
//!   (JSON message for axum, plain text line for hyper)
//! - The response head is committed only after the first record is ready

pub mod compression;
pub mod handler;
pub mod raw;
pub mod request;
pub mod response;
pub mod server;

pub use compression::{compression_layer, SkipUnbuffered, Unbuffered};
pub use raw::{RawBody, RawServer};
pub use request::{MakeRequestUuid, RequestContext, X_REQUEST_ID};
pub use server::HttpServer;
