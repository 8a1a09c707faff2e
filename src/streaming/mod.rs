//! Streaming subsystem.
//!
//! # Data Flow
//! ```text
//! Request (GET <stream path>?interval=<duration>)
//!     → interval.rs (parse, 400 on failure)
//!     → session.rs  (first read + encode, 500 on failure)
//!     → adapter commits 200 application/json
//!     → session.rs  (transmission loop: one JSON line per frame, flushed)
//!           ▲
//!           │ single-slot rendezvous (records, errors)
//!           │
//!       producer.rs (tick → read → handoff, until cancelled or failed)
//!           │
//!       source.rs   (caller-supplied ReadCallback)
//! ```
//!
//! # Design Decisions
//! - One producer task per request; nothing is shared between sessions
//! - At most one record in transit, so a slow client slows the source
//! - Missed ticks are skipped rather than replayed
//! - Cancellation is a child token of the server shutdown token

pub mod error;
pub mod interval;
pub mod mirror;
pub mod producer;
pub mod session;
pub mod source;

pub use error::{StreamError, StreamOutcome};
pub use interval::{parse_interval, IntervalError, DEFAULT_INTERVAL};
pub use mirror::RecordMirror;
pub use producer::{ProducerExit, ProducerState};
pub use session::{StreamSession, Streamer};
pub use source::{ReadCallback, SourceError, SourcePanic};
