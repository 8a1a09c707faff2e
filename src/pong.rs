//! Demo record source served on the stream path.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::http::request::RequestContext;
use crate::streaming::{ReadCallback, SourceError};

const QUOTES: [&str; 4] = [
    "the bug does not seem to be here",
    "works on my machine",
    "it was a buffering proxy all along",
    "have you tried flushing",
];

/// One demo record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    pub pong: bool,
    pub reason: String,
    /// Milliseconds since the Unix epoch.
    pub date: u64,
    pub quote: String,
    pub request_id: String,
    pub seq: u64,
}

/// A context-aware source producing [`Pong`] records.
///
/// The sequence counter is shared by every stream served from the returned
/// callback.
pub fn pong_source() -> ReadCallback<Pong> {
    let seq = Arc::new(AtomicU64::new(0));
    ReadCallback::with_context(move |ctx: RequestContext| {
        let seq = seq.fetch_add(1, Ordering::Relaxed) + 1;
        async move {
            let date = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|e| Box::new(e) as SourceError)?
                .as_millis() as u64;
            Ok::<_, SourceError>(Pong {
                pong: true,
                reason: format!("{} {}", ctx.method(), ctx.path()),
                date,
                quote: QUOTES[fastrand::usize(..QUOTES.len())].to_string(),
                request_id: ctx.request_id().to_string(),
                seq,
            })
        }
    })
}
