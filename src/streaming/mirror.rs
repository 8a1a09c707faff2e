//! Debug mirror of the records written to a stream.

use tracing::Span;

/// Log target for mirrored records, so they can be filtered on their own.
pub const RECORD_TARGET: &str = "streaming_relay::records";

/// Copies every encoded record into a debug event on the request's span.
///
/// Owned by one session; nothing is shared between requests.
#[derive(Debug, Clone)]
pub struct RecordMirror {
    span: Span,
    enabled: bool,
}

impl RecordMirror {
    pub fn new(span: Span, enabled: bool) -> Self {
        Self { span, enabled }
    }

    /// Mirror one encoded record (newline-terminated JSON).
    pub fn write(&self, encoded: &[u8]) {
        if !self.enabled {
            return;
        }
        let line = String::from_utf8_lossy(encoded);
        tracing::debug!(target: RECORD_TARGET, parent: &self.span, record = %line.trim_end(), "record");
    }
}
