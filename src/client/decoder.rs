//! Incremental newline-delimited JSON decoding.

use bytes::{Buf, BytesMut};
use serde::de::DeserializeOwned;

/// Splits a byte stream into JSON lines.
///
/// Chunk boundaries are arbitrary: a record may arrive split across chunks
/// or several records in one chunk.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: BytesMut,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a received chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Take the next complete line without its terminator.
    ///
    /// Blank lines are skipped. A trailing `\r` is dropped.
    pub fn next_line(&mut self) -> Option<BytesMut> {
        loop {
            let end = self.buffer.iter().position(|&b| b == b'\n')?;
            let mut line = self.buffer.split_to(end);
            self.buffer.advance(1);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                return Some(line);
            }
        }
    }

    /// Decode the next complete record, if one is buffered.
    pub fn decode_next<T: DeserializeOwned>(&mut self) -> Option<Result<T, serde_json::Error>> {
        self.next_line().map(|line| serde_json::from_slice(&line))
    }

    /// Bytes of an unterminated line still waiting for its newline.
    pub fn remainder(&self) -> &[u8] {
        &self.buffer
    }
}
