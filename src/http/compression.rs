//! Response compression that leaves streams alone.
//!
//! A compressing encoder holds bytes back until it has a full block, which
//! turns one-record-per-flush into arbitrary batches. Responses that must
//! reach the client frame by frame carry the [`Unbuffered`] extension and
//! are skipped by the predicate.

use axum::body::HttpBody;
use axum::http::Response;
use tower_http::compression::predicate::{And, DefaultPredicate, Predicate};
use tower_http::compression::CompressionLayer;

/// Response extension marking a body that must not be buffered.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbuffered;

/// Compression predicate refusing responses marked [`Unbuffered`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipUnbuffered;

impl Predicate for SkipUnbuffered {
    fn should_compress<B>(&self, response: &Response<B>) -> bool
    where
        B: HttpBody,
    {
        response.extensions().get::<Unbuffered>().is_none()
    }
}

pub type StreamAwarePredicate = And<DefaultPredicate, SkipUnbuffered>;

/// Gzip layer with the default predicate plus [`SkipUnbuffered`].
pub fn compression_layer() -> CompressionLayer<StreamAwarePredicate> {
    CompressionLayer::new().compress_when(DefaultPredicate::new().and(SkipUnbuffered))
}

/// Mark a response as unbuffered.
pub fn mark_unbuffered<B>(response: &mut Response<B>) {
    response.extensions_mut().insert(Unbuffered);
}
