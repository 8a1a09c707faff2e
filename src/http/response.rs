//! Response construction shared by both adapters.
//!
//! # Responsibilities
//! - Build the head of a successful stream response
//! - Map stream errors raised before the head is committed to responses
//! - Log and count rejections
//!
//! # Design Decisions
//! - Stream responses are never compressed or buffered by proxies
//! - The body framing is left to the server (chunked for HTTP/1.1)

use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Response};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::http::compression::mark_unbuffered;
use crate::observability::metrics;
use crate::streaming::StreamError;

/// Asks buffering reverse proxies (nginx and friends) to pass chunks through.
pub const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Wrap a stream body in a `200 application/json` response.
pub fn streaming_response<B>(body: B) -> Response<B> {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(X_ACCEL_BUFFERING, HeaderValue::from_static("no"));
    mark_unbuffered(&mut response);
    response
}

/// Record a request that failed before streaming started.
pub fn log_rejection(err: &StreamError, request_id: &str) {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!(
            request_id = %request_id,
            status = status.as_u16(),
            error = %err,
            "Stream failed before first record"
        );
    } else {
        tracing::warn!(
            request_id = %request_id,
            status = status.as_u16(),
            error = %err,
            "Stream request rejected"
        );
    }
    metrics::record_rejected(status.as_u16());
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

/// `{"message": "..."}` with the mapped status.
impl IntoResponse for StreamError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = ErrorBody {
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::compression::Unbuffered;
    use crate::streaming::IntervalError;
    use axum::http::StatusCode;

    #[test]
    fn stream_head_disables_buffering() {
        let response = streaming_response(());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[CACHE_CONTROL], "no-cache");
        assert_eq!(response.headers()[X_ACCEL_BUFFERING], "no");
        assert!(response.extensions().get::<Unbuffered>().is_some());
    }

    #[tokio::test]
    async fn errors_render_as_json_message() {
        let err = StreamError::from(IntervalError::MissingUnit("5".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["message"], "missing unit in duration \"5\"");
    }
}
