//! Request identification and the request view handed to data sources.
//!
//! # Responsibilities
//! - Generate unique request IDs (UUID v4) as early as possible
//! - Capture an immutable, cheap-to-clone snapshot of the inbound request
//! - Decode query parameters once per request

use axum::http::{HeaderMap, HeaderValue, Method, Request, Uri};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates a fresh UUID v4 request ID for requests that arrive without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Ensure the request carries an `x-request-id` header and return its value.
///
/// Used on paths that do not go through the tower request-id layers.
pub fn ensure_request_id<B>(request: &mut Request<B>) -> String {
    if let Some(id) = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
    {
        return id.to_string();
    }

    let id = Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&id) {
        request.headers_mut().insert(X_REQUEST_ID, value);
    }
    id
}

/// Read-only view of the request a stream session serves.
///
/// Data sources that take a context receive a clone of this on every read.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    request_id: String,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    received_at: Instant,
}

impl RequestContext {
    /// Build a context from request parts.
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        let request_id = headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let query = uri
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        Self {
            inner: Arc::new(ContextInner {
                request_id,
                method,
                uri,
                headers,
                query,
                received_at: Instant::now(),
            }),
        }
    }

    /// Snapshot the head of a request. The body is not touched.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self::new(
            request.method().clone(),
            request.uri().clone(),
            request.headers().clone(),
        )
    }

    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    pub fn path(&self) -> &str {
        self.inner.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    /// First decoded value of a query parameter.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.inner
            .query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Time since the request was received.
    pub fn elapsed(&self) -> Duration {
        self.inner.received_at.elapsed()
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.inner.request_id)
            .field("method", &self.inner.method)
            .field("uri", &self.inner.uri)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(uri: &str) -> RequestContext {
        RequestContext::new(Method::GET, uri.parse().unwrap(), HeaderMap::new())
    }

    #[test]
    fn query_returns_first_decoded_value() {
        let ctx = context("/ping?interval=500ms&interval=1s&name=a%20b");
        assert_eq!(ctx.query("interval"), Some("500ms"));
        assert_eq!(ctx.query("name"), Some("a b"));
        assert_eq!(ctx.query("missing"), None);
    }

    #[test]
    fn empty_query_value_is_present_but_empty() {
        let ctx = context("/ping?interval=");
        assert_eq!(ctx.query("interval"), Some(""));
    }

    #[test]
    fn request_id_taken_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc-123"));
        let ctx = RequestContext::new(Method::GET, "/ping".parse().unwrap(), headers);
        assert_eq!(ctx.request_id(), "abc-123");
        assert_eq!(ctx.path(), "/ping");
    }

    #[test]
    fn request_id_generated_when_missing() {
        let ctx = context("/ping");
        assert!(Uuid::parse_str(ctx.request_id()).is_ok());
    }

    #[test]
    fn ensure_request_id_keeps_existing_header() {
        let mut request = Request::builder()
            .uri("/ping")
            .header(X_REQUEST_ID, "fixed")
            .body(())
            .unwrap();
        assert_eq!(ensure_request_id(&mut request), "fixed");

        let mut request = Request::builder().uri("/ping").body(()).unwrap();
        let id = ensure_request_id(&mut request);
        assert_eq!(request.headers()[X_REQUEST_ID], id.as_str());
    }
}
