//! hyper adapter and a server built directly on hyper-util.
//!
//! # Responsibilities
//! - Serve a stream from a bare `hyper` service (no router, no tower stack)
//! - Write errors the low-level way: `text/plain` message plus newline
//! - Run an accept loop with connection limits and graceful shutdown
//!
//! # Design Decisions
//! - HTTP/1.1 and HTTP/2 via the auto connection builder
//! - Shutdown first ends every live stream (child tokens), then waits for
//!   connections to drain up to the grace period

use axum::http::header::{ALLOW, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::{HeaderValue, Method, Request, Response, StatusCode};
use axum::BoxError;
use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

use crate::config::AppConfig;
use crate::http::request::{ensure_request_id, RequestContext, X_REQUEST_ID};
use crate::http::response::{log_rejection, streaming_response};
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::streaming::{ReadCallback, Streamer};

/// Response body of the hyper adapter.
pub type RawBody = UnsyncBoxBody<Bytes, BoxError>;

impl Streamer {
    /// Serve one streaming request from a hyper service.
    ///
    /// The request body is ignored.
    pub async fn serve_raw<T, B>(&self, request: Request<B>, source: ReadCallback<T>) -> Response<RawBody>
    where
        T: Serialize + Send + 'static,
    {
        let ctx = RequestContext::from_request(&request);
        let request_id = ctx.request_id().to_string();

        match self.open(source, ctx).await {
            Ok(session) => {
                let frames = session
                    .into_body_stream()
                    .map_ok(Frame::data)
                    .map_err(BoxError::from);
                streaming_response(StreamBody::new(frames).boxed_unsync())
            }
            Err(err) => {
                log_rejection(&err, &request_id);
                text_response(err.status(), &err.to_string())
            }
        }
    }
}

/// Plain-text response: the message followed by a newline.
pub fn text_response(status: StatusCode, message: &str) -> Response<RawBody> {
    let body = Full::new(Bytes::from(format!("{message}\n")))
        .map_err(|never| match never {})
        .boxed_unsync();
    let mut response = Response::new(body);
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    response
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Stream,
    Index,
    MethodNotAllowed,
    NotFound,
}

impl Route {
    /// The stream path answers `GET` only.
    fn resolve(method: &Method, path: &str, stream_path: &str) -> Self {
        match path {
            p if p == stream_path && method == Method::GET => Self::Stream,
            p if p == stream_path => Self::MethodNotAllowed,
            "/" if method == Method::GET || method == Method::HEAD => Self::Index,
            "/" => Self::MethodNotAllowed,
            _ => Self::NotFound,
        }
    }

    fn allow(path: &str, stream_path: &str) -> &'static str {
        if path == stream_path {
            "GET"
        } else {
            "GET, HEAD"
        }
    }
}

struct RawApp<T> {
    streamer: Streamer,
    source: ReadCallback<T>,
    stream_path: String,
}

impl<T: Serialize + Send + 'static> RawApp<T> {
    async fn dispatch<B>(&self, mut request: Request<B>) -> Response<RawBody> {
        let request_id = ensure_request_id(&mut request);
        let started = Instant::now();

        let mut response = match Route::resolve(request.method(), request.uri().path(), &self.stream_path) {
            Route::Stream => {
                self.streamer
                    .serve_raw(request, self.source.clone())
                    .await
            }
            Route::Index => text_response(StatusCode::OK, "OK"),
            Route::MethodNotAllowed => {
                let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
                let allow = Route::allow(request.uri().path(), &self.stream_path);
                response.headers_mut().insert(ALLOW, HeaderValue::from_static(allow));
                response
            }
            Route::NotFound => text_response(StatusCode::NOT_FOUND, "404 page not found"),
        };

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(X_REQUEST_ID, value);
        }
        tracing::debug!(
            status = response.status().as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Response head sent"
        );
        response
    }
}

/// Streaming server on hyper-util, without axum's router.
pub struct RawServer<T> {
    app: Arc<RawApp<T>>,
    shutdown_grace: Duration,
}

impl<T: Serialize + Send + 'static> RawServer<T> {
    pub fn new(config: &AppConfig, streamer: Streamer, source: ReadCallback<T>) -> Self {
        Self {
            app: Arc::new(RawApp {
                streamer,
                source,
                stream_path: config.streaming.path.clone(),
            }),
            shutdown_grace: Duration::from_secs(config.timeouts.shutdown_grace_secs),
        }
    }

    /// Accept connections until the streamer's shutdown token is cancelled.
    pub async fn run(self, listener: Listener) -> Result<(), ListenerError> {
        let shutdown = self.app.streamer.shutdown_token().clone();
        let builder = auto::Builder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();
        let tracker = ConnectionTracker::new();

        tracing::info!(
            address = ?listener.local_addr().ok(),
            stream_path = %self.app.stream_path,
            "Raw HTTP server starting"
        );

        loop {
            let (stream, peer_addr, permit) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                        continue;
                    }
                    Err(e) => return Err(e),
                },
            };

            let guard = tracker.track();
            let span = tracing::info_span!(
                "connection",
                connection_id = %guard.id(),
                peer_addr = %peer_addr,
            );

            let app = Arc::clone(&self.app);
            let service = service_fn(move |request: Request<hyper::body::Incoming>| {
                let app = Arc::clone(&app);
                let span = tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                );
                async move { Ok::<_, Infallible>(app.dispatch(request).await) }.instrument(span)
            });

            let builder = builder.clone();
            let watcher = graceful.watcher();
            tokio::spawn(
                async move {
                    let _permit = permit;
                    let _guard = guard;
                    let conn = builder.serve_connection(TokioIo::new(stream), service);
                    if let Err(e) = watcher.watch(conn).await {
                        tracing::debug!(error = %e, "Connection ended with error");
                    }
                }
                .instrument(span),
            );
        }

        tracing::info!(
            open_connections = tracker.active_count(),
            "Raw HTTP server draining"
        );
        let drain = async {
            graceful.shutdown().await;
            tracker.wait_idle().await;
        };
        match tokio::time::timeout(self.shutdown_grace, drain).await {
            Ok(()) => tracing::info!("Raw HTTP server stopped"),
            Err(_) => tracing::warn!(
                open_connections = tracker.active_count(),
                "Grace period elapsed, dropping connections"
            ),
        }
        Ok(())
    }
}
