//! axum adapter.

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::ALLOW;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use serde::Serialize;

use crate::http::request::RequestContext;
use crate::http::response::{log_rejection, streaming_response};
use crate::streaming::{ReadCallback, Streamer};

impl Streamer {
    /// A `GET` route streaming records from `source`.
    ///
    /// `HEAD` is refused rather than opening a session for a discarded body.
    pub fn route<T, S>(&self, source: ReadCallback<T>) -> MethodRouter<S>
    where
        T: Serialize + Send + 'static,
        S: Clone + Send + Sync + 'static,
    {
        let streamer = self.clone();
        get(move |request: Request| {
            let streamer = streamer.clone();
            let source = source.clone();
            async move { streamer.serve_axum(source, request).await }
        })
        .head(|| async { (StatusCode::METHOD_NOT_ALLOWED, [(ALLOW, "GET")]) })
    }

    /// Serve one streaming request inside an axum handler.
    ///
    /// Errors before the first record become `{"message": ...}` with the
    /// mapped status.
    pub async fn serve_axum<T>(&self, source: ReadCallback<T>, request: Request) -> Response
    where
        T: Serialize + Send + 'static,
    {
        let ctx = RequestContext::from_request(&request);
        let request_id = ctx.request_id().to_string();

        match self.open(source, ctx).await {
            Ok(session) => streaming_response(Body::from_stream(session.into_body_stream())),
            Err(err) => {
                log_rejection(&err, &request_id);
                err.into_response()
            }
        }
    }
}
