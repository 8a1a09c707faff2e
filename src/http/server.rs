//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the axum Router with the stream route and index
//! - Wire up middleware (tracing, request ID, head timeout, compression)
//! - Serve on a bound listener until shutdown

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::http::compression::compression_layer;
use crate::http::request::{MakeRequestUuid, X_REQUEST_ID};
use crate::streaming::{ReadCallback, Streamer};

/// Streaming server on axum.
pub struct HttpServer {
    router: Router,
    streamer: Streamer,
    stream_path: String,
}

impl HttpServer {
    /// Build the server; `source` feeds every stream it serves.
    pub fn new<T>(config: &AppConfig, streamer: Streamer, source: ReadCallback<T>) -> Self
    where
        T: Serialize + Send + 'static,
    {
        let router = Self::build_router(config, &streamer, source);
        Self {
            router,
            streamer,
            stream_path: config.streaming.path.clone(),
        }
    }

    /// Build the axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router<T>(config: &AppConfig, streamer: &Streamer, source: ReadCallback<T>) -> Router
    where
        T: Serialize + Send + 'static,
    {
        let mut router = Router::new()
            .route(&config.streaming.path, streamer.route(source))
            .route("/", get(index));

        if config.streaming.compression {
            router = router.layer(compression_layer());
        }

        // The timeout bounds the time to the response head only; stream
        // bodies outlive it.
        let x_request_id = axum::http::HeaderName::from_static(X_REQUEST_ID);
        router
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
    }

    /// The router, for embedding or in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until the streamer's shutdown token is cancelled.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            stream_path = %self.stream_path,
            "HTTP server starting"
        );

        let shutdown = self.streamer.shutdown_token().clone();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn index() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
