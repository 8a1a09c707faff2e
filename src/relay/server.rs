//! Relay server: a single-upstream reverse proxy that passes streams through.

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::HOST;
use axum::http::{StatusCode, Uri, Version};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::http::compression::{compression_layer, mark_unbuffered};
use crate::http::request::{MakeRequestUuid, X_REQUEST_ID};
use crate::observability::metrics;
use crate::relay::forward::{add_forwarded_headers, rewrite_path, strip_hop_by_hop, upstream_uri};

/// Relay construction errors.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid upstream \"{upstream}\": {source}")]
    InvalidUpstream {
        upstream: String,
        source: axum::http::uri::InvalidUri,
    },
}

/// Shared state of the relay handlers.
#[derive(Clone)]
pub struct RelayState {
    client: Client<HttpConnector, Body>,
    upstream: Uri,
    prefix: Arc<str>,
    strip_prefix: bool,
    skip_prefixes: Arc<[String]>,
}

impl RelayState {
    pub fn new(config: &AppConfig) -> Result<Self, RelayError> {
        let relay = &config.relay;
        let upstream: Uri = relay
            .upstream
            .parse()
            .map_err(|source| RelayError::InvalidUpstream {
                upstream: relay.upstream.clone(),
                source,
            })?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            upstream,
            prefix: Arc::from(relay.prefix.as_str()),
            strip_prefix: relay.strip_prefix,
            skip_prefixes: relay.compression.skip_prefixes.clone().into(),
        })
    }

    fn skips_compression(&self, path: &str) -> bool {
        self.skip_prefixes.iter().any(|prefix| {
            path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// Reverse proxy in front of a streaming server.
pub struct RelayServer {
    router: Router,
    upstream: Uri,
    shutdown: CancellationToken,
}

impl RelayServer {
    pub fn new(config: &AppConfig, shutdown: CancellationToken) -> Result<Self, RelayError> {
        let state = RelayState::new(config)?;
        let upstream = state.upstream.clone();
        let router = Self::build_router(config, state);
        Ok(Self {
            router,
            upstream,
            shutdown,
        })
    }

    /// Build the axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &AppConfig, state: RelayState) -> Router {
        let prefix = config.relay.prefix.as_str();
        let routes = if prefix.is_empty() {
            Router::new().fallback(relay_handler)
        } else {
            Router::new()
                .route(prefix, any(relay_handler))
                .route(&format!("{prefix}/{{*path}}"), any(relay_handler))
                .route("/", get(|| async { (StatusCode::OK, "OK") }))
        };
        let mut router = routes.with_state(state);

        if config.relay.compression.enabled {
            router = router.layer(compression_layer());
        }

        let x_request_id = axum::http::HeaderName::from_static(X_REQUEST_ID);
        router
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run until the shutdown token is cancelled.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.upstream,
            "Relay starting"
        );

        let shutdown = self.shutdown;
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!("Relay stopped");
        Ok(())
    }
}

/// Forward one request to the upstream and relay the response as it arrives.
async fn relay_handler(
    State(state): State<RelayState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let started = Instant::now();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let unbuffered = state.skips_compression(request.uri().path());

    let (mut parts, body) = request.into_parts();
    let target = rewrite_path(&parts.uri, &state.prefix, state.strip_prefix);
    let uri = match upstream_uri(&state.upstream, &target) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, target = %target, error = %e, "Cannot build upstream URI");
            metrics::record_relay_request(500, started);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Invalid upstream URI").into_response();
        }
    };

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        upstream_uri = %uri,
        "Relaying request"
    );

    let host = parts.headers.get(HOST).cloned();
    strip_hop_by_hop(&mut parts.headers);
    add_forwarded_headers(&mut parts.headers, peer.ip(), host.as_ref());
    parts.uri = uri;
    parts.version = Version::HTTP_11;

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let status = response.status();
            metrics::record_relay_request(status.as_u16(), started);
            tracing::debug!(
                request_id = %request_id,
                status = status.as_u16(),
                latency_ms = started.elapsed().as_millis() as u64,
                "Upstream responded"
            );

            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            let mut response = Response::from_parts(parts, Body::new(body));
            if unbuffered {
                mark_unbuffered(&mut response);
            }
            response
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            metrics::record_relay_request(502, started);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
