//! Request and response rewriting for the relay.

use axum::http::header::{CONNECTION, HOST};
use axum::http::uri::{InvalidUriParts, PathAndQuery};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Uri};
use std::net::IpAddr;
use thiserror::Error;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Path and query as seen by the upstream.
///
/// With `strip` set, `prefix` is removed from the front of the path;
/// `/api/ping?interval=1s` becomes `/ping?interval=1s` and `/api` becomes `/`.
pub fn rewrite_path(uri: &Uri, prefix: &str, strip: bool) -> String {
    let path = uri.path();
    let rest = if strip && !prefix.is_empty() {
        path.strip_prefix(prefix).unwrap_or(path)
    } else {
        path
    };

    let mut rewritten = if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{rest}")
    };
    if let Some(query) = uri.query() {
        rewritten.push('?');
        rewritten.push_str(query);
    }
    rewritten
}

/// A request target the upstream URI cannot be built from.
#[derive(Debug, Error)]
pub enum UpstreamUriError {
    #[error("invalid path \"{0}\"")]
    Path(String),
    #[error(transparent)]
    Parts(#[from] InvalidUriParts),
}

/// Join the upstream's scheme and authority with a rewritten path.
pub fn upstream_uri(upstream: &Uri, path_and_query: &str) -> Result<Uri, UpstreamUriError> {
    let path_and_query = path_and_query
        .parse::<PathAndQuery>()
        .map_err(|_| UpstreamUriError::Path(path_and_query.to_string()))?;
    let mut parts = upstream.clone().into_parts();
    parts.path_and_query = Some(path_and_query);
    Ok(Uri::from_parts(parts)?)
}

/// Append the client address to `X-Forwarded-For` and record the original
/// host and protocol.
pub fn add_forwarded_headers(headers: &mut HeaderMap, client: IpAddr, host: Option<&HeaderValue>) {
    let forwarded_for = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {client}"),
        None => client.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        headers.insert(X_FORWARDED_FOR, value);
    }
    if let Some(host) = host {
        headers.insert(X_FORWARDED_HOST, host.clone());
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    headers.remove(HOST);
}
