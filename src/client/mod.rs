//! Client for JSON-lines streams.
//!
//! # Data Flow
//! ```text
//! StreamClient::subscribe(url, interval)
//!     → GET url?interval=...      (reqwest)
//!     → non-2xx ⇒ ClientError::Status with the body text
//!     → body chunks → decoder.rs  (NdjsonDecoder)
//!     → Stream<Item = Result<T, ClientError>>
//! ```
//!
//! # Design Decisions
//! - The stream ends after the first error; errors carry the time since the
//!   stream started so stalls and aborts can be told apart
//! - A body that ends cleanly between records is a normal end of stream

pub mod decoder;

pub use decoder::NdjsonDecoder;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Client-side stream failures.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("stream broke after {after:?}: {source}")]
    Transport {
        after: Duration,
        #[source]
        source: reqwest::Error,
    },

    #[error("errored after {after:?}: {source}")]
    Decode {
        after: Duration,
        #[source]
        source: serde_json::Error,
    },

    #[error("stream ended mid-record after {after:?}")]
    Truncated { after: Duration },
}

/// Subscribes to streaming endpoints.
#[derive(Debug, Clone, Default)]
pub struct StreamClient {
    http: reqwest::Client,
}

struct Subscription {
    body: BoxStream<'static, Result<Bytes, reqwest::Error>>,
    decoder: NdjsonDecoder,
    started: Instant,
    done: bool,
}

impl StreamClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Open a stream of records of type `T`.
    ///
    /// Resolves once the response head has arrived.
    pub async fn subscribe<T>(
        &self,
        url: &str,
        interval: Option<&str>,
    ) -> Result<BoxStream<'static, Result<T, ClientError>>, ClientError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let url = stream_url(url, interval)?;
        tracing::debug!(url = %url, "Subscribing");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: body.trim_end().to_string(),
            });
        }

        let subscription = Subscription {
            body: response.bytes_stream().boxed(),
            decoder: NdjsonDecoder::new(),
            started: Instant::now(),
            done: false,
        };
        Ok(stream::unfold(subscription, next_record::<T>).boxed())
    }
}

async fn next_record<T: DeserializeOwned>(
    mut sub: Subscription,
) -> Option<(Result<T, ClientError>, Subscription)> {
    if sub.done {
        return None;
    }
    loop {
        if let Some(decoded) = sub.decoder.decode_next::<T>() {
            let item = decoded.map_err(|source| {
                sub.done = true;
                ClientError::Decode {
                    after: sub.started.elapsed(),
                    source,
                }
            });
            return Some((item, sub));
        }

        match sub.body.next().await {
            Some(Ok(chunk)) => sub.decoder.push(&chunk),
            Some(Err(source)) => {
                sub.done = true;
                let after = sub.started.elapsed();
                return Some((Err(ClientError::Transport { after, source }), sub));
            }
            None => {
                sub.done = true;
                if sub.decoder.remainder().iter().all(u8::is_ascii_whitespace) {
                    return None;
                }
                let after = sub.started.elapsed();
                return Some((Err(ClientError::Truncated { after }), sub));
            }
        }
    }
}

/// `url` with the `interval` query parameter set.
pub fn stream_url(url: &str, interval: Option<&str>) -> Result<Url, ClientError> {
    let mut url = Url::parse(url)?;
    if let Some(interval) = interval {
        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != "interval")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(retained)
            .append_pair("interval", interval);
    }
    Ok(url)
}
