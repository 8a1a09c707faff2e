//! Data source callbacks.
//!
//! A stream session reads one record per tick from a caller-supplied
//! callback. The callback either takes nothing or receives the
//! [`RequestContext`] of the request being served, so sources can tailor
//! records per request.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

use crate::http::request::RequestContext;

/// Error type data sources fail with.
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

type ReadFuture<T> = BoxFuture<'static, Result<T, SourceError>>;

/// A read callback panicked.
#[derive(Debug, Error)]
#[error("data source panicked: {0}")]
pub struct SourcePanic(String);

impl SourcePanic {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self(message)
    }
}

/// Caller-supplied record producer.
pub enum ReadCallback<T> {
    /// Context-free source.
    Plain(Arc<dyn Fn() -> ReadFuture<T> + Send + Sync>),
    /// Source parameterized by the current request.
    WithContext(Arc<dyn Fn(RequestContext) -> ReadFuture<T> + Send + Sync>),
}

impl<T: Send + 'static> ReadCallback<T> {
    /// Wrap an async closure that needs no request information.
    pub fn plain<F, Fut, E>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<SourceError>,
    {
        Self::Plain(Arc::new(move || -> ReadFuture<T> {
            let fut = f();
            Box::pin(async move { fut.await.map_err(Into::into) })
        }))
    }

    /// Wrap an async closure that receives the request context.
    pub fn with_context<F, Fut, E>(f: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<SourceError>,
    {
        Self::WithContext(Arc::new(move |ctx| -> ReadFuture<T> {
            let fut = f(ctx);
            Box::pin(async move { fut.await.map_err(Into::into) })
        }))
    }

    /// Wrap a synchronous closure that may block.
    ///
    /// Each read runs on the blocking thread pool so the runtime keeps
    /// serving other streams while the source works.
    pub fn blocking<F, E>(f: F) -> Self
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        E: Into<SourceError>,
    {
        let f = Arc::new(f);
        Self::Plain(Arc::new(move || -> ReadFuture<T> {
            let f = Arc::clone(&f);
            Box::pin(async move {
                match tokio::task::spawn_blocking(move || f().map_err(Into::into)).await {
                    Ok(result) => result,
                    Err(join) => Err(Box::new(join) as SourceError),
                }
            })
        }))
    }

    /// Produce the next record.
    ///
    /// A panicking callback is reported as a [`SourcePanic`] error.
    pub async fn read(&self, ctx: &RequestContext) -> Result<T, SourceError> {
        let read = async {
            match self {
                Self::Plain(f) => f().await,
                Self::WithContext(f) => f(ctx.clone()).await,
            }
        };
        match AssertUnwindSafe(read).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(SourcePanic::from_payload(payload).into()),
        }
    }
}

impl<T> Clone for ReadCallback<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Plain(f) => Self::Plain(Arc::clone(f)),
            Self::WithContext(f) => Self::WithContext(Arc::clone(f)),
        }
    }
}

impl<T> std::fmt::Debug for ReadCallback<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("ReadCallback::Plain"),
            Self::WithContext(_) => f.write_str("ReadCallback::WithContext"),
        }
    }
}
