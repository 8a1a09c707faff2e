//! Stream sessions: one per streaming request.
//!
//! [`Streamer::open`] does everything that can still fail with a status
//! code (interval parsing, first read, first encode). The returned
//! [`StreamSession`] is the transmission loop; each frame it yields is one
//! newline-terminated JSON record written and flushed on its own.

use bytes::Bytes;
use futures_util::Stream;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

use crate::http::request::RequestContext;
use crate::observability::metrics;
use crate::streaming::error::{StreamError, StreamOutcome};
use crate::streaming::interval::parse_interval;
use crate::streaming::mirror::RecordMirror;
use crate::streaming::producer::{Producer, ProducerExit};
use crate::streaming::source::{ReadCallback, SourceError};

/// Opens stream sessions. Shared by all requests of a server.
#[derive(Debug, Clone)]
pub struct Streamer {
    shutdown: CancellationToken,
    mirror_records: bool,
}

impl Streamer {
    /// Sessions opened by this streamer end when `shutdown` is cancelled.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            mirror_records: false,
        }
    }

    /// Mirror every encoded record as a debug event.
    pub fn with_record_mirror(mut self, enabled: bool) -> Self {
        self.mirror_records = enabled;
        self
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Start a session for one request.
    ///
    /// Returns once the first record is read and encoded; nothing has been
    /// written to the client at that point, so errors can still become a
    /// status code.
    pub async fn open<T>(
        &self,
        source: ReadCallback<T>,
        ctx: RequestContext,
    ) -> Result<StreamSession<T>, StreamError>
    where
        T: Serialize + Send + 'static,
    {
        let span = tracing::info_span!(
            "stream",
            request_id = %ctx.request_id(),
            path = %ctx.path(),
        );

        let interval = parse_interval(ctx.query("interval"))?;
        let cancel = self.shutdown.child_token();

        let start = time::Instant::now();
        let mut ticker = time::interval_at(start + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let first = source.read(&ctx).await.map_err(StreamError::Read)?;
        let first = encode(&first)?;

        let (records_tx, records) = mpsc::channel(1);
        let (errors_tx, errors) = mpsc::channel(1);
        let producer = Producer::new(source, ctx, ticker, cancel.clone(), records_tx, errors_tx);

        span.in_scope(|| {
            tracing::info!(interval = ?interval, "Stream opened");
        });
        metrics::record_session_opened();

        Ok(StreamSession {
            first: Some(first),
            producer: ProducerSlot::Idle(producer),
            records,
            errors,
            cancel,
            mirror: RecordMirror::new(span.clone(), self.mirror_records),
            span,
            interval,
            opened_at: Instant::now(),
            records_sent: 0,
            outcome: None,
        })
    }
}

enum ProducerSlot<T> {
    Idle(Producer<T>),
    Running(JoinHandle<ProducerExit>),
    Detached,
}

/// Transmission side of one streaming request.
///
/// Dropping the session (for instance because the client disconnected and
/// the server dropped the response body) cancels the producer.
pub struct StreamSession<T> {
    first: Option<Bytes>,
    producer: ProducerSlot<T>,
    records: mpsc::Receiver<T>,
    errors: mpsc::Receiver<SourceError>,
    cancel: CancellationToken,
    mirror: RecordMirror,
    span: Span,
    interval: Duration,
    opened_at: Instant,
    records_sent: u64,
    outcome: Option<StreamOutcome>,
}

impl<T> StreamSession<T>
where
    T: Serialize + Send + 'static,
{
    /// Next body frame, or `None` when the stream ended cleanly.
    ///
    /// An `Err` is yielded at most once and is always the last item.
    pub async fn next_frame(&mut self) -> Option<Result<Bytes, StreamError>> {
        if self.outcome.is_some() {
            return None;
        }

        if let Some(first) = self.first.take() {
            return Some(Ok(self.sent(first)));
        }

        self.start_producer();

        tokio::select! {
            _ = self.cancel.cancelled() => {
                self.finish(StreamOutcome::Cancelled);
                None
            }
            Some(err) = self.errors.recv() => {
                self.finish(StreamOutcome::ProducerFailed);
                Some(Err(StreamError::Read(err)))
            }
            received = self.records.recv() => match received {
                Some(record) => match encode(&record) {
                    Ok(frame) => Some(Ok(self.sent(frame))),
                    Err(err) => {
                        self.finish(StreamOutcome::EncodeFailed);
                        Some(Err(err))
                    }
                },
                // The producer hands off its error before closing.
                None => match self.errors.recv().await {
                    Some(err) => {
                        self.finish(StreamOutcome::ProducerFailed);
                        Some(Err(StreamError::Read(err)))
                    }
                    None if self.cancel.is_cancelled() => {
                        self.finish(StreamOutcome::Cancelled);
                        None
                    }
                    None => {
                        self.finish(StreamOutcome::ProducerStopped);
                        Some(Err(StreamError::ProducerStopped))
                    }
                },
            },
        }
    }

    /// Turn the session into a body stream.
    pub fn into_body_stream(self) -> impl Stream<Item = Result<Bytes, StreamError>> + Send + 'static {
        futures_util::stream::unfold(self, |mut session| async move {
            let frame = session.next_frame().await?;
            Some((frame, session))
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn records_sent(&self) -> u64 {
        self.records_sent
    }

    /// Take the producer task handle, if the producer is running.
    pub(crate) fn take_producer(&mut self) -> Option<JoinHandle<ProducerExit>> {
        match std::mem::replace(&mut self.producer, ProducerSlot::Detached) {
            ProducerSlot::Running(handle) => Some(handle),
            other => {
                self.producer = other;
                None
            }
        }
    }

    fn start_producer(&mut self) {
        if !matches!(self.producer, ProducerSlot::Idle(_)) {
            return;
        }
        if let ProducerSlot::Idle(producer) =
            std::mem::replace(&mut self.producer, ProducerSlot::Detached)
        {
            let handle = tokio::spawn(producer.run().instrument(self.span.clone()));
            self.producer = ProducerSlot::Running(handle);
        }
    }

    fn sent(&mut self, frame: Bytes) -> Bytes {
        self.mirror.write(&frame);
        self.records_sent += 1;
        metrics::record_frame_sent();
        frame
    }
}

impl<T> StreamSession<T> {
    fn finish(&mut self, outcome: StreamOutcome) {
        self.outcome.get_or_insert(outcome);
        self.cancel.cancel();
    }
}

impl<T> Drop for StreamSession<T> {
    fn drop(&mut self) {
        let outcome = match self.outcome {
            Some(outcome) => outcome,
            None if self.cancel.is_cancelled() => StreamOutcome::Cancelled,
            None => StreamOutcome::ClientGone,
        };
        self.cancel.cancel();

        // Unblock a producer parked in a handoff and discard what is in transit.
        self.records.close();
        self.errors.close();
        while self.records.try_recv().is_ok() {}
        while self.errors.try_recv().is_ok() {}

        let elapsed = self.opened_at.elapsed();
        let _enter = self.span.enter();
        if outcome.is_failure() {
            tracing::warn!(
                outcome = outcome.as_str(),
                records = self.records_sent,
                duration_ms = elapsed.as_millis() as u64,
                "Stream aborted"
            );
        } else {
            tracing::info!(
                outcome = outcome.as_str(),
                records = self.records_sent,
                duration_ms = elapsed.as_millis() as u64,
                "Stream closed"
            );
        }
        metrics::record_session_closed(outcome.as_str(), elapsed);
    }
}

/// Serialize one record as a JSON line.
pub(crate) fn encode<T: Serialize>(record: &T) -> Result<Bytes, StreamError> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}
