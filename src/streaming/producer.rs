//! Background producer loop.
//!
//! # State Machine
//! ```text
//! WaitingForTick ──tick──▶ Reading ──ok──▶ HandingOff ──accepted──▶ WaitingForTick
//!                             │
//!                             └──err──▶ (error handed off) ──▶ Stopped
//!
//! any state ──cancelled──▶ Stopped
//! ```
//!
//! The producer owns both handoff senders and the timer. Returning from
//! [`Producer::run`] drops them, which is how the transmission side learns
//! that no further value will arrive.

use tokio::sync::mpsc;
use tokio::time::Interval;
use tokio_util::sync::CancellationToken;

use crate::http::request::RequestContext;
use crate::streaming::source::{ReadCallback, SourceError};

/// Producer loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    WaitingForTick,
    Reading,
    HandingOff,
    Stopped,
}

/// Why the producer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerExit {
    /// Cancellation was observed at a wait point.
    Cancelled,
    /// The source failed; the error was handed off.
    ReadFailed,
    /// The transmission side dropped its receiver.
    ReceiverGone,
}

/// The handoff slot was closed by the receiving side.
#[derive(Debug)]
pub(crate) struct HandoffClosed;

/// Periodic reader feeding one stream session.
pub(crate) struct Producer<T> {
    source: ReadCallback<T>,
    ctx: RequestContext,
    ticker: Interval,
    cancel: CancellationToken,
    records: mpsc::Sender<T>,
    errors: mpsc::Sender<SourceError>,
    state: ProducerState,
}

impl<T: Send + 'static> Producer<T> {
    pub(crate) fn new(
        source: ReadCallback<T>,
        ctx: RequestContext,
        ticker: Interval,
        cancel: CancellationToken,
        records: mpsc::Sender<T>,
        errors: mpsc::Sender<SourceError>,
    ) -> Self {
        Self {
            source,
            ctx,
            ticker,
            cancel,
            records,
            errors,
            state: ProducerState::WaitingForTick,
        }
    }

    /// Run until cancelled, the source fails, or the receiver goes away.
    pub(crate) async fn run(mut self) -> ProducerExit {
        let exit = self.run_loop().await;
        self.transition(ProducerState::Stopped);
        tracing::debug!(exit = ?exit, "Producer stopped, closing handoff channels");
        exit
    }

    async fn run_loop(&mut self) -> ProducerExit {
        loop {
            self.transition(ProducerState::WaitingForTick);
            tokio::select! {
                _ = self.cancel.cancelled() => return ProducerExit::Cancelled,
                _ = self.ticker.tick() => {}
            }

            // Reads are not preempted; cancellation is seen at the next wait.
            self.transition(ProducerState::Reading);
            let record = match self.source.read(&self.ctx).await {
                Ok(record) => record,
                Err(err) => {
                    tracing::error!(error = %err, "Read error, stopping producer");
                    tokio::select! {
                        _ = self.cancel.cancelled() => {}
                        _ = self.errors.send(err) => {}
                    }
                    return ProducerExit::ReadFailed;
                }
            };

            self.transition(ProducerState::HandingOff);
            tokio::select! {
                _ = self.cancel.cancelled() => return ProducerExit::Cancelled,
                delivered = handoff(&self.records, record) => {
                    if delivered.is_err() {
                        return ProducerExit::ReceiverGone;
                    }
                }
            }
        }
    }

    fn transition(&mut self, next: ProducerState) {
        tracing::trace!(from = ?self.state, to = ?next, "Producer state");
        self.state = next;
    }
}

/// Pass one value through a single-slot channel and wait until the receiver
/// has taken it.
///
/// The slot is free again only once the receiver dequeues the value, so
/// waiting for capacity after the send is the acknowledgement.
pub(crate) async fn handoff<T>(slot: &mpsc::Sender<T>, value: T) -> Result<(), HandoffClosed> {
    slot.send(value).await.map_err(|_| HandoffClosed)?;
    slot.reserve().await.map(drop).map_err(|_| HandoffClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, Method};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::{self, Instant, MissedTickBehavior};

    fn context() -> RequestContext {
        RequestContext::new(Method::GET, "/ping".parse().unwrap(), HeaderMap::new())
    }

    fn ticker(period: Duration) -> Interval {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }

    fn counting(fail_at: Option<usize>) -> (ReadCallback<usize>, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reads);
        let source = ReadCallback::plain(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if Some(n) == fail_at {
                    Err(format!("read {n} failed"))
                } else {
                    Ok(n)
                }
            }
        });
        (source, reads)
    }

    #[tokio::test(start_paused = true)]
    async fn handoff_waits_for_receiver() {
        let (tx, mut rx) = mpsc::channel::<u32>(1);
        let send = tokio::spawn(async move { handoff(&tx, 1).await.is_ok() });

        time::sleep(Duration::from_secs(5)).await;
        assert!(!send.is_finished(), "handoff returned before the value was taken");

        assert_eq!(rx.recv().await, Some(1));
        assert!(send.await.unwrap());
    }

    #[tokio::test]
    async fn handoff_fails_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel::<u32>(1);
        drop(rx);
        assert!(handoff(&tx, 1).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stalls_until_record_is_taken() {
        let (source, reads) = counting(None);
        let (records_tx, mut records) = mpsc::channel(1);
        let (errors_tx, _errors) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let producer = Producer::new(
            source,
            context(),
            ticker(Duration::from_millis(10)),
            cancel.clone(),
            records_tx,
            errors_tx,
        );
        let handle = tokio::spawn(producer.run());

        // Nobody receives: exactly one read is pending in the slot.
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        assert_eq!(records.recv().await, Some(1));
        assert_eq!(records.recv().await, Some(2));

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), ProducerExit::Cancelled);
        assert_eq!(records.recv().await, None, "records channel left open");
    }

    #[tokio::test(start_paused = true)]
    async fn read_error_is_handed_off_once_and_stops() {
        let (source, reads) = counting(Some(2));
        let (records_tx, mut records) = mpsc::channel(1);
        let (errors_tx, mut errors) = mpsc::channel(1);
        let producer = Producer::new(
            source,
            context(),
            ticker(Duration::from_millis(10)),
            CancellationToken::new(),
            records_tx,
            errors_tx,
        );
        let handle = tokio::spawn(producer.run());

        assert_eq!(records.recv().await, Some(1));
        let err = errors.recv().await.expect("error handed off");
        assert_eq!(err.to_string(), "read 2 failed");

        assert_eq!(handle.await.unwrap(), ProducerExit::ReadFailed);
        assert_eq!(errors.recv().await.map(|e| e.to_string()), None);
        assert_eq!(records.recv().await, None);

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(reads.load(Ordering::SeqCst), 2, "read retried after failure");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_first_tick_never_reads() {
        let (source, reads) = counting(None);
        let (records_tx, _records) = mpsc::channel(1);
        let (errors_tx, _errors) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let producer = Producer::new(
            source,
            context(),
            ticker(Duration::from_secs(1)),
            cancel,
            records_tx,
            errors_tx,
        );

        assert_eq!(producer.run().await, ProducerExit::Cancelled);
        assert_eq!(reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_receiver_dropped() {
        let (source, _reads) = counting(None);
        let (records_tx, records) = mpsc::channel(1);
        let (errors_tx, _errors) = mpsc::channel(1);
        let producer = Producer::new(
            source,
            context(),
            ticker(Duration::from_millis(10)),
            CancellationToken::new(),
            records_tx,
            errors_tx,
        );
        drop(records);

        assert_eq!(producer.run().await, ProducerExit::ReceiverGone);
    }
}
