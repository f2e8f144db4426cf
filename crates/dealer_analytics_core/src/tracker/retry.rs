//! crates/dealer_analytics_core/src/tracker/retry.rs
//!
//! The retry scheduler: a background task that holds failed events until their
//! backoff expires, then puts them back at the head of the tracker's queue.

use super::TrackerInner;
use crate::domain::AnalyticsEvent;
use futures::StreamExt;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::debug;

/// One failed event waiting for another delivery attempt.
#[derive(Debug)]
pub(crate) struct RetryRequest {
    pub event: AnalyticsEvent,
    pub delay: Duration,
    /// The consent epoch the event was buffered under.
    pub epoch: u64,
}

pub(crate) async fn run_scheduler(
    tracker: Weak<TrackerInner>,
    mut requests: mpsc::Receiver<RetryRequest>,
    shutdown: CancellationToken,
) {
    let mut pending: DelayQueue<(AnalyticsEvent, u64)> = DelayQueue::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            request = requests.recv() => match request {
                Some(RetryRequest { event, delay, epoch }) => {
                    debug!("Retrying {} event in {:?}.", event.event_type, delay);
                    pending.insert((event, epoch), delay);
                }
                // Every sender is gone, so the tracker has been dropped.
                None => break,
            },
            Some(expired) = pending.next(), if !pending.is_empty() => {
                let Some(inner) = tracker.upgrade() else { break };
                let (event, epoch) = expired.into_inner();
                inner.requeue(event, epoch);
            }
        }
    }

    if !pending.is_empty() {
        debug!("Retry scheduler stopped with {} events still waiting.", pending.len());
    }
}
