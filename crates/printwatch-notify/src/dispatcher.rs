use crate::error::{Result, SinkError};
use crate::Publisher;
use printwatch_common::types::{OutboundEvent, StreamLineage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How often and how patiently a failed publish is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per event and publisher, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Delivery counters reported when the dispatcher drains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
}

struct Envelope {
    lineage: StreamLineage,
    event: OutboundEvent,
}

/// Fire-and-forget fan-out to every publisher.
///
/// `publish` only enqueues. A single background task delivers events in
/// order, retrying each publisher per [`RetryPolicy`] and logging the ones
/// that still fail. Dropping every clone of the dispatcher lets the task
/// drain the queue and finish; await the handle returned by
/// [`SinkDispatcher::spawn`] to wait for that.
#[derive(Clone)]
pub struct SinkDispatcher {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl SinkDispatcher {
    pub fn spawn(
        publishers: Vec<Arc<dyn Publisher>>,
        retry: RetryPolicy,
    ) -> (Self, JoinHandle<DispatchStats>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(rx, publishers, retry));
        (Self { tx }, task)
    }

    pub fn publish(&self, lineage: &StreamLineage, event: OutboundEvent) -> Result<()> {
        self.tx
            .send(Envelope {
                lineage: lineage.clone(),
                event,
            })
            .map_err(|_| SinkError::Closed)
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    publishers: Vec<Arc<dyn Publisher>>,
    retry: RetryPolicy,
) -> DispatchStats {
    let mut stats = DispatchStats::default();
    while let Some(envelope) = rx.recv().await {
        for publisher in &publishers {
            if deliver(publisher.as_ref(), &envelope, retry).await {
                stats.delivered += 1;
            } else {
                stats.failed += 1;
            }
        }
    }
    tracing::debug!(
        delivered = stats.delivered,
        failed = stats.failed,
        "Sink dispatcher drained"
    );
    stats
}

async fn deliver(publisher: &dyn Publisher, envelope: &Envelope, retry: RetryPolicy) -> bool {
    let attempts = retry.max_attempts.max(1);
    let stream_id = envelope.event.stream_id(&envelope.lineage);

    for attempt in 0..attempts {
        match publisher.publish(&envelope.lineage, &envelope.event).await {
            Ok(()) => return true,
            Err(e) if attempt + 1 < attempts => {
                tracing::warn!(
                    sink = publisher.name(),
                    stream_id,
                    attempt = attempt + 1,
                    error = %e,
                    "Publish failed, retrying"
                );
                tokio::time::sleep(retry.delay_after(attempt)).await;
            }
            Err(e) => {
                tracing::error!(
                    sink = publisher.name(),
                    stream_id,
                    attempts,
                    error = %e,
                    "SinkPublishFailure: giving up on event"
                );
            }
        }
    }
    false
}
