//! Output sinks for engine events.
//!
//! Forecasts, alerts and lifecycle events are handed to a
//! [`dispatcher::SinkDispatcher`], which fans them out to every configured
//! [`Publisher`] in the background so the engine never waits on a sink.
//! Built-in publishers write JSON lines to stdout or POST to a webhook.

pub mod dispatcher;
pub mod error;
pub mod publishers;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use error::Result;
use printwatch_common::types::{OutboundEvent, StreamLineage};

/// A destination for engine output.
///
/// `lineage` identifies the device stream the event was derived from; the
/// event's own stream id is `event.stream_id(lineage)`.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Delivers one event. The dispatcher retries on error.
    async fn publish(&self, lineage: &StreamLineage, event: &OutboundEvent) -> Result<()>;

    /// Short name used in logs (e.g. `"stdout"`, `"webhook"`).
    fn name(&self) -> &str;
}
