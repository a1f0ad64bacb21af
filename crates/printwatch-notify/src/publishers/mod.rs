pub mod stdout;
pub mod webhook;

pub use stdout::StdoutPublisher;
pub use webhook::WebhookPublisher;

use printwatch_common::types::{OutboundEvent, StreamLineage};
use serde::Serialize;

/// Wire form of an event: the event fields plus the stream it belongs on.
#[derive(Serialize)]
pub struct StreamEnvelope<'a> {
    pub stream_id: &'a str,
    pub stream_name: String,
    pub parents: &'a [String],
    #[serde(flatten)]
    pub event: &'a OutboundEvent,
}

impl<'a> StreamEnvelope<'a> {
    pub fn new(lineage: &'a StreamLineage, event: &'a OutboundEvent) -> Self {
        let stream_name = match event {
            OutboundEvent::Forecast(_) => lineage.forecast_stream_name(),
            OutboundEvent::Alert(_) | OutboundEvent::Finished(_) => lineage.alerts_stream_name(),
        };
        Self {
            stream_id: event.stream_id(lineage),
            stream_name,
            parents: &lineage.parents,
            event,
        }
    }
}
