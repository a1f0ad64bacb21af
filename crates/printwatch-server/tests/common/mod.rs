#![allow(dead_code)]

use async_trait::async_trait;
use printwatch_alert::{EngineConfig, WindowPolicy};
use printwatch_common::types::{OutboundEvent, StreamLineage};
use printwatch_notify::error::Result;
use printwatch_notify::Publisher;
use printwatch_server::config::ServerConfig;
use std::sync::{Arc, Mutex};

/// Keeps every published event together with its stream id.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, OutboundEvent)>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<(String, OutboundEvent)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, lineage: &StreamLineage, event: &OutboundEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push((event.stream_id(lineage).to_string(), event.clone()));
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig {
        engine: EngineConfig {
            window: WindowPolicy::Count { max_count: 10 },
            min_window: 5,
            forecast_length: 10,
            smoothing_span_secs: 0,
            ..EngineConfig::default()
        },
        ..ServerConfig::default()
    };
    config.sinks.stdout = false;
    config.sinks.retry_base_ms = 1;
    config
}

pub fn ts(secs: u32) -> String {
    format!("2024-05-01T12:00:{secs:02}Z")
}

pub fn open_line(device_id: &str, name: &str) -> String {
    format!(r#"{{"type":"stream_open","device_id":"{device_id}","display_name":"{name}"}}"#)
}

pub fn close_line(device_id: &str) -> String {
    format!(r#"{{"type":"stream_close","device_id":"{device_id}"}}"#)
}

/// One `samples` line with a record per `(second, value)` for `field`.
pub fn samples_line(device_id: &str, field: &str, points: &[(u32, f64)]) -> String {
    let records: Vec<String> = points
        .iter()
        .map(|(secs, value)| {
            format!(
                r#"{{"timestamp":"{}","fields":{{"{field}":{value:?}}}}}"#,
                ts(*secs)
            )
        })
        .collect();
    format!(
        r#"{{"type":"samples","device_id":"{device_id}","records":[{}]}}"#,
        records.join(",")
    )
}

pub fn recorder() -> (Arc<RecordingPublisher>, Vec<Arc<dyn Publisher>>) {
    let recorder = Arc::new(RecordingPublisher::default());
    let publishers: Vec<Arc<dyn Publisher>> = vec![recorder.clone()];
    (recorder, publishers)
}
