use crate::dispatcher::{DispatchStats, RetryPolicy, SinkDispatcher};
use crate::error::{Result, SinkError};
use crate::publishers::StdoutPublisher;
use crate::Publisher;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use printwatch_common::types::{
    AlertRecord, AlertStatus, FinishedRecord, ForecastPoint, ForecastRecord, OutboundEvent,
    StreamLineage,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every delivered event, failing the first `fail_first` calls.
struct RecordingPublisher {
    fail_first: u32,
    calls: AtomicU32,
    seen: Mutex<Vec<(String, OutboundEvent)>>,
}

impl RecordingPublisher {
    fn new(fail_first: u32) -> Self {
        Self {
            fail_first,
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<(String, OutboundEvent)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, lineage: &StreamLineage, event: &OutboundEvent) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(SinkError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.seen
            .lock()
            .unwrap()
            .push((event.stream_id(lineage).to_string(), event.clone()));
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
    }
}

fn alert(value: f64) -> OutboundEvent {
    OutboundEvent::Alert(AlertRecord {
        status: AlertStatus::OverNow,
        parameter: "bed_temperature".to_string(),
        value,
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        message: "hot".to_string(),
    })
}

fn forecast() -> OutboundEvent {
    let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    OutboundEvent::Forecast(ForecastRecord {
        parameter: "fluctuated_ambient_temperature".to_string(),
        generated_from: ts,
        points: vec![ForecastPoint {
            timestamp: ts + chrono::Duration::seconds(1),
            value: 50.0,
        }],
    })
}

#[tokio::test]
async fn dispatcher_delivers_in_order_to_every_publisher() {
    let a = Arc::new(RecordingPublisher::new(0));
    let b = Arc::new(RecordingPublisher::new(0));
    let publishers: Vec<Arc<dyn Publisher>> = vec![a.clone(), b.clone()];
    let (dispatcher, task) = SinkDispatcher::spawn(publishers, fast_retry(3));

    let lineage = StreamLineage::new("s-1", Some("Printer 1"));
    dispatcher.publish(&lineage, forecast()).unwrap();
    dispatcher.publish(&lineage, alert(120.0)).unwrap();
    drop(dispatcher);

    let stats = task.await.unwrap();
    assert_eq!(stats, DispatchStats { delivered: 4, failed: 0 });

    for publisher in [a, b] {
        let seen = publisher.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "s-1-forecast");
        assert_eq!(seen[1].0, "s-1-alerts");
    }
}

#[tokio::test]
async fn dispatcher_retries_transient_failures() {
    let flaky = Arc::new(RecordingPublisher::new(2));
    let publishers: Vec<Arc<dyn Publisher>> = vec![flaky.clone()];
    let (dispatcher, task) = SinkDispatcher::spawn(publishers, fast_retry(3));

    let lineage = StreamLineage::new("s-1", None);
    dispatcher.publish(&lineage, alert(120.0)).unwrap();
    drop(dispatcher);

    let stats = task.await.unwrap();
    assert_eq!(stats.delivered, 1);
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn dispatcher_gives_up_after_max_attempts() {
    let broken = Arc::new(RecordingPublisher::new(u32::MAX));
    let healthy = Arc::new(RecordingPublisher::new(0));
    let publishers: Vec<Arc<dyn Publisher>> = vec![broken.clone(), healthy.clone()];
    let (dispatcher, task) = SinkDispatcher::spawn(publishers, fast_retry(2));

    let lineage = StreamLineage::new("s-1", None);
    dispatcher.publish(&lineage, alert(120.0)).unwrap();
    dispatcher.publish(&lineage, alert(121.0)).unwrap();
    drop(dispatcher);

    let stats = task.await.unwrap();
    assert_eq!(stats, DispatchStats { delivered: 2, failed: 2 });
    assert_eq!(broken.calls.load(Ordering::SeqCst), 4);
    // a failing sink does not hold back the others
    assert_eq!(healthy.seen().len(), 2);
}

#[tokio::test]
async fn publish_after_shutdown_is_closed() {
    let (dispatcher, task) = SinkDispatcher::spawn(Vec::new(), RetryPolicy::default());
    task.abort();
    let _ = task.await;

    let err = dispatcher
        .publish(&StreamLineage::new("s-1", None), alert(1.0))
        .unwrap_err();
    assert!(matches!(err, SinkError::Closed));
}

#[test]
fn stdout_line_carries_stream_identity() {
    let lineage = StreamLineage::new("s-1", Some("Printer 1"));
    let line = StdoutPublisher::render_line(&lineage, &alert(120.0)).unwrap();
    assert!(line.ends_with('\n'));

    let json: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
    assert_eq!(json["stream_id"], "s-1-alerts");
    assert_eq!(json["stream_name"], "Printer 1 - Alerts");
    assert_eq!(json["parents"][0], "s-1");
    assert_eq!(json["kind"], "alert");
    assert_eq!(json["status"], "over-now");
}

#[test]
fn finished_event_goes_to_alerts_stream() {
    let lineage = StreamLineage::new("s-1", Some("Printer 1"));
    let event = OutboundEvent::Finished(FinishedRecord {
        device_id: "s-1".to_string(),
        display_name: "Printer 1".to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        message: "Printer 1 finished".to_string(),
    });
    let line = StdoutPublisher::render_line(&lineage, &event).unwrap();
    let json: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
    assert_eq!(json["stream_id"], "s-1-alerts");
    assert_eq!(json["kind"], "finished");
}

#[tokio::test]
async fn stdout_publisher_writes_to_writer() {
    let (writer, mut reader) = tokio::io::duplex(4096);
    let publisher = StdoutPublisher::with_writer(Box::new(writer));
    let lineage = StreamLineage::new("s-1", None);

    publisher.publish(&lineage, &forecast()).await.unwrap();
    drop(publisher);

    let mut out = String::new();
    tokio::io::AsyncReadExt::read_to_string(&mut reader, &mut out)
        .await
        .unwrap();
    assert!(out.contains("\"stream_id\":\"s-1-forecast\""));
    assert_eq!(out.lines().count(), 1);
}
