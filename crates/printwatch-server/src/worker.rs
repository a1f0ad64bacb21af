use printwatch_alert::StreamLifecycleManager;
use printwatch_common::types::{SampleRecord, StreamLineage, TransportEvent};
use printwatch_notify::dispatcher::SinkDispatcher;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

enum WorkItem {
    Batch(Vec<SampleRecord>),
    Close,
}

struct DeviceWorker {
    tx: mpsc::Sender<WorkItem>,
    task: JoinHandle<()>,
}

/// Routes transport events to one worker task per open device stream.
///
/// A device's batches are handled in arrival order by its own task; its
/// close is queued behind them, so every batch sent before a close is
/// processed before the stream is torn down.
pub struct StreamRouter {
    manager: Arc<StreamLifecycleManager>,
    dispatcher: SinkDispatcher,
    capacity: usize,
    workers: HashMap<String, DeviceWorker>,
}

impl StreamRouter {
    pub fn new(
        manager: Arc<StreamLifecycleManager>,
        dispatcher: SinkDispatcher,
        capacity: usize,
    ) -> Self {
        Self {
            manager,
            dispatcher,
            capacity: capacity.max(1),
            workers: HashMap::new(),
        }
    }

    pub async fn route(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::StreamOpen {
                device_id,
                display_name,
            } => {
                let lineage = self
                    .manager
                    .on_stream_open(&device_id, display_name.as_deref());
                if !self.workers.contains_key(&device_id) {
                    let worker = self.spawn_worker(device_id.clone(), lineage);
                    self.workers.insert(device_id, worker);
                }
            }
            TransportEvent::Samples { device_id, records } => {
                let Some(worker) = self.workers.get(&device_id) else {
                    tracing::warn!(device_id = %device_id, "Samples for unopened stream dropped");
                    return;
                };
                if worker.tx.send(WorkItem::Batch(records)).await.is_err() {
                    tracing::warn!(device_id = %device_id, "Device worker stopped, batch dropped");
                }
            }
            TransportEvent::StreamClose { device_id } => match self.workers.remove(&device_id) {
                Some(worker) => stop_worker(&device_id, worker).await,
                None => self.close_unrouted(&device_id),
            },
        }
    }

    /// Closes every remaining stream, waiting for queued batches first.
    pub async fn shutdown(mut self) {
        let mut workers: Vec<(String, DeviceWorker)> = self.workers.drain().collect();
        workers.sort_by(|a, b| a.0.cmp(&b.0));
        for (device_id, worker) in workers {
            stop_worker(&device_id, worker).await;
        }
    }

    /// Close for a device without a worker; the manager logs unknown ones.
    fn close_unrouted(&self, device_id: &str) {
        let lineage = self
            .manager
            .lineage(device_id)
            .unwrap_or_else(|| StreamLineage::new(device_id, None));
        if let Some(event) = self.manager.on_stream_close(device_id) {
            if let Err(e) = self.dispatcher.publish(&lineage, event) {
                tracing::warn!(device_id, error = %e, "Failed to queue event");
            }
        }
    }

    fn spawn_worker(&self, device_id: String, lineage: StreamLineage) -> DeviceWorker {
        let (tx, mut rx) = mpsc::channel(self.capacity);
        let manager = Arc::clone(&self.manager);
        let dispatcher = self.dispatcher.clone();

        let task = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                let (events, done) = match item {
                    WorkItem::Batch(records) => (manager.process_batch(&device_id, &records), false),
                    WorkItem::Close => (manager.on_stream_close(&device_id).into_iter().collect(), true),
                };
                for event in events {
                    if let Err(e) = dispatcher.publish(&lineage, event) {
                        tracing::warn!(device_id = %device_id, error = %e, "Failed to queue event");
                    }
                }
                if done {
                    break;
                }
            }
            tracing::debug!(device_id = %device_id, "Device worker stopped");
        });

        DeviceWorker { tx, task }
    }
}

async fn stop_worker(device_id: &str, worker: DeviceWorker) {
    if worker.tx.send(WorkItem::Close).await.is_err() {
        tracing::warn!(device_id, "Device worker already stopped");
    }
    drop(worker.tx);
    if let Err(e) = worker.task.await {
        tracing::error!(device_id, error = %e, "Device worker panicked");
    }
}
