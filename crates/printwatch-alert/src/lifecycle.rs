use crate::engine::Engine;
use crate::state::{AlertState, AlertStateMachine};
use crate::threshold::ThresholdEvaluator;
use crate::window::SampleWindow;
use chrono::Utc;
use printwatch_common::types::{FinishedRecord, OutboundEvent, Sample, SampleRecord, StreamLineage};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Window, band and alert state of one monitored parameter of a device.
pub struct ParameterState {
    pub(crate) name: String,
    pub(crate) forecast: bool,
    pub(crate) window: SampleWindow,
    pub(crate) evaluator: ThresholdEvaluator,
    pub(crate) machine: AlertStateMachine,
}

impl ParameterState {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn window(&self) -> &SampleWindow {
        &self.window
    }

    pub fn evaluator(&self) -> &ThresholdEvaluator {
        &self.evaluator
    }

    pub fn alert_state(&self) -> AlertState {
        self.machine.state()
    }
}

/// Everything the engine keeps for one open device stream.
pub struct DeviceStreamContext {
    pub(crate) device_id: String,
    pub(crate) lineage: StreamLineage,
    pub(crate) parameters: Vec<ParameterState>,
}

impl DeviceStreamContext {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn lineage(&self) -> &StreamLineage {
        &self.lineage
    }

    pub fn parameters(&self) -> &[ParameterState] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterState> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

struct DeviceHandle {
    lineage: StreamLineage,
    closed: AtomicBool,
    context: Mutex<DeviceStreamContext>,
}

impl DeviceHandle {
    /// Lock the context, recovering from a poisoned Mutex if necessary.
    fn lock_context(&self) -> MutexGuard<'_, DeviceStreamContext> {
        self.context
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Registry of open device streams.
///
/// The registry lock is only held to insert, look up or remove a handle.
/// Work for one device is serialized on that device's context lock, so
/// devices never wait on each other. Open and close of one device are
/// serialized on the same lock: a close keeps it until the handle is out of
/// the registry. Closing a stream is the only way a context is dropped.
pub struct StreamLifecycleManager {
    engine: Arc<Engine>,
    registry: Mutex<HashMap<String, Arc<DeviceHandle>>>,
}

impl StreamLifecycleManager {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            registry: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn lock_registry(&self) -> MutexGuard<'_, HashMap<String, Arc<DeviceHandle>>> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn handle(&self, device_id: &str) -> Option<Arc<DeviceHandle>> {
        self.lock_registry().get(device_id).cloned()
    }

    /// Creates a fresh context for `device_id` and returns the lineage of
    /// its output streams. An already open device keeps its context; a
    /// device that is being closed is waited for and then opened afresh.
    pub fn on_stream_open(&self, device_id: &str, display_name: Option<&str>) -> StreamLineage {
        loop {
            if let Some(existing) = self.handle(device_id) {
                if !existing.is_closed() {
                    tracing::warn!(device_id, "Stream already open, keeping existing context");
                    return existing.lineage.clone();
                }
                // a close holds the context lock until the entry is gone
                drop(existing.lock_context());
                continue;
            }

            let mut context = self.engine.new_context(device_id, display_name);
            self.engine.restore(&mut context);
            let lineage = context.lineage.clone();

            match self.lock_registry().entry(device_id.to_string()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(entry) => {
                    entry.insert(Arc::new(DeviceHandle {
                        lineage: lineage.clone(),
                        closed: AtomicBool::new(false),
                        context: Mutex::new(context),
                    }));
                }
            }
            tracing::info!(
                device_id,
                forecast_stream = %lineage.forecast_stream_id,
                alerts_stream = %lineage.alerts_stream_id,
                "Stream opened"
            );
            return lineage;
        }
    }

    /// Tears down the context of `device_id` and returns the final
    /// "finished" event for its alerts stream.
    ///
    /// Work already running for the device completes first, and its output
    /// is discarded. The registry entry stays in place until the checkpoint
    /// is gone, so a concurrent open waits and then starts empty.
    pub fn on_stream_close(&self, device_id: &str) -> Option<OutboundEvent> {
        let Some(handle) = self.handle(device_id) else {
            tracing::warn!(device_id, "Close for unknown stream ignored");
            return None;
        };
        if handle.closed.swap(true, Ordering::SeqCst) {
            tracing::warn!(device_id, "Stream is already closing");
            return None;
        }

        let context = handle.lock_context();
        self.engine.discard_checkpoint(device_id);
        {
            let mut registry = self.lock_registry();
            if registry
                .get(device_id)
                .is_some_and(|current| Arc::ptr_eq(current, &handle))
            {
                registry.remove(device_id);
            }
        }
        drop(context);

        let lineage = &handle.lineage;
        tracing::info!(device_id, "Stream closed");
        Some(OutboundEvent::Finished(FinishedRecord {
            device_id: device_id.to_string(),
            display_name: lineage.display_name.clone(),
            timestamp: Utc::now(),
            message: format!("{} finished", lineage.display_name),
        }))
    }

    /// Closes every open stream, returning their "finished" events.
    pub fn close_all(&self) -> Vec<OutboundEvent> {
        let mut device_ids: Vec<String> = self.lock_registry().keys().cloned().collect();
        device_ids.sort();
        device_ids
            .iter()
            .filter_map(|device_id| self.on_stream_close(device_id))
            .collect()
    }

    pub fn process_batch(&self, device_id: &str, records: &[SampleRecord]) -> Vec<OutboundEvent> {
        self.run(device_id, |engine, context| {
            engine.process_batch(context, records)
        })
    }

    pub fn process_sample(&self, device_id: &str, sample: &Sample) -> Vec<OutboundEvent> {
        self.run(device_id, |engine, context| {
            match engine.process_sample(context, sample) {
                Ok(outputs) => outputs,
                Err(e) => {
                    tracing::warn!(device_id, parameter = %sample.parameter, error = %e, "Sample dropped");
                    Vec::new()
                }
            }
        })
    }

    fn run<F>(&self, device_id: &str, work: F) -> Vec<OutboundEvent>
    where
        F: FnOnce(&Engine, &mut DeviceStreamContext) -> Vec<crate::engine::EngineOutput>,
    {
        let Some(handle) = self.handle(device_id) else {
            tracing::warn!(device_id, "Samples for unknown stream dropped");
            return Vec::new();
        };

        let outputs = {
            let mut context = handle.lock_context();
            if handle.is_closed() {
                tracing::warn!(device_id, "Samples for closed stream dropped");
                return Vec::new();
            }
            work(&self.engine, &mut context)
        };

        if handle.is_closed() {
            tracing::debug!(device_id, "Stream closed during processing, output discarded");
            return Vec::new();
        }

        outputs
            .into_iter()
            .filter_map(|output| output.into_event())
            .collect()
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.lock_registry().contains_key(device_id)
    }

    pub fn device_count(&self) -> usize {
        self.lock_registry().len()
    }

    pub fn lineage(&self, device_id: &str) -> Option<StreamLineage> {
        self.handle(device_id).map(|h| h.lineage.clone())
    }

    /// Runs `f` against the live context of an open device.
    pub fn with_context<R>(
        &self,
        device_id: &str,
        f: impl FnOnce(&DeviceStreamContext) -> R,
    ) -> Option<R> {
        let handle = self.handle(device_id)?;
        let context = handle.lock_context();
        Some(f(&context))
    }
}
