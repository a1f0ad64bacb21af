use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::forecast::TrendForecaster;
use crate::lifecycle::{DeviceStreamContext, ParameterState};
use crate::state::AlertStateMachine;
use crate::threshold::{Band, ThresholdEvaluator};
use crate::window::SampleWindow;
use chrono::{Duration, Utc};
use printwatch_common::types::{
    AlertRecord, AlertStatus, ForecastRecord, OutboundEvent, Sample, SampleRecord, StreamLineage,
};
use printwatch_storage::WindowCheckpoint;
use std::sync::Arc;
use std::time::Instant;

/// What one evaluation of a parameter produced.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutput {
    Forecast(ForecastRecord),
    Alert(AlertRecord),
    /// The window is still filling up (or the fit failed); nothing was published.
    NotEnoughData {
        parameter: String,
        have: usize,
        need: usize,
    },
}

impl EngineOutput {
    /// The sink event for this output. Diagnostics have none.
    pub fn into_event(self) -> Option<OutboundEvent> {
        match self {
            EngineOutput::Forecast(record) => Some(OutboundEvent::Forecast(record)),
            EngineOutput::Alert(record) => Some(OutboundEvent::Alert(record)),
            EngineOutput::NotEnoughData { .. } => None,
        }
    }
}

pub struct Engine {
    config: EngineConfig,
    forecaster: TrendForecaster,
    checkpoint: Option<Arc<dyn WindowCheckpoint>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let forecaster = TrendForecaster::from_config(&config);
        Ok(Self {
            config,
            forecaster,
            checkpoint: None,
        })
    }

    /// Checkpoints every window before it is trimmed, and rehydrates
    /// windows from the store in [`Engine::restore`].
    pub fn with_checkpoint(mut self, checkpoint: Arc<dyn WindowCheckpoint>) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Empty windows and idle alert states for every monitored parameter.
    pub fn new_context(&self, device_id: &str, display_name: Option<&str>) -> DeviceStreamContext {
        let cooldown = Duration::seconds(self.config.cooldown_secs as i64);
        let parameters = self
            .config
            .monitored_parameters()
            .into_iter()
            .map(|param| ParameterState {
                window: SampleWindow::new(self.config.window),
                evaluator: ThresholdEvaluator::new(param.threshold, self.config.run_length),
                machine: AlertStateMachine::new(
                    param.name.clone(),
                    cooldown,
                    self.config.dedup_cache_size,
                ),
                forecast: param.forecast,
                name: param.name,
            })
            .collect();

        DeviceStreamContext {
            device_id: device_id.to_string(),
            lineage: StreamLineage::new(device_id, display_name),
            parameters,
        }
    }

    /// Refills the windows of `context` from the checkpoint store, if any.
    pub fn restore(&self, context: &mut DeviceStreamContext) {
        let Some(checkpoint) = &self.checkpoint else {
            return;
        };
        let mut snapshot = match checkpoint.load(&context.device_id) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(device_id = %context.device_id, error = %e, "Failed to load window checkpoint");
                return;
            }
        };
        for param in &mut context.parameters {
            if let Some(samples) = snapshot.remove(&param.name) {
                let count = samples.len();
                param.window.restore(samples);
                tracing::info!(
                    device_id = %context.device_id,
                    parameter = %param.name,
                    count,
                    "Window restored from checkpoint"
                );
            }
        }
    }

    /// Drops the stored checkpoint of a device, if any.
    pub fn discard_checkpoint(&self, device_id: &str) {
        if let Some(checkpoint) = &self.checkpoint {
            if let Err(e) = checkpoint.remove(device_id) {
                tracing::warn!(device_id, error = %e, "Failed to remove window checkpoint");
            }
        }
    }

    /// Appends every record of a transport batch, then evaluates each
    /// parameter that received samples once, on its newest sample.
    ///
    /// Records without a field for a parameter are ignored for it. Invalid
    /// samples are logged and dropped.
    pub fn process_batch(
        &self,
        context: &mut DeviceStreamContext,
        records: &[SampleRecord],
    ) -> Vec<EngineOutput> {
        let started = Instant::now();
        let DeviceStreamContext {
            device_id,
            parameters,
            ..
        } = context;
        let device_id = device_id.as_str();

        let mut outputs = Vec::new();
        for param in parameters.iter_mut() {
            let mut newest = None;
            for record in records {
                let Some(value) = record.fields.get(&param.name) else {
                    continue;
                };
                let sample = Sample::new(device_id, &param.name, record.timestamp, *value);
                match self.admit(device_id, param, sample) {
                    Ok(sample) => newest = Some(sample),
                    Err(e) => {
                        tracing::warn!(device_id = %device_id, parameter = %param.name, error = %e, "Sample dropped");
                    }
                }
            }
            if let Some(sample) = newest {
                outputs.extend(self.evaluate(device_id, param, &sample));
            }
        }

        self.check_elapsed(device_id, started);
        outputs
    }

    /// Appends and evaluates a single sample. Samples of parameters that
    /// are not monitored produce nothing.
    pub fn process_sample(
        &self,
        context: &mut DeviceStreamContext,
        sample: &Sample,
    ) -> Result<Vec<EngineOutput>> {
        let started = Instant::now();
        let DeviceStreamContext {
            device_id,
            parameters,
            ..
        } = context;
        let device_id = device_id.as_str();

        let Some(param) = parameters.iter_mut().find(|p| p.name == sample.parameter) else {
            return Ok(Vec::new());
        };
        let sample = self.admit(device_id, param, sample.clone())?;
        let outputs = self.evaluate(device_id, param, &sample);

        self.check_elapsed(device_id, started);
        Ok(outputs)
    }

    /// Validates a sample and appends it to the parameter window.
    fn admit(&self, device_id: &str, param: &mut ParameterState, sample: Sample) -> Result<Sample> {
        if !sample.value.is_finite() {
            return Err(EngineError::InvalidSample(format!(
                "non-finite value {} at {}",
                sample.value, sample.timestamp
            )));
        }
        if let Some(newest) = param.window.newest_timestamp() {
            let tolerance = Duration::milliseconds(self.config.reorder_tolerance_ms as i64);
            if sample.timestamp < newest - tolerance {
                return Err(EngineError::InvalidSample(format!(
                    "timestamp {} is more than {}ms behind {}",
                    sample.timestamp, self.config.reorder_tolerance_ms, newest
                )));
            }
        }

        let checkpoint = self.checkpoint.as_deref();
        let name = &param.name;
        param.window.append_with(sample.clone(), |raw| {
            if let Some(checkpoint) = checkpoint {
                if let Err(e) = checkpoint.save(device_id, name, raw) {
                    tracing::warn!(device_id, parameter = %name, error = %e, "Failed to save window checkpoint");
                }
            }
        });
        Ok(sample)
    }

    fn evaluate(&self, device_id: &str, param: &mut ParameterState, latest: &Sample) -> Vec<EngineOutput> {
        self.check_freshness(device_id, latest);
        let threshold = param.evaluator.threshold();

        if !param.forecast {
            let band = param.evaluator.classify_instant(latest.value);
            let message = now_message(&param.name, band, latest.value, threshold.low, threshold.high);
            return feed(param, band.now_status(), latest, message)
                .into_iter()
                .map(EngineOutput::Alert)
                .collect();
        }

        let have = param.window.len();
        let need = self.config.min_window;
        if have < need {
            let err = EngineError::InsufficientData { have, need };
            tracing::info!(device_id, parameter = %param.name, "{err}");
            return vec![EngineOutput::NotEnoughData {
                parameter: param.name.clone(),
                have,
                need,
            }];
        }

        let band = param.evaluator.classify_instant(latest.value);
        if band != Band::Within {
            let message = now_message(&param.name, band, latest.value, threshold.low, threshold.high);
            return feed(param, band.now_status(), latest, message)
                .into_iter()
                .map(EngineOutput::Alert)
                .collect();
        }

        let points = match self.forecaster.forecast(&param.window.snapshot()) {
            Ok(points) => points,
            Err(e) => {
                let err = EngineError::from(e);
                tracing::warn!(device_id, parameter = %param.name, error = %err, "Skipping forecast for this sample");
                return vec![EngineOutput::NotEnoughData {
                    parameter: param.name.clone(),
                    have,
                    need,
                }];
            }
        };

        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let found = param.evaluator.classify_sequence(&values);
        let status = found.band.forecast_status();
        let message = match found.index {
            Some(index) => {
                let ahead = self.forecaster.step() * (index as i32 + 1);
                let bound = if found.band == Band::Under {
                    format!("below {}", threshold.low)
                } else {
                    format!("above {}", threshold.high)
                };
                format!(
                    "{} forecast to go {bound} in {}s",
                    param.name,
                    ahead.num_seconds()
                )
            }
            None => format!(
                "{} forecast within {}..{}",
                param.name, threshold.low, threshold.high
            ),
        };

        let mut outputs = vec![EngineOutput::Forecast(ForecastRecord {
            parameter: param.name.clone(),
            generated_from: latest.timestamp,
            points,
        })];
        if let Some(alert) = feed(param, status, latest, message) {
            tracing::info!(device_id, parameter = %param.name, status = %alert.status, "Alert state changed");
            outputs.push(EngineOutput::Alert(alert));
        }
        outputs
    }

    fn check_freshness(&self, device_id: &str, latest: &Sample) {
        let age = Utc::now() - latest.timestamp;
        if age > Duration::seconds(self.config.stale_after_secs as i64) {
            tracing::warn!(
                device_id,
                parameter = %latest.parameter,
                age_secs = age.num_seconds(),
                "Newest sample is stale"
            );
        }
    }

    fn check_elapsed(&self, device_id: &str, started: Instant) {
        let elapsed = started.elapsed();
        if elapsed.as_millis() > u128::from(self.config.slow_sample_warn_ms) {
            tracing::warn!(
                device_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow sample processing"
            );
        }
    }
}

fn feed(
    param: &mut ParameterState,
    status: AlertStatus,
    latest: &Sample,
    message: String,
) -> Option<AlertRecord> {
    param
        .machine
        .update(status, latest.value, latest.timestamp, message)
}

fn now_message(parameter: &str, band: Band, value: f64, low: f64, high: f64) -> String {
    match band {
        Band::Under => format!("{parameter} is {value:.2}, at or below {low}"),
        Band::Over => format!("{parameter} is {value:.2}, at or above {high}"),
        Band::Within => format!("{parameter} back within {low}..{high}"),
    }
}
