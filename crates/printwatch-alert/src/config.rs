use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inclusive alert band: values at or below `low`, or at or above `high`,
/// are out of range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub low: f64,
    pub high: f64,
}

impl Threshold {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    fn validate(&self, parameter: &str) -> Result<()> {
        if !self.low.is_finite() || !self.high.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "threshold for '{parameter}' must be finite"
            )));
        }
        if self.low >= self.high {
            return Err(EngineError::InvalidConfig(format!(
                "threshold for '{parameter}' has low {} >= high {}",
                self.low, self.high
            )));
        }
        Ok(())
    }
}

/// How a sample window is bounded. Exactly one policy applies per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WindowPolicy {
    /// Keep the newest `max_count` samples.
    Count { max_count: usize },
    /// Keep samples no older than `max_age_secs` before the newest one.
    Duration { max_age_secs: u64 },
}

impl Default for WindowPolicy {
    fn default() -> Self {
        WindowPolicy::Count {
            max_count: default_min_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Parameter that is forecast.
    #[serde(default = "default_parameter_name")]
    pub parameter_name: String,
    /// Parameters that only get the current-value check.
    #[serde(default = "default_instant_parameters")]
    pub instant_parameters: Vec<String>,
    #[serde(default = "default_thresholds")]
    pub thresholds: BTreeMap<String, Threshold>,
    #[serde(default)]
    pub window: WindowPolicy,
    /// Samples required in the window before a forecast is attempted.
    #[serde(default = "default_min_window")]
    pub min_window: usize,
    /// Number of forecast points (the horizon).
    #[serde(default = "default_forecast_length")]
    pub forecast_length: usize,
    #[serde(default = "default_forecast_step_ms")]
    pub forecast_step_ms: u64,
    /// Consecutive forecast points that must be out of band to raise a forecast alert.
    #[serde(default = "default_run_length")]
    pub run_length: usize,
    /// Minimum seconds an alert stays active before the same status may re-emit.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_dedup_cache_size")]
    pub dedup_cache_size: usize,
    /// Trailing moving-average span applied before fitting; 0 disables smoothing.
    #[serde(default = "default_smoothing_span_secs")]
    pub smoothing_span_secs: u64,
    #[serde(default = "default_reorder_tolerance_ms")]
    pub reorder_tolerance_ms: u64,
    /// Warn when the newest sample is older than this (wall clock).
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_slow_sample_warn_ms")]
    pub slow_sample_warn_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parameter_name: default_parameter_name(),
            instant_parameters: default_instant_parameters(),
            thresholds: default_thresholds(),
            window: WindowPolicy::default(),
            min_window: default_min_window(),
            forecast_length: default_forecast_length(),
            forecast_step_ms: default_forecast_step_ms(),
            run_length: default_run_length(),
            cooldown_secs: default_cooldown_secs(),
            dedup_cache_size: default_dedup_cache_size(),
            smoothing_span_secs: default_smoothing_span_secs(),
            reorder_tolerance_ms: default_reorder_tolerance_ms(),
            stale_after_secs: default_stale_after_secs(),
            slow_sample_warn_ms: default_slow_sample_warn_ms(),
        }
    }
}

fn default_parameter_name() -> String {
    "fluctuated_ambient_temperature".to_string()
}

fn default_instant_parameters() -> Vec<String> {
    vec![
        "bed_temperature".to_string(),
        "hotend_temperature".to_string(),
    ]
}

fn default_thresholds() -> BTreeMap<String, Threshold> {
    BTreeMap::from([
        ("ambient_temperature".to_string(), Threshold::new(45.0, 55.0)),
        (
            "fluctuated_ambient_temperature".to_string(),
            Threshold::new(45.0, 55.0),
        ),
        ("bed_temperature".to_string(), Threshold::new(105.0, 115.0)),
        ("hotend_temperature".to_string(), Threshold::new(245.0, 255.0)),
    ])
}

fn default_min_window() -> usize {
    60
}

fn default_forecast_length() -> usize {
    60
}

fn default_forecast_step_ms() -> u64 {
    1000
}

fn default_run_length() -> usize {
    3
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_dedup_cache_size() -> usize {
    256
}

fn default_smoothing_span_secs() -> u64 {
    36
}

fn default_reorder_tolerance_ms() -> u64 {
    5000
}

fn default_stale_after_secs() -> u64 {
    60
}

fn default_slow_sample_warn_ms() -> u64 {
    500
}

/// A monitored parameter with its band and whether it is forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredParameter {
    pub name: String,
    pub threshold: Threshold,
    pub forecast: bool,
}

impl EngineConfig {
    /// Forecast parameter first, then the instant-only parameters, in
    /// configuration order. Parameters without a threshold are skipped;
    /// [`EngineConfig::validate`] rejects that case.
    pub fn monitored_parameters(&self) -> Vec<MonitoredParameter> {
        let forecast = std::iter::once((&self.parameter_name, true));
        let instant = self
            .instant_parameters
            .iter()
            .filter(|name| **name != self.parameter_name)
            .map(|name| (name, false));

        forecast
            .chain(instant)
            .filter_map(|(name, forecast)| {
                self.thresholds.get(name).map(|threshold| MonitoredParameter {
                    name: name.clone(),
                    threshold: *threshold,
                    forecast,
                })
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.parameter_name.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "parameter_name must not be empty".to_string(),
            ));
        }

        let names = std::iter::once(&self.parameter_name).chain(self.instant_parameters.iter());
        for name in names {
            let threshold = self.thresholds.get(name).ok_or_else(|| {
                EngineError::InvalidConfig(format!("no threshold configured for '{name}'"))
            })?;
            threshold.validate(name)?;
        }

        if self.min_window < 3 {
            return Err(EngineError::InvalidConfig(format!(
                "min_window must be at least 3 for a quadratic fit, got {}",
                self.min_window
            )));
        }
        match self.window {
            WindowPolicy::Count { max_count } if max_count < self.min_window => {
                return Err(EngineError::InvalidConfig(format!(
                    "window max_count {max_count} is smaller than min_window {}",
                    self.min_window
                )));
            }
            WindowPolicy::Duration { max_age_secs: 0 } => {
                return Err(EngineError::InvalidConfig(
                    "window max_age_secs must be positive".to_string(),
                ));
            }
            _ => {}
        }
        if self.forecast_length == 0 {
            return Err(EngineError::InvalidConfig(
                "forecast_length must be positive".to_string(),
            ));
        }
        if self.forecast_step_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "forecast_step_ms must be positive".to_string(),
            ));
        }
        if self.run_length == 0 {
            return Err(EngineError::InvalidConfig(
                "run_length must be at least 1".to_string(),
            ));
        }
        if self.dedup_cache_size == 0 {
            return Err(EngineError::InvalidConfig(
                "dedup_cache_size must be at least 1".to_string(),
            ));
        }
        if self.forecast_length > MAX_FORECAST_LENGTH {
            return Err(EngineError::InvalidConfig(format!(
                "forecast_length must be at most {MAX_FORECAST_LENGTH}, got {}",
                self.forecast_length
            )));
        }

        let mut spans = vec![
            ("cooldown_secs", self.cooldown_secs),
            ("smoothing_span_secs", self.smoothing_span_secs),
            ("stale_after_secs", self.stale_after_secs),
        ];
        if let WindowPolicy::Duration { max_age_secs } = self.window {
            spans.push(("window max_age_secs", max_age_secs));
        }
        for (name, secs) in spans {
            check_span(name, secs, MAX_SPAN_SECS)?;
        }
        check_span("reorder_tolerance_ms", self.reorder_tolerance_ms, MAX_SPAN_MS)?;
        check_span("slow_sample_warn_ms", self.slow_sample_warn_ms, MAX_SPAN_MS)?;
        check_span("forecast_step_ms", self.forecast_step_ms, MAX_SPAN_MS)?;

        // the last forecast point must also stay within the span limit
        let horizon_ms = self.forecast_step_ms.saturating_mul(self.forecast_length as u64);
        if horizon_ms > MAX_SPAN_MS {
            return Err(EngineError::InvalidConfig(format!(
                "forecast_length * forecast_step_ms must be at most {MAX_SPAN_MS}ms, got {horizon_ms}ms"
            )));
        }
        Ok(())
    }
}

/// Upper bound for every configured time span: ten years.
pub const MAX_SPAN_SECS: u64 = 10 * 365 * 24 * 60 * 60;
const MAX_SPAN_MS: u64 = MAX_SPAN_SECS * 1000;
pub const MAX_FORECAST_LENGTH: usize = 100_000;

fn check_span(name: &str, value: u64, max: u64) -> Result<()> {
    if value > max {
        return Err(EngineError::InvalidConfig(format!(
            "{name} must be at most {max}, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.run_length, 3);
        assert_eq!(config.cooldown_secs, 60);
    }

    #[test]
    fn monitored_parameters_put_forecast_parameter_first() {
        let config = EngineConfig::default();
        let params = config.monitored_parameters();
        assert_eq!(params.len(), 3);
        assert_eq!(params[0].name, "fluctuated_ambient_temperature");
        assert!(params[0].forecast);
        assert!(params[1..].iter().all(|p| !p.forecast));
    }

    #[test]
    fn forecast_parameter_listed_as_instant_is_not_duplicated() {
        let config = EngineConfig {
            instant_parameters: vec!["fluctuated_ambient_temperature".to_string()],
            ..EngineConfig::default()
        };
        assert_eq!(config.monitored_parameters().len(), 1);
    }

    #[test]
    fn rejects_missing_threshold() {
        let config = EngineConfig {
            parameter_name: "chamber_humidity".to_string(),
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chamber_humidity"));
    }

    #[test]
    fn rejects_inverted_band() {
        let mut config = EngineConfig::default();
        config
            .thresholds
            .insert("bed_temperature".to_string(), Threshold::new(115.0, 105.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_count_window_smaller_than_minimum() {
        let config = EngineConfig {
            window: WindowPolicy::Count { max_count: 10 },
            min_window: 20,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_run_length() {
        let config = EngineConfig {
            run_length: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_spans_chrono_cannot_represent() {
        let huge = 10_000_000_000_000_000;
        let configs = [
            EngineConfig {
                cooldown_secs: huge,
                ..EngineConfig::default()
            },
            EngineConfig {
                stale_after_secs: huge,
                ..EngineConfig::default()
            },
            EngineConfig {
                smoothing_span_secs: huge,
                ..EngineConfig::default()
            },
            EngineConfig {
                reorder_tolerance_ms: u64::MAX,
                ..EngineConfig::default()
            },
            EngineConfig {
                forecast_step_ms: u64::MAX,
                ..EngineConfig::default()
            },
            EngineConfig {
                window: WindowPolicy::Duration { max_age_secs: huge },
                ..EngineConfig::default()
            },
        ];
        for config in configs {
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("must be at most"), "{err}");
        }
    }

    #[test]
    fn rejects_forecast_horizon_past_span_limit() {
        let config = EngineConfig {
            forecast_length: MAX_FORECAST_LENGTH,
            forecast_step_ms: MAX_SPAN_SECS * 1000,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            forecast_length: MAX_FORECAST_LENGTH + 1,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_spans_at_the_limit() {
        let config = EngineConfig {
            cooldown_secs: MAX_SPAN_SECS,
            stale_after_secs: MAX_SPAN_SECS,
            window: WindowPolicy::Duration {
                max_age_secs: MAX_SPAN_SECS,
            },
            ..EngineConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn window_policy_deserializes_tagged() {
        let policy: WindowPolicy =
            serde_json::from_str(r#"{"type":"duration","max_age_secs":300}"#).unwrap();
        assert_eq!(policy, WindowPolicy::Duration { max_age_secs: 300 });
    }
}
