use anyhow::{anyhow, Result};
use printwatch_alert::{EngineConfig, Threshold, WindowPolicy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Prefix of every environment override, e.g. `PRINTWATCH_RUN_LENGTH=4`.
pub const ENV_PREFIX: &str = "PRINTWATCH_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub sinks: SinksConfig,
    /// Directory of the window checkpoint database; unset disables checkpoints.
    #[serde(default)]
    pub checkpoint_dir: Option<String>,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Queued transport batches per device before the reader waits.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            transport: TransportConfig::default(),
            sinks: SinksConfig::default(),
            checkpoint_dir: None,
            log_format: LogFormat::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportConfig {
    /// JSON-lines file to read; unset or `-` reads stdin.
    #[serde(default)]
    pub input: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinksConfig {
    #[serde(default = "default_stdout")]
    pub stdout: bool,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

impl Default for SinksConfig {
    fn default() -> Self {
        Self {
            stdout: default_stdout(),
            webhook_url: None,
            webhook_timeout_secs: default_webhook_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

fn default_channel_capacity() -> usize {
    64
}

fn default_stdout() -> bool {
    true
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    100
}

impl ServerConfig {
    /// Reads the TOML file at `path`, then applies `PRINTWATCH_*` overrides
    /// from the process environment.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file '{path}': {e}"))?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file '{path}': {e}"))?;
        config.apply_env(std::env::vars())?;
        Ok(config)
    }

    /// Applies overrides from `(name, value)` pairs. Names without the
    /// `PRINTWATCH_` prefix are ignored; unknown prefixed names are logged.
    ///
    /// Thresholds use `PRINTWATCH_THRESHOLD_<PARAMETER>=low,high`, the window
    /// `PRINTWATCH_WINDOW=count:60` or `PRINTWATCH_WINDOW=duration:300`.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let key = key.to_ascii_lowercase();
            let value = value.trim();
            let engine = &mut self.engine;

            match key.as_str() {
                "parameter_name" => engine.parameter_name = value.to_string(),
                "instant_parameters" => {
                    engine.instant_parameters = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "window" => engine.window = parse_window(&name, value)?,
                "min_window" => engine.min_window = parse_var(&name, value)?,
                "forecast_length" => engine.forecast_length = parse_var(&name, value)?,
                "forecast_step_ms" => engine.forecast_step_ms = parse_var(&name, value)?,
                "run_length" => engine.run_length = parse_var(&name, value)?,
                "cooldown_secs" => engine.cooldown_secs = parse_var(&name, value)?,
                "dedup_cache_size" => engine.dedup_cache_size = parse_var(&name, value)?,
                "smoothing_span_secs" => engine.smoothing_span_secs = parse_var(&name, value)?,
                "reorder_tolerance_ms" => engine.reorder_tolerance_ms = parse_var(&name, value)?,
                "stale_after_secs" => engine.stale_after_secs = parse_var(&name, value)?,
                "slow_sample_warn_ms" => engine.slow_sample_warn_ms = parse_var(&name, value)?,
                "input" => self.transport.input = non_empty(value),
                "checkpoint_dir" => self.checkpoint_dir = non_empty(value),
                "webhook_url" => self.sinks.webhook_url = non_empty(value),
                "stdout" => self.sinks.stdout = parse_var(&name, value)?,
                "max_attempts" => self.sinks.max_attempts = parse_var(&name, value)?,
                "log_format" => self.log_format = value.parse()?,
                "channel_capacity" => self.channel_capacity = parse_var(&name, value)?,
                other => match other.strip_prefix("threshold_") {
                    Some(parameter) if !parameter.is_empty() => {
                        let threshold = parse_threshold(&name, value)?;
                        engine.thresholds.insert(parameter.to_string(), threshold);
                    }
                    _ => tracing::warn!(var = %name, "Unknown configuration override ignored"),
                },
            }
        }
        Ok(())
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| anyhow!("Invalid {name}: {e}"))
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_threshold(name: &str, value: &str) -> Result<Threshold> {
    let (low, high) = value
        .split_once(',')
        .ok_or_else(|| anyhow!("Invalid {name}: expected 'low,high', got '{value}'"))?;
    Ok(Threshold::new(
        parse_var(name, low.trim())?,
        parse_var(name, high.trim())?,
    ))
}

fn parse_window(name: &str, value: &str) -> Result<WindowPolicy> {
    let (kind, amount) = value
        .split_once(':')
        .ok_or_else(|| anyhow!("Invalid {name}: expected 'count:N' or 'duration:SECS'"))?;
    match kind.trim().to_ascii_lowercase().as_str() {
        "count" => Ok(WindowPolicy::Count {
            max_count: parse_var(name, amount.trim())?,
        }),
        "duration" => Ok(WindowPolicy::Duration {
            max_age_secs: parse_var(name, amount.trim())?,
        }),
        other => Err(anyhow!("Invalid {name}: unknown window type '{other}'")),
    }
}
