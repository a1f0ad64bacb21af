use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// A single reading of one parameter from one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub device_id: String,
    pub parameter: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(device_id: &str, parameter: &str, timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            device_id: device_id.to_string(),
            parameter: parameter.to_string(),
            timestamp,
            value,
        }
    }
}

/// One row of a transport batch: a timestamp and every field reported at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub fields: HashMap<String, f64>,
}

/// Alert status, serialized with the event ids used on the alerts stream.
///
/// # Examples
///
/// ```
/// use printwatch_common::types::AlertStatus;
///
/// let status: AlertStatus = "under-forecast".parse().unwrap();
/// assert_eq!(status, AlertStatus::UnderForecast);
/// assert_eq!(status.to_string(), "under-forecast");
/// assert!(status.is_alert());
/// assert!(!AlertStatus::NoAlert.is_alert());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertStatus {
    NoAlert,
    UnderNow,
    OverNow,
    UnderForecast,
    OverForecast,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::NoAlert => "no-alert",
            AlertStatus::UnderNow => "under-now",
            AlertStatus::OverNow => "over-now",
            AlertStatus::UnderForecast => "under-forecast",
            AlertStatus::OverForecast => "over-forecast",
        }
    }

    pub fn is_alert(self) -> bool {
        self != AlertStatus::NoAlert
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "no-alert" | "noalert" => Ok(AlertStatus::NoAlert),
            "under-now" => Ok(AlertStatus::UnderNow),
            "over-now" => Ok(AlertStatus::OverNow),
            "under-forecast" => Ok(AlertStatus::UnderForecast),
            "over-forecast" => Ok(AlertStatus::OverForecast),
            _ => Err(format!("unknown alert status: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub status: AlertStatus,
    pub parameter: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl AlertRecord {
    /// SHA-256 over the canonical fields. The message is left out and the
    /// value is rounded to two decimals, so a replayed reading hashes the same.
    pub fn content_hash(&self) -> String {
        let canonical = format!(
            "{}|{}|{:.2}|{}",
            self.status,
            self.parameter,
            self.value,
            self.timestamp.timestamp_nanos_opt().unwrap_or_default(),
        );
        format!("{:x}", Sha256::digest(canonical.as_bytes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub parameter: String,
    /// Timestamp of the newest sample the forecast was fitted on.
    pub generated_from: DateTime<Utc>,
    pub points: Vec<ForecastPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedRecord {
    pub device_id: String,
    pub display_name: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Output stream identities derived from an input device stream.
///
/// # Examples
///
/// ```
/// use printwatch_common::types::StreamLineage;
///
/// let lineage = StreamLineage::new("s-17", Some("Printer 3"));
/// assert_eq!(lineage.forecast_stream_id, "s-17-forecast");
/// assert_eq!(lineage.alerts_stream_id, "s-17-alerts");
/// assert_eq!(lineage.forecast_stream_name(), "Printer 3 - Forecast");
/// assert_eq!(lineage.parents, vec!["s-17".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamLineage {
    pub device_id: String,
    pub display_name: String,
    pub forecast_stream_id: String,
    pub alerts_stream_id: String,
    pub parents: Vec<String>,
}

impl StreamLineage {
    pub fn new(device_id: &str, display_name: Option<&str>) -> Self {
        Self {
            device_id: device_id.to_string(),
            display_name: display_name.unwrap_or(device_id).to_string(),
            forecast_stream_id: format!("{device_id}-forecast"),
            alerts_stream_id: format!("{device_id}-alerts"),
            parents: vec![device_id.to_string()],
        }
    }

    pub fn forecast_stream_name(&self) -> String {
        format!("{} - Forecast", self.display_name)
    }

    pub fn alerts_stream_name(&self) -> String {
        format!("{} - Alerts", self.display_name)
    }
}

/// Everything the engine hands to the sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundEvent {
    Forecast(ForecastRecord),
    Alert(AlertRecord),
    Finished(FinishedRecord),
}

impl OutboundEvent {
    /// Stream the event belongs on: forecasts go to the forecast stream,
    /// alerts and lifecycle events to the alerts stream.
    pub fn stream_id<'a>(&self, lineage: &'a StreamLineage) -> &'a str {
        match self {
            OutboundEvent::Forecast(_) => &lineage.forecast_stream_id,
            OutboundEvent::Alert(_) | OutboundEvent::Finished(_) => &lineage.alerts_stream_id,
        }
    }
}

/// A line of the JSON-lines transport feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    StreamOpen {
        device_id: String,
        #[serde(default)]
        display_name: Option<String>,
    },
    Samples {
        device_id: String,
        records: Vec<SampleRecord>,
    },
    StreamClose {
        device_id: String,
    },
}

impl TransportEvent {
    pub fn device_id(&self) -> &str {
        match self {
            TransportEvent::StreamOpen { device_id, .. }
            | TransportEvent::Samples { device_id, .. }
            | TransportEvent::StreamClose { device_id } => device_id,
        }
    }
}
