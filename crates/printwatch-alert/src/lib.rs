//! Windowed forecast and alert engine for device telemetry.
//!
//! Every open device stream owns a [`lifecycle::DeviceStreamContext`]: one
//! bounded [`window::SampleWindow`] and one [`state::AlertStateMachine`] per
//! monitored parameter. Incoming samples are appended to their window, the
//! latest value is checked against the parameter's threshold band and, when
//! it is still in range, a quadratic trend fitted by
//! [`forecast::TrendForecaster`] is checked for a sustained excursion.
//! The state machine turns those classifications into edge-triggered alert
//! records with cooldown and replay suppression.

pub mod config;
pub mod engine;
pub mod error;
pub mod forecast;
pub mod lifecycle;
pub mod state;
pub mod threshold;
pub mod window;


pub use config::{EngineConfig, Threshold, WindowPolicy};
pub use engine::{Engine, EngineOutput};
pub use error::{EngineError, ForecastError};
pub use lifecycle::{DeviceStreamContext, StreamLifecycleManager};
