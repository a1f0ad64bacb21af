//! Crash-recovery checkpoints for per-device sample windows.
//!
//! The engine writes the untrimmed window of a device before each trim and
//! reads it back when the device stream is reopened. Checkpointing is
//! best-effort: callers log failures and carry on ingesting.

pub mod checkpoint;
pub mod error;


use error::Result;
use printwatch_common::types::Sample;
use std::collections::BTreeMap;

/// Window contents of one device, keyed by parameter name.
pub type WindowSnapshot = BTreeMap<String, Vec<Sample>>;

/// Key-value store for window snapshots.
///
/// Implementations must be `Send + Sync`: device workers save concurrently.
pub trait WindowCheckpoint: Send + Sync {
    /// Stores the window of one parameter of a device, replacing any
    /// previous snapshot of that parameter.
    fn save(&self, device_id: &str, parameter: &str, samples: &[Sample]) -> Result<()>;

    /// Loads every parameter snapshot stored for a device.
    fn load(&self, device_id: &str) -> Result<WindowSnapshot>;

    /// Drops every snapshot of a device. Returns the number of rows removed.
    fn remove(&self, device_id: &str) -> Result<usize>;
}
