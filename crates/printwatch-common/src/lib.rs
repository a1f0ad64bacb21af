//! Types shared by the printwatch crates: samples coming in from the
//! transport, forecast and alert records going out to the sinks.

pub mod types;
