use crate::config::LogFormat;
use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Logs go to stderr so stdout stays free
/// for the JSON-lines event output.
///
/// `RUST_LOG` refines the filter; `printwatch` crates log at info by default.
pub fn init(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("printwatch=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}
