use anyhow::Result;
use printwatch_server::config::ServerConfig;
use printwatch_server::{build_publishers, logging, run};
use tokio::io::BufReader;
use tokio::signal;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  printwatch-server [config.toml]    Run the engine (default config/printwatch.toml)");
    eprintln!();
    eprintln!("Every setting can be overridden with a PRINTWATCH_<KEY> environment variable.");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if matches!(args.get(1).map(String::as_str), Some("--help" | "-h")) {
        print_usage();
        return Ok(());
    }

    let config_path = args
        .get(1)
        .map(|s| s.as_str())
        .unwrap_or("config/printwatch.toml");
    let config = ServerConfig::load(config_path)?;
    logging::init(config.log_format)?;

    tracing::info!(
        config = config_path,
        parameter = %config.engine.parameter_name,
        "Starting printwatch"
    );

    let publishers = build_publishers(&config)?;
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    match config.transport.input.as_deref() {
        None | Some("-") => {
            let input = BufReader::new(tokio::io::stdin());
            run(&config, input, publishers, shutdown).await?;
            // tokio's blocking stdin read would otherwise hold the runtime open
            std::process::exit(0);
        }
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to open transport input '{path}': {e}"))?;
            run(&config, BufReader::new(file), publishers, shutdown).await?;
        }
    }

    Ok(())
}
