//! Runs the forecast and alert engine over a JSON-lines device feed.
//!
//! The transport reader parses [`TransportEvent`]s, the [`worker::StreamRouter`]
//! hands each device its own task, and engine output is fanned out to the
//! configured publishers through a [`SinkDispatcher`].

pub mod config;
pub mod logging;
pub mod transport;
pub mod worker;

use anyhow::Result;
use config::ServerConfig;
use printwatch_alert::{Engine, StreamLifecycleManager};
use printwatch_common::types::TransportEvent;
use printwatch_notify::dispatcher::{DispatchStats, RetryPolicy, SinkDispatcher};
use printwatch_notify::publishers::{StdoutPublisher, WebhookPublisher};
use printwatch_notify::Publisher;
use printwatch_storage::checkpoint::SqliteCheckpoint;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufRead;
use tokio::sync::mpsc;
use worker::StreamRouter;

/// Builds the engine, with a checkpoint store when `checkpoint_dir` is set,
/// and wraps it in a lifecycle manager.
pub fn build_manager(config: &ServerConfig) -> Result<Arc<StreamLifecycleManager>> {
    let mut engine = Engine::new(config.engine.clone())?;
    if let Some(dir) = &config.checkpoint_dir {
        let store = SqliteCheckpoint::open(Path::new(dir))?;
        tracing::info!(dir = %dir, "Window checkpoints enabled");
        engine = engine.with_checkpoint(Arc::new(store));
    }
    Ok(Arc::new(StreamLifecycleManager::new(Arc::new(engine))))
}

/// Publishers named by the `sinks` section.
pub fn build_publishers(config: &ServerConfig) -> Result<Vec<Arc<dyn Publisher>>> {
    let mut publishers: Vec<Arc<dyn Publisher>> = Vec::new();
    if config.sinks.stdout {
        publishers.push(Arc::new(StdoutPublisher::new()));
    }
    if let Some(url) = &config.sinks.webhook_url {
        let timeout = Duration::from_secs(config.sinks.webhook_timeout_secs);
        publishers.push(Arc::new(WebhookPublisher::new(url, timeout)?));
        tracing::info!(url = %url, "Webhook sink enabled");
    }
    if publishers.is_empty() {
        tracing::warn!("No sinks configured, engine output is discarded");
    }
    Ok(publishers)
}

/// Processes `input` until it ends or `shutdown` resolves, then closes every
/// open stream and waits for the sinks to drain.
pub async fn run<R, S>(
    config: &ServerConfig,
    input: R,
    publishers: Vec<Arc<dyn Publisher>>,
    shutdown: S,
) -> Result<DispatchStats>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    S: Future<Output = ()>,
{
    let manager = build_manager(config)?;
    let retry = RetryPolicy {
        max_attempts: config.sinks.max_attempts,
        base_delay: Duration::from_millis(config.sinks.retry_base_ms),
    };
    let (dispatcher, dispatch_task) = SinkDispatcher::spawn(publishers, retry);
    let mut router = StreamRouter::new(manager, dispatcher.clone(), config.channel_capacity);

    let (tx, mut rx) = mpsc::channel::<TransportEvent>(config.channel_capacity.max(1));
    let reader = tokio::spawn(transport::read_events(input, tx));

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => router.route(event).await,
                None => break,
            },
            _ = &mut shutdown => {
                tracing::info!("Shutting down gracefully");
                break;
            }
        }
    }

    reader.abort();
    match reader.await {
        Ok(Err(e)) => tracing::error!(error = %e, "Transport reader failed"),
        Err(e) if e.is_panic() => tracing::error!(error = %e, "Transport reader panicked"),
        _ => {}
    }

    router.shutdown().await;
    drop(dispatcher);
    let stats = dispatch_task.await?;
    tracing::info!(
        delivered = stats.delivered,
        failed = stats.failed,
        "Engine stopped"
    );
    Ok(stats)
}
