use super::StreamEnvelope;
use crate::error::Result;
use crate::Publisher;
use async_trait::async_trait;
use printwatch_common::types::{OutboundEvent, StreamLineage};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Writes one JSON object per event, newline terminated.
pub struct StdoutPublisher {
    out: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl StdoutPublisher {
    pub fn new() -> Self {
        Self::with_writer(Box::new(tokio::io::stdout()))
    }

    pub fn with_writer(out: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn render_line(lineage: &StreamLineage, event: &OutboundEvent) -> Result<String> {
        let mut line = serde_json::to_string(&StreamEnvelope::new(lineage, event))?;
        line.push('\n');
        Ok(line)
    }
}

impl Default for StdoutPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for StdoutPublisher {
    async fn publish(&self, lineage: &StreamLineage, event: &OutboundEvent) -> Result<()> {
        let line = Self::render_line(lineage, event)?;
        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "stdout"
    }
}
