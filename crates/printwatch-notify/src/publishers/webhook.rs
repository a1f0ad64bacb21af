use super::StreamEnvelope;
use crate::error::{Result, SinkError};
use crate::Publisher;
use async_trait::async_trait;
use printwatch_common::types::{OutboundEvent, StreamLineage};
use std::time::Duration;

const MAX_BODY_LENGTH: usize = 512;

/// POSTs each event as JSON to a fixed URL. Retries are left to the
/// dispatcher; a non-2xx answer is reported as [`SinkError::Rejected`].
pub struct WebhookPublisher {
    url: String,
    client: reqwest::Client,
}

impl WebhookPublisher {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Publisher for WebhookPublisher {
    async fn publish(&self, lineage: &StreamLineage, event: &OutboundEvent) -> Result<()> {
        let body = serde_json::to_string(&StreamEnvelope::new(lineage, event))?;
        let resp = self
            .client
            .post(self.url.as_str())
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = match resp.text().await {
            Ok(text) => truncate(&text, MAX_BODY_LENGTH),
            Err(e) => format!("[failed to read response body: {e}]"),
        };
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
