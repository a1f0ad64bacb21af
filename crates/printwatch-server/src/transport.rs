use anyhow::Result;
use printwatch_common::types::TransportEvent;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

/// Parses one JSON line. Blank lines and `#` comments yield `None`;
/// malformed lines are logged and yield `None`.
pub fn parse_line(line_no: u64, line: &str) -> Option<TransportEvent> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match serde_json::from_str::<TransportEvent>(line) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(line = line_no, error = %e, "Skipping malformed transport line");
            None
        }
    }
}

/// Reads transport events until EOF or until the receiver goes away.
/// Sending waits for channel capacity, which back-pressures the input.
///
/// Returns the number of events forwarded.
pub async fn read_events<R>(reader: R, tx: mpsc::Sender<TransportEvent>) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0u64;
    let mut forwarded = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let Some(event) = parse_line(line_no, &line) else {
            continue;
        };
        if tx.send(event).await.is_err() {
            tracing::debug!("Transport receiver closed, stopping reader");
            break;
        }
        forwarded += 1;
    }

    tracing::info!(lines = line_no, forwarded, "Transport input finished");
    Ok(forwarded)
}
