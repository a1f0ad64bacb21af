/// Errors raised while delivering events to a sink.
///
/// # Examples
///
/// ```rust
/// use printwatch_notify::error::SinkError;
///
/// let err = SinkError::Rejected { status: 503, body: "busy".to_string() };
/// assert!(err.to_string().contains("503"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// An HTTP request to the sink failed.
    #[error("Sink: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serializing the event failed.
    #[error("Sink: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Writing to a local stream failed.
    #[error("Sink: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sink answered with a non-success status.
    #[error("Sink: rejected with status={status}, body={body}")]
    Rejected { status: u16, body: String },

    /// The dispatcher has shut down and accepts no more events.
    #[error("Sink: dispatcher closed")]
    Closed,
}

/// Convenience `Result` alias for sink operations.
pub type Result<T> = std::result::Result<T, SinkError>;
