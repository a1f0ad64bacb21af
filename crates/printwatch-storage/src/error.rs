/// Errors raised by the checkpoint store.
///
/// # Examples
///
/// ```rust
/// use printwatch_storage::error::StorageError;
///
/// let err = StorageError::from(std::io::Error::other("checkpoint directory is read-only"));
/// assert!(err.to_string().contains("read-only"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A snapshot could not be encoded or decoded.
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The data directory could not be created.
    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
