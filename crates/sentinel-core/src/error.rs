//! Error types for Sentinel Core

/// Failure decoding or encoding a persisted counter snapshot
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Stored payload is not valid snapshot JSON
    #[error("corrupt snapshot: {0}")]
    Corrupt(#[from] serde_json::Error),
}
