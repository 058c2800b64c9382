//! Error types for the sync client.

use opseq::OtError;
use thiserror::Error;

/// Result type alias for sync client operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while keeping a document in sync.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The server sent history starting past what this client has seen.
    /// The connection can no longer be trusted and must be closed.
    #[error("History starts at revision {start}, but only {revision} operations are known")]
    ProtocolViolation { start: usize, revision: usize },

    /// The server acknowledged an edit while none was in flight.
    #[error("Received acknowledgment with no outstanding operation")]
    AckWithoutOutstanding,

    /// An operation did not fit the text it was applied to.
    #[error("Operation error: {0}")]
    Ot(#[from] OtError),

    /// A message could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The socket failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Too many disconnects in a short window; the session must be reloaded.
    #[error("Session is permanently desynchronized")]
    Desynchronized,
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}
