use thiserror::Error;

/// Typed error for the sync/adapter path.
///
/// The registry maps these onto terminal resource statuses: `Cancelled`
/// becomes `status=cancelled`, everything else becomes `status=error`.
/// Authentication failures are raised synchronously when a panel resource
/// is added or edited, before anything is persisted.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Transient network failure; retryable by re-invoking sync
    #[error("Network error: {0}")]
    Network(String),

    /// A single request exceeded its bounded timeout
    #[error("Request timed out")]
    Timeout,

    /// The sync was cancelled via its token; expected, not a failure
    #[error("Sync cancelled")]
    Cancelled,

    /// Unexpected persistent-store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Panel credentials rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Malformed playlist or panel payload
    #[error("Malformed catalog data: {0}")]
    Parse(String),

    /// Task/channel plumbing failure inside the engine
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        SyncError::Storage(err.to_string())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }

    /// Check if this error is transient and worth a user-initiated retry
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Timeout)
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout
        } else if err.is_decode() {
            SyncError::Parse(err.to_string())
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Parse(err.to_string())
    }
}

impl From<sea_orm::DbErr> for SyncError {
    fn from(err: sea_orm::DbErr) -> Self {
        SyncError::Storage(err.to_string())
    }
}
