//! Log source layer: defines a generic interface for listing and fetching remote log files.
//!
//! The fetch loop depends on this abstraction (`LogSource`) instead of a concrete API client,
//! so the RDS backend can be swapped for an in-memory source in tests.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("{operation} failed: {message}")]
pub struct SourceError {
    pub operation: &'static str,
    pub message: String,
}

impl SourceError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// A log file as reported by a listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileDescriptor {
    pub name: String,
    /// Total size at listing time.
    pub size: u64,
    /// Server-side modification timestamp, when the server reported one.
    pub last_written: Option<i64>,
}

/// One portion of a log file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogPortion {
    pub data: Option<String>,
    pub marker: Option<String>,
    /// The server's own "more data" hint. RDS returns false here while data is still
    /// pending, so it is reported but never used to decide whether to keep fetching.
    pub additional_data_pending: bool,
}

/// Generic trait for remote log sources.
#[async_trait::async_trait]
pub trait LogSource: Send + Sync {
    /// List log files written at or after `since`, in the order they should be drained.
    async fn list_files(&self, since: i64) -> Result<Vec<LogFileDescriptor>, SourceError>;

    /// Fetch the portion of `file` that starts at `marker`.
    async fn fetch_portion(&self, file: &str, marker: &str) -> Result<LogPortion, SourceError>;
}
