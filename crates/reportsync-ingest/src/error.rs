//! Error types for the ingestion pipeline
//!
//! Errors are split by collaborator so the fetch loop can tell a transient
//! transport problem from a fatal setup problem.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Failures raised by a report source
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source could not be set up. Never retried.
    #[error("Failed to initialize report source: {0}")]
    Init(String),

    #[error("Report request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API rejected the credentials. Never retried.
    #[error("Reporting API rejected the credentials ({status}): {body}")]
    Unauthorized { status: u16, body: String },

    /// A fresh access token could not be obtained
    #[error("Failed to obtain access token: {0}")]
    Token(String),

    #[error("Reporting API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode report response: {0}")]
    Decode(String),

    #[error("Reporting API response contained no report")]
    EmptyResponse,
}

impl SourceError {
    /// Whether the next cycle may succeed without operator action
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            SourceError::Init(_) | SourceError::Unauthorized { .. }
        )
    }
}

/// Failures raised while handing records to a sink or reading offsets
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The materializer was handed a report without row data
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Report contains no rows")]
pub struct MissingRows;

/// Umbrella error for one poll cycle
#[derive(Error, Debug)]
pub enum IngestError {
    /// A non-backfill window returned no rows, which usually means the window
    /// is misconfigured rather than that nothing happened.
    #[error("No data available for timeframe {start_date}..{end_date}")]
    NoData { start_date: String, end_date: String },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl IngestError {
    /// Whether the failure should be retried on a later cycle
    pub fn is_transient(&self) -> bool {
        match self {
            IngestError::Source(e) => e.is_transient(),
            IngestError::Sink(_) => true,
            IngestError::NoData { .. } => true,
        }
    }
}
