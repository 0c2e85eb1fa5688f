//! Incremental analytics report ingestion
//!
//! Pulls paginated reports from a `reports:batchGet` style API and turns
//! them into versioned, typed key/value records.
//!
//! # Pipeline
//!
//! - [`schema`]: derives and versions record schemas from column headers
//! - [`materialize`]: converts report rows into typed key/value structs
//! - [`fetcher`]: the windowed, page-aware fetch loop
//! - [`source`] and [`sink`]: the collaborators the loop talks to
//! - [`auth`]: service-account or static bearer tokens for the source
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use reportsync_ingest::config::ConnectorConfig;
//! use reportsync_ingest::fetcher::{FetchSettings, IncrementalFetcher, PollOutcome};
//! use reportsync_ingest::sink::{MemorySink, NoResumeState};
//! use reportsync_ingest::source::HttpReportSource;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConnectorConfig::from_env()?;
//!     let source = HttpReportSource::new(&config)?;
//!     let sink = MemorySink::new();
//!
//!     let mut fetcher = IncrementalFetcher::new(
//!         FetchSettings::from(&config),
//!         Arc::new(source),
//!         Box::new(sink.clone()),
//!         Arc::new(NoResumeState),
//!     );
//!
//!     if let PollOutcome::Fetched(summary) = fetcher.poll().await {
//!         println!("{} records from {} pages", summary.records, summary.pages);
//!     }
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod materialize;
pub mod report;
pub mod schema;
pub mod sink;
pub mod source;
pub mod window;

pub use error::{IngestError, Result};
