//! Shared helpers for ingest integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reportsync_ingest::error::{SinkError, SourceError};
use reportsync_ingest::fetcher::{FetchSettings, IncrementalFetcher};
use reportsync_ingest::report::{ColumnHeader, Report, ReportRow};
use reportsync_ingest::sink::{
    CommittedOffset, MemorySink, RecordSink, ResumeState, SourceRecord,
};
use reportsync_ingest::source::ReportSource;
use reportsync_ingest::window::{PageCursor, ReportWindow};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,reportsync_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// A fixed point in time tests measure from
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn settings() -> FetchSettings {
    FetchSettings {
        topic: "analytics".to_string(),
        backfill_start: "30DaysAgo".to_string(),
        incremental_start: "1DaysAgo".to_string(),
        end_date: "yesterday".to_string(),
        min_fetch_interval: Duration::from_secs(3600),
        poll_interval: Duration::from_millis(10),
    }
}

/// Header for `pagePath`, `dateHourMinute` and `pageviews: INTEGER`
pub fn pageview_header() -> ColumnHeader {
    ColumnHeader::new(
        ["ga:pagePath", "ga:dateHourMinute"],
        [("pageviews", "INTEGER")],
    )
}

/// A page of `(path, timestamp, pageviews)` rows
pub fn pageview_page(rows: &[(&str, &str, &str)]) -> Report {
    Report::new(
        pageview_header(),
        Some(
            rows.iter()
                .map(|(path, ts, views)| ReportRow::new([*path, *ts], [*views]))
                .collect(),
        ),
    )
}

pub fn empty_page() -> Report {
    Report::new(pageview_header(), None)
}

/// Serves scripted pages in order and records every request
#[derive(Clone, Default)]
pub struct ScriptedSource {
    script: Arc<Mutex<VecDeque<Result<Report, SourceError>>>>,
    calls: Arc<Mutex<Vec<(ReportWindow, PageCursor)>>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, report: Report) -> Self {
        self.script.lock().unwrap().push_back(Ok(report));
        self
    }

    pub fn fail(self, status: u16) -> Self {
        self.script.lock().unwrap().push_back(Err(SourceError::Status {
            status,
            body: "scripted failure".to_string(),
        }));
        self
    }

    pub fn error(self, error: SourceError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn push_page(&self, report: Report) {
        self.script.lock().unwrap().push_back(Ok(report));
    }

    pub fn calls(&self) -> Vec<(ReportWindow, PageCursor)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl ReportSource for ScriptedSource {
    async fn fetch(
        &self,
        window: &ReportWindow,
        cursor: &PageCursor,
    ) -> Result<Report, SourceError> {
        self.calls
            .lock()
            .unwrap()
            .push((window.clone(), cursor.clone()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(SourceError::EmptyResponse))
    }
}

/// Accepts `accept` records, then fails every send
pub struct FailingSink {
    inner: MemorySink,
    accept: usize,
}

impl FailingSink {
    pub fn new(inner: MemorySink, accept: usize) -> Self {
        Self { inner, accept }
    }
}

#[async_trait]
impl RecordSink for FailingSink {
    async fn send(&mut self, record: SourceRecord) -> Result<(), SinkError> {
        if self.inner.len() >= self.accept {
            return Err(SinkError::Io(std::io::Error::other("downstream closed")));
        }
        self.inner.send(record).await
    }
}

/// Resume state with a fixed marker
pub struct FixedResume(pub Option<CommittedOffset>);

#[async_trait]
impl ResumeState for FixedResume {
    async fn committed(&self) -> Result<Option<CommittedOffset>, SinkError> {
        Ok(self.0.clone())
    }
}

/// Resume state whose backing store is unreadable
pub struct BrokenResume;

#[async_trait]
impl ResumeState for BrokenResume {
    async fn committed(&self) -> Result<Option<CommittedOffset>, SinkError> {
        Err(SinkError::Io(std::io::Error::other("offset store unavailable")))
    }
}

pub fn fetcher(
    source: &ScriptedSource,
    sink: Box<dyn RecordSink>,
    resume: Arc<dyn ResumeState>,
) -> IncrementalFetcher {
    IncrementalFetcher::new_at(settings(), Arc::new(source.clone()), sink, resume, t0())
}
