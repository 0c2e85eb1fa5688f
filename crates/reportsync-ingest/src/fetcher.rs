//! Incremental fetch state machine
//!
//! One [`IncrementalFetcher`] owns the active window, the page cursor and
//! the completion anchor of a single report. Each call to
//! [`IncrementalFetcher::poll`] is one cycle:
//!
//! 1. adopt the downstream resume marker while still in backfill
//! 2. decide between fetching and idling
//! 3. page through the window, emitting every record and flushing per page
//! 4. on success commit a completion marker, then narrow the window to the
//!    incremental form; on failure restore the window and cursor the cycle
//!    started with
//!
//! Records already emitted by a failed cycle are not retracted, so delivery
//! is at-least-once.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ConnectorConfig;
use crate::error::{IngestError, MissingRows, Result};
use crate::materialize::materialize;
use crate::report::Report;
use crate::schema::{SchemaPair, SchemaSynthesizer};
use crate::sink::{
    CommittedOffset, RecordSink, ResumeState, SchemaTag, SourceOffset, SourcePartition,
    SourceRecord,
};
use crate::source::ReportSource;
use crate::window::{PageCursor, ReportWindow};

/// Window tokens and timing for one report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    pub topic: String,
    pub backfill_start: String,
    pub incremental_start: String,
    pub end_date: String,
    pub min_fetch_interval: Duration,
    pub poll_interval: Duration,
}

impl FetchSettings {
    pub fn backfill_window(&self) -> ReportWindow {
        ReportWindow::new(&self.backfill_start, &self.end_date)
    }

    pub fn incremental_window(&self) -> ReportWindow {
        ReportWindow::new(&self.incremental_start, &self.end_date)
    }
}

impl From<&ConnectorConfig> for FetchSettings {
    fn from(config: &ConnectorConfig) -> Self {
        Self {
            topic: config.topic.clone(),
            backfill_start: config.backfill_start.clone(),
            incremental_start: config.incremental_start.clone(),
            end_date: config.end_date.clone(),
            min_fetch_interval: config.min_fetch_interval(),
            poll_interval: config.poll_interval(),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from(&ConnectorConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Idle,
    Paginating,
    Completed,
}

/// When the last window completed, and whether the latest attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionState {
    pub last_success_at: DateTime<Utc>,
    pub completed_window: bool,
}

/// What a fetching cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    /// Window the cycle paged through
    pub window: ReportWindow,
    pub pages: u32,
    pub records: u64,
    /// Pages of a non-backfill window that came back without rows
    pub empty_pages: u32,
    /// Schema version active when the cycle ended
    pub schema_version: Option<u32>,
}

impl CycleSummary {
    fn new(window: ReportWindow) -> Self {
        Self {
            window,
            pages: 0,
            records: 0,
            empty_pages: 0,
            schema_version: None,
        }
    }
}

/// Result of one poll cycle
#[derive(Debug)]
pub enum PollOutcome {
    /// Every page of the window was processed
    Fetched(CycleSummary),
    /// Too early for the next window
    Idle { next_fetch_in: Duration },
    /// The cycle aborted; window and cursor were restored
    Failed(IngestError),
}

impl PollOutcome {
    pub fn is_fetched(&self) -> bool {
        matches!(self, PollOutcome::Fetched(_))
    }
}

/// Drives paginated, windowed fetching for one report
pub struct IncrementalFetcher {
    settings: FetchSettings,
    source: Arc<dyn ReportSource>,
    sink: Box<dyn RecordSink>,
    resume: Arc<dyn ResumeState>,
    synthesizer: SchemaSynthesizer,
    window: ReportWindow,
    cursor: PageCursor,
    completion: CompletionState,
    phase: FetchPhase,
}

impl IncrementalFetcher {
    pub fn new(
        settings: FetchSettings,
        source: Arc<dyn ReportSource>,
        sink: Box<dyn RecordSink>,
        resume: Arc<dyn ResumeState>,
    ) -> Self {
        Self::new_at(settings, source, sink, resume, Utc::now())
    }

    /// Build a fetcher whose completion anchor starts at `started_at`
    pub fn new_at(
        settings: FetchSettings,
        source: Arc<dyn ReportSource>,
        sink: Box<dyn RecordSink>,
        resume: Arc<dyn ResumeState>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let window = settings.backfill_window();
        let synthesizer = SchemaSynthesizer::new(settings.topic.clone());
        Self {
            settings,
            source,
            sink,
            resume,
            synthesizer,
            window,
            cursor: PageCursor::Start,
            completion: CompletionState {
                last_success_at: started_at,
                completed_window: false,
            },
            phase: FetchPhase::Idle,
        }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    pub fn window(&self) -> &ReportWindow {
        &self.window
    }

    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    pub fn completion(&self) -> CompletionState {
        self.completion
    }

    pub fn phase(&self) -> FetchPhase {
        self.phase
    }

    pub fn schemas(&self) -> Option<&SchemaPair> {
        self.synthesizer.active()
    }

    pub fn is_backfill(&self) -> bool {
        self.window.starts_at(&self.settings.backfill_start)
    }

    /// Run one cycle against the wall clock
    pub async fn poll(&mut self) -> PollOutcome {
        self.poll_at(Utc::now()).await
    }

    /// Run one cycle as if the current time were `now`
    pub async fn poll_at(&mut self, now: DateTime<Utc>) -> PollOutcome {
        let span = info_span!("poll_cycle", cycle_id = %Uuid::new_v4());
        self.run_cycle(now).instrument(span).await
    }

    /// Poll until `shutdown` fires or a cycle fails with a fatal error
    ///
    /// Sleeps `poll_interval` after a failed cycle and at most
    /// `poll_interval` while idle. Shutdown is honored between cycles and
    /// while sleeping, never in the middle of a page.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        info!(
            topic = %self.settings.topic,
            window = %self.window,
            "Starting fetch loop"
        );

        while !shutdown.is_cancelled() {
            let pause = match self.poll().await {
                PollOutcome::Fetched(summary) => {
                    info!(
                        window = %summary.window,
                        pages = summary.pages,
                        records = summary.records,
                        empty_pages = summary.empty_pages,
                        "Window fetched"
                    );
                    continue;
                },
                PollOutcome::Idle { next_fetch_in } => next_fetch_in.min(self.settings.poll_interval),
                PollOutcome::Failed(e) if !e.is_transient() => return Err(e),
                PollOutcome::Failed(_) => self.settings.poll_interval,
            };

            debug!(pause_secs = pause.as_secs(), "Sleeping until next cycle");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {},
            }
        }

        info!(topic = %self.settings.topic, "Fetch loop stopped");
        Ok(())
    }

    async fn run_cycle(&mut self, now: DateTime<Utc>) -> PollOutcome {
        self.apply_resume_marker().await;

        if let Some(next_fetch_in) = self.idle_wait(now) {
            debug!(
                next_fetch_in_secs = next_fetch_in.as_secs(),
                "Minimum fetch interval not reached"
            );
            return PollOutcome::Idle { next_fetch_in };
        }

        let window_before = self.window.clone();
        let cursor_before = self.cursor.clone();

        self.phase = FetchPhase::Paginating;
        info!(window = %self.window, cursor = %self.cursor, "Fetching window");

        let result = match self.paginate().await {
            Ok(summary) => self.acknowledge_window(now).await.map(|()| summary),
            Err(e) => Err(e),
        };

        match result {
            Ok(summary) => {
                self.complete_window(now);
                PollOutcome::Fetched(summary)
            },
            Err(e) => {
                error!(
                    error = %e,
                    window = %window_before,
                    failed_cursor = %self.cursor,
                    "Fetch cycle failed, window will be retried"
                );
                self.window = window_before;
                self.cursor = cursor_before;
                self.completion.completed_window = false;
                self.phase = FetchPhase::Idle;
                PollOutcome::Failed(e)
            },
        }
    }

    /// Adopt a committed marker that proves the backfill was acknowledged
    async fn apply_resume_marker(&mut self) {
        if !self.is_backfill() {
            return;
        }

        match self.resume.committed().await {
            Ok(Some(marker)) if marker.partition.start_date == self.settings.incremental_start => {
                info!(
                    last_success_at = %marker.offset.last_success_at,
                    "Backfill already acknowledged downstream, resuming incremental window"
                );
                self.window = self.settings.incremental_window();
                self.cursor = PageCursor::Start;
                self.completion = CompletionState {
                    last_success_at: marker.offset.last_success_at,
                    completed_window: true,
                };
            },
            Ok(_) => {},
            Err(e) => warn!(error = %e, "Failed to read resume marker, using wall clock"),
        }
    }

    /// Time left before the next window may be fetched, `None` to fetch now
    fn idle_wait(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.is_backfill() || !self.completion.completed_window {
            return None;
        }

        let elapsed = (now - self.completion.last_success_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        self.settings.min_fetch_interval.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    async fn paginate(&mut self) -> Result<CycleSummary> {
        let mut summary = CycleSummary::new(self.window.clone());

        loop {
            let report = self.source.fetch(&self.window, &self.cursor).await?;
            summary.pages += 1;

            self.process_page(&report, &mut summary).await?;

            match report.next_page_token {
                Some(token) => {
                    debug!(next = %token, "Advancing page cursor");
                    self.cursor = PageCursor::Token(token);
                },
                None => break,
            }
        }

        summary.schema_version = self.synthesizer.active().map(SchemaPair::version);
        Ok(summary)
    }

    async fn process_page(&mut self, report: &Report, summary: &mut CycleSummary) -> Result<()> {
        let schemas = self.synthesizer.maybe_update_schema(report).clone();

        let records = match materialize(report, &schemas.key, &schemas.value) {
            Ok(records) => records,
            Err(MissingRows) if self.is_backfill() => {
                info!(window = %self.window, cursor = %self.cursor, "Backfill page has no rows");
                return Ok(());
            },
            Err(MissingRows) => {
                let err = IngestError::NoData {
                    start_date: self.window.start_date().to_string(),
                    end_date: self.window.end_date().to_string(),
                };
                error!(error = %err, cursor = %self.cursor, "Report page has no rows");
                summary.empty_pages += 1;
                return Ok(());
            },
        };

        let partition = SourcePartition {
            start_date: self.window.start_date().to_string(),
        };
        let offset = SourceOffset {
            page_token: self.cursor.token().map(str::to_string),
            last_success_at: self.completion.last_success_at,
        };
        let key_schema = SchemaTag::from(&schemas.key);
        let value_schema = SchemaTag::from(&schemas.value);

        let count = records.len();
        for record in records {
            self.sink
                .send(SourceRecord {
                    topic: self.settings.topic.clone(),
                    partition: partition.clone(),
                    offset: offset.clone(),
                    key_schema: key_schema.clone(),
                    value_schema: value_schema.clone(),
                    key: record.key,
                    value: record.value,
                })
                .await?;
            summary.records += 1;
        }
        self.sink.flush().await?;

        debug!(records = count, schema_version = schemas.version(), "Page emitted");
        Ok(())
    }

    /// Tell the sink the window is delivered, before any state advances
    ///
    /// The marker names the incremental partition and the new anchor, which
    /// is exactly what `apply_resume_marker` adopts after a restart.
    async fn acknowledge_window(&mut self, now: DateTime<Utc>) -> Result<()> {
        let marker = CommittedOffset {
            partition: SourcePartition {
                start_date: self.settings.incremental_start.clone(),
            },
            offset: SourceOffset {
                page_token: None,
                last_success_at: now,
            },
        };
        self.sink.commit(&marker).await?;
        Ok(())
    }

    fn complete_window(&mut self, now: DateTime<Utc>) {
        self.phase = FetchPhase::Completed;
        info!(completed = %self.window, "Window completed");

        self.window = self.settings.incremental_window();
        self.cursor = PageCursor::Start;
        self.completion = CompletionState {
            last_success_at: now,
            completed_window: true,
        };
        self.phase = FetchPhase::Idle;
    }
}
