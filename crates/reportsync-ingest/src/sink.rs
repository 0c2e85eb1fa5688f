//! Record delivery and resume markers
//!
//! Every record leaves the fetch loop wrapped in a [`SourceRecord`] that
//! carries enough partition/offset information for a restarted process to
//! tell whether a completed window was acknowledged downstream.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::SinkError;
use crate::materialize::RecordStruct;
use crate::schema::RecordSchema;

/// Partition a record belongs to: the start token of its window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePartition {
    pub start_date: String,
}

/// Position a record was read at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOffset {
    /// Cursor in effect when the page was requested, `None` for the first page
    pub page_token: Option<String>,
    /// Completion anchor of the fetcher when the record was produced
    pub last_success_at: DateTime<Utc>,
}

/// Name and version of the schema a struct was built under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaTag {
    pub name: String,
    pub version: u32,
}

impl From<&RecordSchema> for SchemaTag {
    fn from(schema: &RecordSchema) -> Self {
        Self {
            name: schema.name().to_string(),
            version: schema.version(),
        }
    }
}

/// A materialized row ready for delivery
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecord {
    pub topic: String,
    pub partition: SourcePartition,
    pub offset: SourceOffset,
    pub key_schema: SchemaTag,
    pub value_schema: SchemaTag,
    pub key: RecordStruct,
    pub value: RecordStruct,
}

/// The last partition/offset acknowledged downstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedOffset {
    pub partition: SourcePartition,
    pub offset: SourceOffset,
}

impl CommittedOffset {
    pub fn of(record: &SourceRecord) -> Self {
        Self {
            partition: record.partition.clone(),
            offset: record.offset.clone(),
        }
    }
}

/// Accepts records from the fetch loop
#[async_trait]
pub trait RecordSink: Send {
    async fn send(&mut self, record: SourceRecord) -> Result<(), SinkError>;

    /// Called once after every page
    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Called once a whole window was delivered, with the marker a restarted
    /// process resumes from
    async fn commit(&mut self, _marker: &CommittedOffset) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Reports the last committed marker, read at the start of every cycle
#[async_trait]
pub trait ResumeState: Send + Sync {
    async fn committed(&self) -> Result<Option<CommittedOffset>, SinkError>;
}

/// Resume state that never has a marker
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResumeState;

#[async_trait]
impl ResumeState for NoResumeState {
    async fn committed(&self) -> Result<Option<CommittedOffset>, SinkError> {
        Ok(None)
    }
}

// ============================================================================
// Offset file
// ============================================================================

/// JSON file holding the last committed partition/offset
#[derive(Debug, Clone)]
pub struct OffsetFile {
    path: PathBuf,
}

impl OffsetFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored marker, `None` when nothing was committed yet
    pub async fn load(&self) -> Result<Option<CommittedOffset>, SinkError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the stored marker
    ///
    /// Written to a sibling temp file and renamed so a crash never leaves a
    /// truncated marker behind.
    pub async fn commit(&self, marker: &CommittedOffset) -> Result<(), SinkError> {
        let bytes = serde_json::to_vec_pretty(marker)?;
        let tmp = self.path.with_extension("tmp");

        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            path = %self.path.display(),
            partition = %marker.partition.start_date,
            "Committed offset"
        );
        Ok(())
    }
}

#[async_trait]
impl ResumeState for OffsetFile {
    async fn committed(&self) -> Result<Option<CommittedOffset>, SinkError> {
        self.load().await
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Writes one JSON document per record
///
/// With an [`OffsetFile`] attached, every flush commits the marker of the
/// last record written and every window commit replaces it with the
/// completion marker.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
    offsets: Option<OffsetFile>,
    pending: Option<CommittedOffset>,
    written: u64,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            offsets: None,
            pending: None,
            written: 0,
        }
    }

    pub fn with_offsets(mut self, offsets: OffsetFile) -> Self {
        self.offsets = Some(offsets);
        self
    }

    /// Records written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    async fn send(&mut self, record: SourceRecord) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        self.pending = Some(CommittedOffset::of(&record));
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        if let (Some(offsets), Some(marker)) = (&self.offsets, self.pending.take()) {
            offsets.commit(&marker).await?;
        }
        Ok(())
    }

    async fn commit(&mut self, marker: &CommittedOffset) -> Result<(), SinkError> {
        self.writer.flush()?;
        self.pending = None;
        if let Some(offsets) = &self.offsets {
            offsets.commit(marker).await?;
        }
        Ok(())
    }
}

/// Counts records and drops them
///
/// Used by dry runs, which may poll for days.
#[derive(Debug, Clone, Default)]
pub struct CountingSink {
    records: Arc<AtomicU64>,
}

impl CountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RecordSink for CountingSink {
    async fn send(&mut self, _record: SourceRecord) -> Result<(), SinkError> {
        self.records.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Collects records in memory
///
/// Clones share the same buffer, so a handle kept outside the fetcher sees
/// everything the fetcher sent.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<SourceRecord>>>,
    flushes: Arc<Mutex<u64>>,
    commits: Arc<Mutex<Vec<CommittedOffset>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SourceRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flushes(&self) -> u64 {
        *self
            .flushes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Completion markers, oldest first
    pub fn commits(&self) -> Vec<CommittedOffset> {
        self.commits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn send(&mut self, record: SourceRecord) -> Result<(), SinkError> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        *self
            .flushes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(())
    }

    async fn commit(&mut self, marker: &CommittedOffset) -> Result<(), SinkError> {
        self.commits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(marker.clone());
        Ok(())
    }
}
