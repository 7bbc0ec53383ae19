//! Progress reporting for ingestion runs.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Stage a document is passing through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    /// Document unchanged since the last run
    Skip,
    /// Document split into chunks
    Chunk,
    /// Chunks embedded
    Embed,
    /// Entries written to the index
    Index,
    /// Document left the corpus and was removed
    Remove,
}

impl IngestPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestPhase::Skip => "skip",
            IngestPhase::Chunk => "chunk",
            IngestPhase::Embed => "embed",
            IngestPhase::Index => "index",
            IngestPhase::Remove => "remove",
        }
    }
}

impl fmt::Display for IngestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress event emitted while ingesting.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: IngestPhase,

    /// 1-based position of the document in the run
    pub current: usize,

    /// Documents in the run
    pub total: usize,

    /// Document identifier and phase detail
    pub message: String,

    /// Seconds since the run started
    pub elapsed_secs: f64,
}

impl ProgressEvent {
    /// Format as a simple user-facing line.
    pub fn format_simple(&self) -> String {
        let pct = if self.total > 0 {
            (self.current as f64 / self.total as f64) * 100.0
        } else {
            0.0
        };
        format!(
            "[{}] {}/{} ({:.0}%) - {}",
            self.phase, self.current, self.total, pct, self.message
        )
    }
}

/// Callback for progress events.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Emits progress events through an optional callback.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    start_time: Instant,
}

impl ProgressReporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
            start_time: Instant::now(),
        }
    }

    /// Reporter that only logs.
    pub fn noop() -> Self {
        Self {
            callback: None,
            start_time: Instant::now(),
        }
    }

    pub fn emit(
        &self,
        phase: IngestPhase,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) {
        let event = ProgressEvent {
            phase,
            current,
            total,
            message: message.into(),
            elapsed_secs: self.start_time.elapsed().as_secs_f64(),
        };

        tracing::debug!(
            phase = %event.phase,
            current = event.current,
            total = event.total,
            elapsed_secs = event.elapsed_secs,
            "{}",
            event.message
        );

        if let Some(callback) = &self.callback {
            callback(event);
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::noop()
    }
}
