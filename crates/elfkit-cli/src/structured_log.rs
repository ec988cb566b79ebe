//! Structured JSONL run log.
//!
//! Provides:
//! - [`LogEntry`]: one JSON object per line with required + optional fields.
//! - [`LogEmitter`]: writes entries to a file, an in-memory buffer or nowhere.
//! - [`sha256_hex`]: digest recorded for every artifact the tool writes.
//!
//! Events emitted by the runner: `parse`, `warning`, `edit`, `write`, `error`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Result of the step an entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Skip,
}

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    // Required
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    // Optional
    /// Read mode the file was parsed in (`strict` / `tolerant`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Paths of files read or written by the step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create a new log entry with required fields only.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            mode: None,
            outcome: None,
            exit_code: None,
            duration_ms: None,
            artifact_refs: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn with_artifacts(mut self, refs: Vec<String>) -> Self {
        self.artifact_refs = Some(refs);
        self
    }

    /// Set free-form details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Log emitter
// ---------------------------------------------------------------------------

enum Sink {
    File(BufWriter<File>),
    Buffer(Vec<u8>),
    Null,
}

impl Sink {
    fn writer(&mut self) -> Option<&mut dyn Write> {
        match self {
            Self::File(w) => Some(w),
            Self::Buffer(buf) => Some(buf),
            Self::Null => None,
        }
    }
}

/// Writes structured JSONL log entries.
pub struct LogEmitter {
    sink: Sink,
    seq: u64,
    run_id: String,
}

impl LogEmitter {
    /// Create an emitter that writes to a file, truncating it.
    pub fn to_file(path: &Path, run_id: &str) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::with_sink(Sink::File(BufWriter::new(file)), run_id))
    }

    /// Create an emitter that keeps its lines in memory; see [`LogEmitter::buffer`].
    #[must_use]
    pub fn to_buffer(run_id: &str) -> Self {
        Self::with_sink(Sink::Buffer(Vec::new()), run_id)
    }

    /// Create an emitter that discards everything.
    #[must_use]
    pub fn sink(run_id: &str) -> Self {
        Self::with_sink(Sink::Null, run_id)
    }

    fn with_sink(sink: Sink, run_id: &str) -> Self {
        Self {
            sink,
            seq: 0,
            run_id: run_id.to_string(),
        }
    }

    /// Lines written so far, for buffer emitters.
    #[must_use]
    pub fn buffer(&self) -> Option<&[u8]> {
        match &self.sink {
            Sink::Buffer(buf) => Some(buf),
            _ => None,
        }
    }

    /// Generate the next trace ID.
    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("elfkit::{}::{:03}", self.run_id, self.seq)
    }

    /// Start an entry with the next trace ID; hand it back to [`LogEmitter::emit_entry`].
    pub fn entry(&mut self, level: LogLevel, event: &str) -> LogEntry {
        let trace_id = self.next_trace_id();
        LogEntry::new(trace_id, level, event)
    }

    /// Emit a log entry with an auto-generated trace_id.
    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<LogEntry> {
        let entry = self.entry(level, event);
        self.emit_entry(entry.clone())?;
        Ok(entry)
    }

    /// Emit a fully-populated log entry.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        let Some(writer) = self.sink.writer() else {
            return Ok(());
        };
        let line = entry.to_jsonl().map_err(std::io::Error::other)?;
        writeln!(writer, "{line}")
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> std::io::Result<()> {
        match self.sink.writer() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Lower-case hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Current UTC time as RFC 3339 with millisecond precision.
#[must_use]
pub fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format_utc(duration.as_secs(), duration.subsec_millis())
}

fn format_utc(secs: u64, millis: u32) -> String {
    let days = secs / 86_400;
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60,
    )
}

/// Proleptic Gregorian date for a day count since 1970-01-01.
fn civil_from_days(days: u64) -> (u64, u64, u64) {
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z % 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + u64::from(month <= 2);
    (year, month, day)
}
