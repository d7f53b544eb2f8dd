//! Run-local append-only log and progress accounting.
//!
//! A migration run produces an ordered, leveled log that collaborators (the
//! out-of-scope UI) receive verbatim; each append also emits a `tracing`
//! event for developer telemetry. The progress counter is a single-pass
//! monotonic model over a total computed once up front.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub details: Option<String>,
}

/// Synchronous sink invoked for every appended entry, mirroring the caller's
/// logger callback.
pub type LogSink = Arc<dyn Fn(&LogEntry) + Send + Sync>;

/// Ordered, append-only log owned by one run and discarded afterward.
#[derive(Default)]
pub struct RunLog {
    entries: Vec<LogEntry>,
    sink: Option<LogSink>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: LogSink) -> Self {
        Self {
            entries: Vec::new(),
            sink: Some(sink),
        }
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>, details: Option<String>) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            details,
        };
        match level {
            LogLevel::Info | LogLevel::Success => {
                tracing::info!(target: "recast::run", details = ?entry.details, "{}", entry.message)
            }
            LogLevel::Warning => {
                tracing::warn!(target: "recast::run", details = ?entry.details, "{}", entry.message)
            }
            LogLevel::Error => {
                tracing::error!(target: "recast::run", details = ?entry.details, "{}", entry.message)
            }
        }
        if let Some(sink) = &self.sink {
            sink(&entry);
        }
        self.entries.push(entry);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message, None);
    }

    pub fn info_with(&mut self, message: impl Into<String>, details: impl Into<String>) {
        self.push(LogLevel::Info, message, Some(details.into()));
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Success, message, None);
    }

    pub fn success_with(&mut self, message: impl Into<String>, details: impl Into<String>) {
        self.push(LogLevel::Success, message, Some(details.into()));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warning, message, None);
    }

    pub fn warning_with(&mut self, message: impl Into<String>, details: impl Into<String>) {
        self.push(LogLevel::Warning, message, Some(details.into()));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, message, None);
    }

    pub fn error_with(&mut self, message: impl Into<String>, details: impl Into<String>) {
        self.push(LogLevel::Error, message, Some(details.into()));
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}

impl fmt::Debug for RunLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLog")
            .field("entries", &self.entries.len())
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

/// Monotonic progress over a precomputed step total. No re-estimation mid-run;
/// `advance` clamps at the total so the percentage never decreases and never
/// exceeds 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    total: usize,
    completed: usize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
        }
    }

    pub fn advance(&mut self) -> f64 {
        self.completed = (self.completed + 1).min(self.total.max(1));
        self.percent()
    }

    /// Marks the run complete; the percentage is exactly 100 afterwards.
    pub fn complete(&mut self) {
        self.completed = self.total;
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
