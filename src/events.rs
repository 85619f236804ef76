// Upward event interface: progress, structured log records and the terminal
// completion signal. The orchestrator only talks to an `EventSink`; the CLI
// wires a `ChannelSink` so events cross from the batch worker thread to the
// main thread.

use std::sync::mpsc::Sender;

use serde::{Deserialize, Serialize};

/// Per-job progress sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_index: usize,
    pub total_jobs: usize,
    /// Progress of the current job, 0..=100.
    pub percent: u8,
}

impl ProgressEvent {
    /// Batch-level progress: `floor((job_index * 100 + percent) / total_jobs)`.
    pub fn overall_percent(&self) -> u8 {
        if self.total_jobs == 0 {
            return 0;
        }
        let raw = (self.job_index * 100 + self.percent as usize) / self.total_jobs;
        raw.min(100) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// A structured log entry: level, emitting module, message and optional data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub level: LogLevel,
    pub module: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl LogRecord {
    pub fn new(level: LogLevel, module: &str, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Local::now().to_rfc3339(),
            level,
            module: module.to_string(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Mirror the record into the process-wide tracing subscriber.
    pub fn trace(&self) {
        match (self.level, &self.data) {
            (LogLevel::Info, Some(data)) => {
                tracing::info!(module = %self.module, %data, "{}", self.message)
            }
            (LogLevel::Info, None) => tracing::info!(module = %self.module, "{}", self.message),
            (LogLevel::Warn, Some(data)) => {
                tracing::warn!(module = %self.module, %data, "{}", self.message)
            }
            (LogLevel::Warn, None) => tracing::warn!(module = %self.module, "{}", self.message),
            (LogLevel::Error, Some(data)) => {
                tracing::error!(module = %self.module, %data, "{}", self.message)
            }
            (LogLevel::Error, None) => tracing::error!(module = %self.module, "{}", self.message),
        }
    }
}

/// Everything the batch worker reports upward, as one message type so it can
/// travel over a single channel.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Progress(ProgressEvent),
    Log(LogRecord),
    /// Terminal event. `detail` is the output folder on success, otherwise the
    /// error message.
    Complete { success: bool, detail: String },
}

/// Receiver of batch events.
pub trait EventSink: Send {
    fn on_progress(&mut self, progress: ProgressEvent);
    fn on_log(&mut self, record: LogRecord);
    fn on_complete(&mut self, success: bool, detail: &str);
}

/// Forwards events over an mpsc channel. A dropped receiver is not an error:
/// the batch keeps running and the events are discarded.
pub struct ChannelSink {
    sender: Sender<BatchEvent>,
}

impl ChannelSink {
    pub fn new(sender: Sender<BatchEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn on_progress(&mut self, progress: ProgressEvent) {
        let _ = self.sender.send(BatchEvent::Progress(progress));
    }

    fn on_log(&mut self, record: LogRecord) {
        let _ = self.sender.send(BatchEvent::Log(record));
    }

    fn on_complete(&mut self, success: bool, detail: &str) {
        let _ = self.sender.send(BatchEvent::Complete {
            success,
            detail: detail.to_string(),
        });
    }
}

/// Collects events in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<BatchEvent>,
}

impl RecordingSink {
    pub fn progress(&self) -> Vec<ProgressEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn logs(&self) -> Vec<&LogRecord> {
        self.events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Log(r) => Some(r),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn on_progress(&mut self, progress: ProgressEvent) {
        self.events.push(BatchEvent::Progress(progress));
    }

    fn on_log(&mut self, record: LogRecord) {
        self.events.push(BatchEvent::Log(record));
    }

    fn on_complete(&mut self, success: bool, detail: &str) {
        self.events.push(BatchEvent::Complete {
            success,
            detail: detail.to_string(),
        });
    }
}
