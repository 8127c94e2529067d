//! Shared data models for the update stream flowing from the dispatcher and
//! printers to a front end.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::policy::Policy;
use crate::print_job::JobSnapshot;

/// Identity of a connected printer worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrinterId(pub u32);

impl fmt::Display for PrinterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Printer state as shown to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrinterState {
    Idle,
    Printing,
    Paused,
    Offline,
}

impl fmt::Display for PrinterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PrinterState::Idle => "Idle",
            PrinterState::Printing => "Printing",
            PrinterState::Paused => "Paused",
            PrinterState::Offline => "Offline",
        };
        f.write_str(label)
    }
}

/// Status report for one printer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PrinterStatus {
    pub printer_id: PrinterId,
    pub name: String,
    /// Job currently attached to the printer, if any.
    pub job: Option<JobSnapshot>,
    pub state: PrinterState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// A human-readable log line, tagged with the component that produced it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    /// "Dispatcher" or the printer name.
    pub source: String,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] [{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.source,
            self.message
        )
    }
}

/// One event on the update stream.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum UpdateEvent {
    Log(LogEntry),
    AlgorithmChanged(Policy),
    QueueSnapshot(Vec<JobSnapshot>),
    PrinterStatus(PrinterStatus),
    /// A job reached Completed or Canceled. `printer` is `None` for jobs canceled while pending.
    JobFinished {
        printer: Option<PrinterId>,
        job: JobSnapshot,
    },
}
