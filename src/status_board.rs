// src/status_board.rs - front-end state rebuilt from the update stream
use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;

use printflow_shared::{
    JobSnapshot, JobState, LogEntry, Policy, PrinterId, PrinterState, PrinterStatus, UpdateEvent,
};

const DEFAULT_LOG_CAPACITY: usize = 200;

/// Everything a front end knows, built only from [`UpdateEvent`]s.
#[derive(Debug)]
pub struct StatusBoard {
    policy: Policy,
    queue: Vec<JobSnapshot>,
    printers: BTreeMap<PrinterId, PrinterStatus>,
    log: VecDeque<LogEntry>,
    log_capacity: usize,
    finished: Vec<(Option<PrinterId>, JobSnapshot)>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::with_log_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_capacity(log_capacity: usize) -> Self {
        Self {
            policy: Policy::default(),
            queue: Vec::new(),
            printers: BTreeMap::new(),
            log: VecDeque::new(),
            log_capacity,
            finished: Vec::new(),
        }
    }

    pub fn apply(&mut self, event: UpdateEvent) {
        match event {
            UpdateEvent::Log(entry) => {
                if self.log.len() == self.log_capacity {
                    self.log.pop_front();
                }
                self.log.push_back(entry);
            }
            UpdateEvent::AlgorithmChanged(policy) => self.policy = policy,
            UpdateEvent::QueueSnapshot(queue) => self.queue = queue,
            UpdateEvent::PrinterStatus(status) => {
                if status.state == PrinterState::Offline {
                    self.printers.remove(&status.printer_id);
                } else {
                    self.printers.insert(status.printer_id, status);
                }
            }
            UpdateEvent::JobFinished { printer, job } => self.finished.push((printer, job)),
        }
    }

    pub fn apply_all<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = UpdateEvent>,
    {
        for event in events {
            self.apply(event);
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn queue(&self) -> &[JobSnapshot] {
        &self.queue
    }

    pub fn printer(&self, printer_id: PrinterId) -> Option<&PrinterStatus> {
        self.printers.get(&printer_id)
    }

    pub fn printers(&self) -> impl Iterator<Item = &PrinterStatus> {
        self.printers.values()
    }

    pub fn log(&self) -> impl Iterator<Item = &LogEntry> {
        self.log.iter()
    }

    pub fn finished(&self) -> &[(Option<PrinterId>, JobSnapshot)] {
        &self.finished
    }

    pub fn count_finished(&self, state: JobState) -> usize {
        self.finished.iter().filter(|(_, job)| job.state == state).count()
    }

    /// Plain-text printer and queue tables.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Active Algorithm: {}", self.policy);
        let _ = writeln!(out, "Connected Printers: {}", self.printers.len());
        let _ = writeln!(out, "{:<20} {:<20} {:<24} {}", "PRINTER", "STATUS", "FILE", "PROGRESS");
        for status in self.printers.values() {
            let (state, file, progress) = match &status.job {
                Some(job) => (job.state.to_string(), job.name.clone(), job.progress_label()),
                None => (status.state.to_string(), "---".to_string(), "---".to_string()),
            };
            let _ = writeln!(out, "{:<20} {:<20} {:<24} {}", status.name, state, file, progress);
        }
        let _ = writeln!(out, "Queue ({} pending):", self.queue.len());
        let _ = writeln!(
            out,
            "{:<10} {:<24} {:>6} {:>6} {}",
            "ID", "FILE", "PAGES", "LEFT", "STATUS"
        );
        for job in &self.queue {
            let _ = writeln!(
                out,
                "{:<10} {:<24} {:>6} {:>6} {}",
                job.id.to_string(),
                job.name,
                job.total_pages,
                job.remaining_pages,
                job.state
            );
        }
        out
    }
}
