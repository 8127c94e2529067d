use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrintJobError {
    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),
    #[error("Invalid state transition for job {id}: {from} -> {to}")]
    InvalidTransition { id: JobId, from: JobState, to: JobState },
    #[error("Job {id} is not printing (state: {state})")]
    NotPrinting { id: JobId, state: JobState },
    #[error("Job {0} has no pages remaining")]
    NoPagesRemaining(JobId),
}

/// Opaque job identity, stable for the lifetime of the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    // Short form for logs and tables; equality always uses the full uuid.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Queued,
    Printing,
    Paused,
    /// Back in the pending queue after being displaced by a shorter job.
    Preempted,
    Completed,
    Canceled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Canceled)
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Queued, Printing)
                | (Queued, Canceled)
                | (Printing, Paused)
                | (Paused, Printing)
                | (Printing, Preempted)
                | (Preempted, Printing)
                | (Preempted, Canceled)
                | (Printing, Queued)
                | (Paused, Queued)
                | (Printing, Completed)
                | (Printing, Canceled)
                | (Paused, Canceled)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobState::Queued => "Queued",
            JobState::Printing => "Printing",
            JobState::Paused => "Paused",
            JobState::Preempted => "Queued (Preempted)",
            JobState::Completed => "Completed",
            JobState::Canceled => "Canceled",
        };
        f.write_str(label)
    }
}

/// A single print request. Owned by exactly one of the dispatcher queue or one printer.
///
/// Remaining pages are derived from `total_pages - completed_pages`, so the
/// two can never drift apart.
#[derive(Debug)]
pub struct PrintJob {
    id: JobId,
    name: String,
    total_pages: u32,
    completed_pages: u32,
    state: JobState,
}

impl PrintJob {
    pub fn new(name: impl Into<String>, total_pages: u32) -> Result<Self, PrintJobError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PrintJobError::InvalidSubmission("job name cannot be empty".to_string()));
        }
        if total_pages == 0 {
            return Err(PrintJobError::InvalidSubmission(format!(
                "job '{}' must have at least one page",
                name
            )));
        }
        Ok(Self {
            id: JobId::new(),
            name,
            total_pages,
            completed_pages: 0,
            state: JobState::Queued,
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn completed_pages(&self) -> u32 {
        self.completed_pages
    }

    pub fn remaining_pages(&self) -> u32 {
        self.total_pages - self.completed_pages
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn is_fully_printed(&self) -> bool {
        self.completed_pages >= self.total_pages
    }

    pub fn transition(&mut self, next: JobState) -> Result<(), PrintJobError> {
        if self.state == next {
            return Ok(());
        }
        if !self.state.can_transition_to(next) {
            return Err(PrintJobError::InvalidTransition {
                id: self.id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Records one printed page. Returns the pages still remaining.
    pub fn advance_page(&mut self) -> Result<u32, PrintJobError> {
        if self.state != JobState::Printing {
            return Err(PrintJobError::NotPrinting { id: self.id, state: self.state });
        }
        if self.is_fully_printed() {
            return Err(PrintJobError::NoPagesRemaining(self.id));
        }
        self.completed_pages += 1;
        Ok(self.remaining_pages())
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            name: self.name.clone(),
            total_pages: self.total_pages,
            completed_pages: self.completed_pages,
            remaining_pages: self.remaining_pages(),
            state: self.state,
        }
    }
}

impl fmt::Display for PrintJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' ({}p, {} left) [{}]",
            self.id,
            self.name,
            self.total_pages,
            self.remaining_pages(),
            self.state
        )
    }
}

/// Read-only copy of a job, safe to hand to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub name: String,
    pub total_pages: u32,
    pub completed_pages: u32,
    pub remaining_pages: u32,
    pub state: JobState,
}

impl JobSnapshot {
    pub fn percent_complete(&self) -> f64 {
        if self.total_pages == 0 {
            return 0.0;
        }
        self.completed_pages as f64 / self.total_pages as f64 * 100.0
    }

    pub fn progress_label(&self) -> String {
        format!(
            "{}/{} ({:.0}%)",
            self.completed_pages,
            self.total_pages,
            self.percent_complete()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printing_job(pages: u32) -> PrintJob {
        let mut job = PrintJob::new("report.pdf", pages).unwrap();
        job.transition(JobState::Printing).unwrap();
        job
    }

    #[test]
    fn rejects_empty_name_and_zero_pages() {
        assert!(matches!(PrintJob::new("  ", 3), Err(PrintJobError::InvalidSubmission(_))));
        assert!(matches!(PrintJob::new("a.pdf", 0), Err(PrintJobError::InvalidSubmission(_))));
    }

    #[test]
    fn pages_are_conserved_while_printing() {
        let mut job = printing_job(3);
        for expected_remaining in [2, 1, 0] {
            assert_eq!(job.advance_page().unwrap(), expected_remaining);
            assert_eq!(job.completed_pages() + job.remaining_pages(), job.total_pages());
        }
        assert!(job.is_fully_printed());
        assert_eq!(job.advance_page(), Err(PrintJobError::NoPagesRemaining(job.id())));
    }

    #[test]
    fn advance_requires_printing_state() {
        let mut job = PrintJob::new("a.pdf", 2).unwrap();
        let err = job.advance_page().unwrap_err();
        assert!(matches!(err, PrintJobError::NotPrinting { state: JobState::Queued, .. }));
    }

    #[test]
    fn preempted_job_keeps_its_progress() {
        let mut job = printing_job(10);
        job.advance_page().unwrap();
        job.advance_page().unwrap();
        job.transition(JobState::Preempted).unwrap();
        job.transition(JobState::Printing).unwrap();
        assert_eq!(job.remaining_pages(), 8);
        assert_eq!(job.snapshot().completed_pages, 2);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut job = printing_job(1);
        job.advance_page().unwrap();
        job.transition(JobState::Completed).unwrap();
        for next in [JobState::Queued, JobState::Printing, JobState::Paused, JobState::Canceled] {
            assert!(matches!(
                job.transition(next),
                Err(PrintJobError::InvalidTransition { from: JobState::Completed, .. })
            ));
        }

        let mut canceled = PrintJob::new("b.pdf", 4).unwrap();
        canceled.transition(JobState::Canceled).unwrap();
        assert!(canceled.transition(JobState::Printing).is_err());
    }

    #[test]
    fn queued_job_cannot_be_paused_or_completed() {
        let mut job = PrintJob::new("c.pdf", 4).unwrap();
        assert!(job.transition(JobState::Paused).is_err());
        assert!(job.transition(JobState::Completed).is_err());
        assert_eq!(job.state(), JobState::Queued);
    }

    #[test]
    fn snapshot_progress_label() {
        let mut job = printing_job(4);
        job.advance_page().unwrap();
        let snap = job.snapshot();
        assert_eq!(snap.progress_label(), "1/4 (25%)");
        assert_eq!(snap.state.to_string(), "Printing");
        assert_eq!(JobState::Preempted.to_string(), "Queued (Preempted)");
    }

    #[test]
    fn job_ids_are_unique_and_display_short() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 8);
    }
}
