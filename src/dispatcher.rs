// src/dispatcher.rs - shared pending queue, policy selection and preemption
use std::collections::{BTreeMap, VecDeque};

use printflow_shared::{
    JobId, JobSnapshot, JobState, Policy, PolicyThresholds, PrintJob, PrinterId, UpdateEvent,
};
use tokio::sync::Mutex;

use crate::printer::{PrinterCommand, PrinterHandle, SlotJob};
use crate::update_channel::UpdateSender;

const SOURCE: &str = "Dispatcher";

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was still pending and has been removed and canceled.
    Removed,
    /// The job is attached to (or about to preempt into) this printer, which
    /// will cancel it at its next checkpoint.
    Signaled(PrinterId),
    NotFound,
}

#[derive(Debug, Default)]
struct DispatcherState {
    queue: VecDeque<PrintJob>,
    policy: Policy,
    printers: BTreeMap<PrinterId, PrinterHandle>,
}

/// Owns the pending jobs and decides which printer gets what.
///
/// All state sits behind one mutex: queue mutations, policy changes and
/// registry changes are serialized, and the events they emit go out in that
/// same order.
#[derive(Debug)]
pub struct Dispatcher {
    state: Mutex<DispatcherState>,
    thresholds: PolicyThresholds,
    updates: UpdateSender,
}

impl Dispatcher {
    pub fn new(thresholds: PolicyThresholds, updates: UpdateSender) -> Self {
        Self {
            state: Mutex::new(DispatcherState::default()),
            thresholds,
            updates,
        }
    }

    /// Enqueues a brand-new job at the tail.
    ///
    /// When the policy in force at arrival is SRTF, the job may be handed
    /// straight to the printer with the largest remaining job instead.
    pub async fn submit(&self, job: PrintJob) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let job_id = job.id();
        let remaining = job.remaining_pages();
        self.updates.info(
            SOURCE,
            format!("Added: {} ({}p) to queue.", job.name(), job.total_pages()),
        );
        state.queue.push_back(job);

        if state.policy.is_preemptive() {
            self.check_for_preemption(state, job_id, remaining).await;
        }
        self.reselect_policy(state);
        self.emit_queue_snapshot(state);
    }

    /// Puts a job that was taken off a printer back at the head of the queue, progress intact.
    ///
    /// Never triggers preemption. Finished jobs are refused.
    pub async fn requeue(&self, job: PrintJob) {
        if job.state().is_terminal() {
            self.updates.warn(
                SOURCE,
                format!("Refusing to re-queue finished job {} ({}).", job.id(), job.state()),
            );
            return;
        }

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        self.updates.info(
            SOURCE,
            format!(
                "Re-queued ({}): {} ({}p left)",
                job.state(),
                job.name(),
                job.remaining_pages()
            ),
        );
        state.queue.push_front(job);
        self.reselect_policy(state);
        self.emit_queue_snapshot(state);
    }

    /// Returns a job that was handed out but never started to the tail of the queue.
    ///
    /// Like [`Dispatcher::requeue`] this never triggers preemption.
    pub async fn resubmit(&self, job: PrintJob) {
        if job.state().is_terminal() {
            self.updates.warn(
                SOURCE,
                format!("Refusing to resubmit finished job {} ({}).", job.id(), job.state()),
            );
            return;
        }

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        self.updates.info(
            SOURCE,
            format!("Returned to queue: {} ({}p)", job.name(), job.remaining_pages()),
        );
        state.queue.push_back(job);
        self.reselect_policy(state);
        self.emit_queue_snapshot(state);
    }

    /// Removes and returns the job the active policy picks, or `None` if nothing is pending.
    ///
    /// The requesting printer's published slot is updated before the lock is
    /// released, so the job is never unaccounted for between queue and printer.
    pub async fn request_next_job(&self, printer_id: PrinterId) -> Option<PrintJob> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        self.reselect_policy(state);
        let index = state
            .policy
            .pick_next(state.queue.iter().map(PrintJob::remaining_pages))?;
        let job = state.queue.remove(index)?;

        tracing::debug!(
            printer = %printer_id,
            job = %job,
            policy = %state.policy,
            "dispatching job"
        );
        if let Some(handle) = state.printers.get(&printer_id) {
            let mut slot = handle.slot().lock().await;
            slot.current = Some(SlotJob {
                id: job.id(),
                remaining_pages: job.remaining_pages(),
            });
        }

        self.reselect_policy(state);
        self.emit_queue_snapshot(state);
        Some(job)
    }

    pub async fn cancel(&self, job_id: JobId) -> CancelOutcome {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if let Some(index) = state.queue.iter().position(|job| job.id() == job_id) {
            if let Some(mut job) = state.queue.remove(index) {
                if let Err(e) = job.transition(JobState::Canceled) {
                    tracing::warn!("Canceling pending job: {}", e);
                }
                self.updates.info(
                    SOURCE,
                    format!("Canceled: Removed {} from main queue.", job.name()),
                );
                self.updates.emit(UpdateEvent::JobFinished {
                    printer: None,
                    job: job.snapshot(),
                });
                self.reselect_policy(state);
                self.emit_queue_snapshot(state);
                return CancelOutcome::Removed;
            }
        }

        for (printer_id, handle) in &state.printers {
            let holds_job = {
                let slot = handle.slot().lock().await;
                slot.current.map(|current| current.id) == Some(job_id)
                    || slot.preempting == Some(job_id)
            };
            if !holds_job {
                continue;
            }
            self.updates.info(
                SOURCE,
                format!("Signaling Printer {} to cancel job {}.", handle.name(), job_id),
            );
            if handle.send(PrinterCommand::Cancel(job_id)).is_ok() {
                return CancelOutcome::Signaled(*printer_id);
            }
        }

        self.updates
            .warn(SOURCE, format!("Could not find job {} to cancel.", job_id));
        CancelOutcome::NotFound
    }

    pub async fn register_printer(&self, handle: PrinterHandle) {
        let mut state = self.state.lock().await;
        self.updates.info(
            SOURCE,
            format!("Printer '{}' (ID: {}) is online.", handle.name(), handle.id()),
        );
        state.printers.insert(handle.id(), handle);
    }

    /// Removes a printer from the registry and asks it to shut down gracefully.
    ///
    /// Returns `false` if the id was not registered.
    pub async fn unregister_printer(&self, printer_id: PrinterId) -> bool {
        let mut state = self.state.lock().await;
        let Some(handle) = state.printers.remove(&printer_id) else {
            return false;
        };
        handle.request_shutdown();
        self.updates.info(
            SOURCE,
            format!("Printer '{}' (ID: {}) is shutting down.", handle.name(), printer_id),
        );
        true
    }

    pub async fn policy(&self) -> Policy {
        self.state.lock().await.policy
    }

    pub async fn queue_snapshot(&self) -> Vec<JobSnapshot> {
        let state = self.state.lock().await;
        state.queue.iter().map(PrintJob::snapshot).collect()
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn printer_ids(&self) -> Vec<PrinterId> {
        self.state.lock().await.printers.keys().copied().collect()
    }

    /// Hands `job_id` to the printer whose active job has the most pages left,
    /// provided that is strictly more than the new job needs.
    async fn check_for_preemption(
        &self,
        state: &mut DispatcherState,
        job_id: JobId,
        remaining: u32,
    ) {
        let DispatcherState { queue, printers, .. } = state;

        let mut target: Option<(&PrinterHandle, u32)> = None;
        for handle in printers.values() {
            let slot = handle.slot().lock().await;
            if slot.paused || slot.preempting.is_some() {
                continue;
            }
            let Some(current) = slot.current else {
                continue;
            };
            let best = target.map_or(remaining, |(_, pages)| pages);
            if current.remaining_pages > best {
                target = Some((handle, current.remaining_pages));
            }
        }
        let Some((handle, victim_remaining)) = target else {
            return;
        };

        let Some(index) = queue.iter().position(|job| job.id() == job_id) else {
            self.updates
                .info(SOURCE, format!("SRTF INFO: Job {} already taken.", job_id));
            return;
        };
        let Some(job) = queue.remove(index) else {
            return;
        };

        self.updates.info(
            SOURCE,
            format!(
                "SRTF PREEMPTION: Job {} ({}p) is shorter than the {}p job on {}.",
                job_id,
                remaining,
                victim_remaining,
                handle.name()
            ),
        );
        handle.slot().lock().await.preempting = Some(job_id);
        if let Err(rejected) = handle.send(PrinterCommand::Preempt(job)) {
            // Printer task already gone: undo.
            handle.slot().lock().await.preempting = None;
            if let PrinterCommand::Preempt(job) = rejected {
                queue.insert(index, job);
            }
            self.updates.warn(
                SOURCE,
                format!("Printer {} is unreachable; job {} stays queued.", handle.name(), job_id),
            );
        }
    }

    fn reselect_policy(&self, state: &mut DispatcherState) {
        let next = self
            .thresholds
            .select(state.queue.iter().map(PrintJob::remaining_pages));
        if next != state.policy {
            state.policy = next;
            self.updates
                .info(SOURCE, format!("Algorithm auto-switched to: {}", next));
            self.updates.emit(UpdateEvent::AlgorithmChanged(next));
        }
    }

    fn emit_queue_snapshot(&self, state: &DispatcherState) {
        let snapshot = state.queue.iter().map(PrintJob::snapshot).collect();
        self.updates.emit(UpdateEvent::QueueSnapshot(snapshot));
    }
}
