// src/printer.rs - one printer worker: pulls jobs, prints page by page, reacts to commands
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use printflow_shared::{
    JobId, JobState, PrintJob, PrintJobError, PrinterId, PrinterState, PrinterStatus, UpdateEvent,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

use crate::config::TimingConfig;
use crate::dispatcher::Dispatcher;
use crate::update_channel::UpdateSender;

#[derive(Debug, Error)]
pub enum PrinterError {
    #[error("Print job error: {0}")]
    Job(#[from] PrintJobError),
    #[error("No job attached at checkpoint")]
    NoJobAttached,
}

/// Commands delivered to a printer's inbox.
///
/// `TogglePause` and `Shutdown` act as soon as they are received. `Cancel` and
/// `Preempt` are only applied at the checkpoint after a printed page.
#[derive(Debug)]
pub enum PrinterCommand {
    TogglePause,
    Shutdown,
    Cancel(JobId),
    Preempt(PrintJob),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotJob {
    pub id: JobId,
    pub remaining_pages: u32,
}

/// What a printer publishes about itself for the dispatcher's preemption and cancel routing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrinterSlot {
    pub current: Option<SlotJob>,
    pub paused: bool,
    /// Job already sent as a preemption payload and not yet applied.
    pub preempting: Option<JobId>,
}

/// Simulated durations for one printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrinterTiming {
    pub page_interval: Duration,
    pub pause_poll: Duration,
    pub idle_poll: Duration,
}

impl Default for PrinterTiming {
    fn default() -> Self {
        Self::from(&TimingConfig::default())
    }
}

impl From<&TimingConfig> for PrinterTiming {
    fn from(config: &TimingConfig) -> Self {
        Self {
            page_interval: Duration::from_millis(config.page_interval_ms),
            pause_poll: Duration::from_millis(config.pause_poll_ms),
            idle_poll: Duration::from_millis(config.idle_poll_ms),
        }
    }
}

/// Cloneable handle used by the dispatcher and the host to reach a printer.
#[derive(Debug, Clone)]
pub struct PrinterHandle {
    id: PrinterId,
    name: String,
    commands: UnboundedSender<PrinterCommand>,
    slot: Arc<Mutex<PrinterSlot>>,
}

impl PrinterHandle {
    pub fn id(&self) -> PrinterId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delivers a command. Gives the command back if the printer task has exited.
    pub fn send(&self, command: PrinterCommand) -> Result<(), PrinterCommand> {
        self.commands.send(command).map_err(|e| e.0)
    }

    pub fn toggle_pause(&self) -> bool {
        self.send(PrinterCommand::TogglePause).is_ok()
    }

    pub fn request_shutdown(&self) -> bool {
        self.send(PrinterCommand::Shutdown).is_ok()
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    pub fn slot(&self) -> &Arc<Mutex<PrinterSlot>> {
        &self.slot
    }
}

pub struct Printer {
    id: PrinterId,
    name: String,
    dispatcher: Arc<Dispatcher>,
    updates: UpdateSender,
    timing: PrinterTiming,
    commands: UnboundedReceiver<PrinterCommand>,
    slot: Arc<Mutex<PrinterSlot>>,
    current: Option<PrintJob>,
    paused: bool,
    shutdown: bool,
    cancel_requests: Vec<JobId>,
    preempt_with: Option<PrintJob>,
}

impl Printer {
    pub fn new(
        id: PrinterId,
        name: impl Into<String>,
        dispatcher: Arc<Dispatcher>,
        updates: UpdateSender,
        timing: PrinterTiming,
    ) -> (Self, PrinterHandle) {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let slot = Arc::new(Mutex::new(PrinterSlot::default()));
        let handle = PrinterHandle {
            id,
            name: name.clone(),
            commands: tx,
            slot: slot.clone(),
        };
        let printer = Self {
            id,
            name,
            dispatcher,
            updates,
            timing,
            commands: rx,
            slot,
            current: None,
            paused: false,
            shutdown: false,
            cancel_requests: Vec::new(),
            preempt_with: None,
        };
        (printer, handle)
    }

    /// Runs cycles until shutdown, then hands back any held job and goes offline.
    ///
    /// A failing or panicking cycle loses the attached job but never ends the loop.
    pub async fn run(mut self) {
        tracing::info!(printer = %self.id, name = %self.name, "printer loop started");
        while !self.shutdown {
            let outcome = AssertUnwindSafe(self.run_cycle()).catch_unwind().await;
            let fault = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(_) => "cycle panicked".to_string(),
            };
            self.drop_current(&fault).await;
        }
        self.go_offline().await;
    }

    async fn run_cycle(&mut self) -> Result<(), PrinterError> {
        self.drain_commands().await;
        if self.shutdown {
            return Ok(());
        }

        if self.paused {
            if let Some(job) = self.current.as_mut() {
                job.transition(JobState::Paused)?;
            }
            self.send_status();
            self.wait(self.timing.pause_poll).await;
            return Ok(());
        }

        if self.current.is_none() {
            self.send_status();
            let next = match self.preempt_with.take() {
                Some(job) => {
                    self.release_preemption().await;
                    Some(job)
                }
                None => self.dispatcher.request_next_job(self.id).await,
            };
            let Some(mut job) = next else {
                self.wait(self.timing.idle_poll).await;
                return Ok(());
            };
            job.transition(JobState::Printing)?;
            self.updates.info(&self.name, format!("Started: {}", job.name()));
            self.current = Some(job);
            self.publish_slot().await;
        }

        self.send_status();

        // An interrupted page is not counted.
        let interrupted = self.wait(self.timing.page_interval).await;
        if interrupted || self.paused || self.shutdown {
            return Ok(());
        }

        self.current
            .as_mut()
            .ok_or(PrinterError::NoJobAttached)?
            .advance_page()?;
        self.publish_slot().await;

        // Checkpoint: cancel first, then preemption, then completion.
        if self.apply_cancel_requests().await? {
            return Ok(());
        }
        if self.apply_preemption().await? {
            return Ok(());
        }

        if self.current.as_ref().is_some_and(PrintJob::is_fully_printed) {
            if let Some(mut job) = self.current.take() {
                job.transition(JobState::Completed)?;
                self.updates.info(&self.name, format!("Finished: {}", job.name()));
                self.report_finished(&job);
                self.publish_slot().await;
                self.send_status();
            }
        }
        Ok(())
    }

    /// Cancels every requested job this printer holds.
    ///
    /// Returns true if the attached job was canceled.
    async fn apply_cancel_requests(&mut self) -> Result<bool, PrinterError> {
        let mut canceled_current = false;
        for job_id in std::mem::take(&mut self.cancel_requests) {
            if let Some(mut job) = self.current.take_if(|job| job.id() == job_id) {
                job.transition(JobState::Canceled)?;
                self.updates.info(&self.name, format!("Canceled: {}", job.name()));
                self.report_finished(&job);
                canceled_current = true;
            } else if let Some(mut job) = self.preempt_with.take_if(|job| job.id() == job_id) {
                self.release_preemption().await;
                job.transition(JobState::Canceled)?;
                self.updates
                    .info(&self.name, format!("Canceled pending preemption: {}", job.name()));
                self.report_finished(&job);
            } else {
                tracing::debug!(printer = %self.id, job = %job_id, "ignoring stale cancel request");
            }
        }
        if canceled_current {
            self.publish_slot().await;
            self.send_status();
        }
        Ok(canceled_current)
    }

    /// Swaps in the preemption payload, sending the displaced job back to the head of the queue.
    async fn apply_preemption(&mut self) -> Result<bool, PrinterError> {
        let Some(mut incoming) = self.preempt_with.take() else {
            return Ok(false);
        };
        self.release_preemption().await;
        incoming.transition(JobState::Printing)?;

        let displaced = match self.current.take() {
            Some(mut job) if job.is_fully_printed() => {
                // Its last page just went out; nothing left to re-queue.
                job.transition(JobState::Completed)?;
                self.updates.info(&self.name, format!("Finished: {}", job.name()));
                self.report_finished(&job);
                None
            }
            Some(mut job) => {
                job.transition(JobState::Preempted)?;
                self.updates
                    .info(&self.name, format!("PREEMPTED by {}.", incoming.name()));
                Some(job)
            }
            None => None,
        };

        self.updates.info(&self.name, format!("Started: {}", incoming.name()));
        self.current = Some(incoming);
        // Report and publish the swap before the displaced job becomes visible
        // again; cancels must never be routed here for a job this printer dropped.
        self.send_status();
        self.publish_slot().await;
        if let Some(job) = displaced {
            self.dispatcher.requeue(job).await;
        }
        Ok(true)
    }

    async fn go_offline(&mut self) {
        self.drain_commands().await;
        if let Err(e) = self.apply_cancel_requests().await {
            self.updates.error(&self.name, format!("ERROR: {}", e));
        }

        if let Some(mut job) = self.current.take() {
            self.updates.info(
                &self.name,
                format!("Shutting down. Re-queuing {}.", job.name()),
            );
            match job.transition(JobState::Queued) {
                Ok(()) => {
                    self.publish_slot().await;
                    self.send_status();
                    self.dispatcher.requeue(job).await;
                }
                Err(e) => self
                    .updates
                    .error(&self.name, format!("Lost {} while shutting down: {}", job.name(), e)),
            }
        }
        if let Some(job) = self.preempt_with.take() {
            self.release_preemption().await;
            self.dispatcher.requeue(job).await;
        }

        self.publish_slot().await;
        self.updates.info(&self.name, "Offline.");
        self.updates.emit(UpdateEvent::PrinterStatus(PrinterStatus {
            printer_id: self.id,
            name: self.name.clone(),
            job: None,
            state: PrinterState::Offline,
        }));
        tracing::info!(printer = %self.id, name = %self.name, "printer loop stopped");
    }

    async fn drop_current(&mut self, fault: &str) {
        self.updates.error(&self.name, format!("ERROR: {}", fault));
        if let Some(job) = self.current.take() {
            self.updates
                .warn(&self.name, format!("Dropped job {} after error.", job.id()));
        }
        self.publish_slot().await;
        self.send_status();
    }

    /// Sleeps for `duration` while serving the inbox.
    ///
    /// Returns true if a pause toggle or shutdown cut the wait short.
    async fn wait(&mut self, duration: Duration) -> bool {
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                command = self.commands.recv() => {
                    let interrupts = match command {
                        Some(command) => self.apply_command(command).await,
                        None => {
                            self.shutdown = true;
                            true
                        }
                    };
                    if interrupts {
                        return true;
                    }
                }
            }
        }
    }

    async fn drain_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(command) => {
                    self.apply_command(command).await;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.shutdown = true;
                    break;
                }
            }
        }
    }

    /// Returns true if the command should interrupt the current wait.
    async fn apply_command(&mut self, command: PrinterCommand) -> bool {
        match command {
            PrinterCommand::TogglePause => {
                self.toggle_pause().await;
                true
            }
            PrinterCommand::Shutdown => {
                self.updates.info(&self.name, "Shutdown signal received...");
                self.shutdown = true;
                true
            }
            PrinterCommand::Cancel(job_id) => {
                self.cancel_requests.push(job_id);
                false
            }
            PrinterCommand::Preempt(job) => {
                if let Some(previous) = self.preempt_with.replace(job) {
                    self.updates.warn(
                        &self.name,
                        format!(
                            "Second preemption received; returning {} to the queue.",
                            previous.name()
                        ),
                    );
                    self.dispatcher.resubmit(previous).await;
                }
                // An idle printer can start the payload right away.
                self.current.is_none()
            }
        }
    }

    async fn toggle_pause(&mut self) {
        self.paused = !self.paused;
        let next = if self.paused { JobState::Paused } else { JobState::Printing };
        if let Some(job) = self.current.as_mut() {
            if let Err(e) = job.transition(next) {
                tracing::warn!(printer = %self.id, "Pause toggle: {}", e);
            }
        }
        let message = if self.paused { "Paused." } else { "Resumed." };
        self.updates.info(&self.name, message);
        self.publish_slot().await;
        self.send_status();
    }

    async fn publish_slot(&self) {
        let mut slot = self.slot.lock().await;
        slot.current = self.current.as_ref().map(|job| SlotJob {
            id: job.id(),
            remaining_pages: job.remaining_pages(),
        });
        slot.paused = self.paused;
    }

    async fn release_preemption(&self) {
        self.slot.lock().await.preempting = None;
    }

    fn report_finished(&self, job: &PrintJob) {
        self.updates.emit(UpdateEvent::JobFinished {
            printer: Some(self.id),
            job: job.snapshot(),
        });
    }

    fn send_status(&self) {
        let state = match &self.current {
            Some(job) if job.state() == JobState::Paused => PrinterState::Paused,
            Some(_) => PrinterState::Printing,
            None if self.paused => PrinterState::Paused,
            None => PrinterState::Idle,
        };
        tracing::debug!(printer = %self.id, state = %state, "status");
        self.updates.emit(UpdateEvent::PrinterStatus(PrinterStatus {
            printer_id: self.id,
            name: self.name.clone(),
            job: self.current.as_ref().map(PrintJob::snapshot),
            state,
        }));
    }
}
