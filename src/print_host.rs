// src/print_host.rs - command boundary between a front end and the dispatcher/printers
use std::collections::BTreeMap;
use std::sync::Arc;

use printflow_shared::{
    JobId, JobSnapshot, Policy, PolicyThresholds, PrintJob, PrintJobError, PrinterId,
};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::SchedulerConfig;
use crate::dispatcher::{CancelOutcome, Dispatcher};
use crate::printer::{Printer, PrinterHandle, PrinterTiming};
use crate::update_channel::{UpdateReceiver, UpdateSender, update_channel};

const SOURCE: &str = "Host";

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Unknown printer {0}")]
    UnknownPrinter(PrinterId),
    #[error("Rejected submission: {0}")]
    InvalidSubmission(#[from] PrintJobError),
}

struct HostedPrinter {
    handle: PrinterHandle,
    task: JoinHandle<()>,
}

/// Owns the dispatcher and the printer tasks and exposes the commands a front end may issue.
///
/// Front ends observe results only through the [`UpdateReceiver`] returned by [`PrintHost::new`].
pub struct PrintHost {
    dispatcher: Arc<Dispatcher>,
    updates: UpdateSender,
    timing: PrinterTiming,
    next_printer_id: u32,
    printers: BTreeMap<PrinterId, HostedPrinter>,
    retiring: Vec<JoinHandle<()>>,
}

impl PrintHost {
    pub fn new(config: &SchedulerConfig) -> (Self, UpdateReceiver) {
        Self::with_parts(config.policy, PrinterTiming::from(&config.timing))
    }

    pub fn with_parts(
        thresholds: PolicyThresholds,
        timing: PrinterTiming,
    ) -> (Self, UpdateReceiver) {
        let (updates, receiver) = update_channel();
        let dispatcher = Arc::new(Dispatcher::new(thresholds, updates.clone()));
        let host = Self {
            dispatcher,
            updates,
            timing,
            next_printer_id: 1,
            printers: BTreeMap::new(),
            retiring: Vec::new(),
        };
        (host, receiver)
    }

    /// Validates and enqueues a new job.
    pub async fn submit_job(&self, name: &str, pages: u32) -> Result<JobId, HostError> {
        let job = PrintJob::new(name, pages)?;
        let job_id = job.id();
        self.dispatcher.submit(job).await;
        Ok(job_id)
    }

    pub async fn add_printer(&mut self, name: &str) -> PrinterId {
        let printer_id = PrinterId(self.next_printer_id);
        self.next_printer_id += 1;

        self.updates.info(
            SOURCE,
            format!("Connecting to '{}' (ID: {})...", name, printer_id),
        );
        let (printer, handle) = Printer::new(
            printer_id,
            name,
            self.dispatcher.clone(),
            self.updates.clone(),
            self.timing,
        );
        self.dispatcher.register_printer(handle.clone()).await;
        let task = tokio::spawn(printer.run());
        self.printers.insert(printer_id, HostedPrinter { handle, task });
        printer_id
    }

    /// Starts a graceful shutdown of one printer. Its job, if any, goes back to the queue.
    pub async fn remove_printer(&mut self, printer_id: PrinterId) -> Result<(), HostError> {
        let hosted = self
            .printers
            .remove(&printer_id)
            .ok_or(HostError::UnknownPrinter(printer_id))?;
        if !self.dispatcher.unregister_printer(printer_id).await {
            hosted.handle.request_shutdown();
        }
        self.retiring.push(hosted.task);
        Ok(())
    }

    pub fn toggle_pause(&self, printer_id: PrinterId) -> Result<(), HostError> {
        let hosted = self
            .printers
            .get(&printer_id)
            .ok_or(HostError::UnknownPrinter(printer_id))?;
        if hosted.handle.toggle_pause() {
            Ok(())
        } else {
            Err(HostError::UnknownPrinter(printer_id))
        }
    }

    pub async fn cancel_job(&self, job_id: JobId) -> CancelOutcome {
        self.dispatcher.cancel(job_id).await
    }

    pub async fn queue_snapshot(&self) -> Vec<JobSnapshot> {
        self.dispatcher.queue_snapshot().await
    }

    pub async fn policy(&self) -> Policy {
        self.dispatcher.policy().await
    }

    pub fn printers(&self) -> Vec<(PrinterId, String)> {
        self.printers
            .iter()
            .map(|(id, hosted)| (*id, hosted.handle.name().to_string()))
            .collect()
    }

    /// Stops every printer and waits for their tasks to finish.
    pub async fn shutdown(mut self) {
        self.updates.info(SOURCE, "Shutting down all printers...");
        let ids: Vec<PrinterId> = self.printers.keys().copied().collect();
        for printer_id in ids {
            if let Err(e) = self.remove_printer(printer_id).await {
                tracing::warn!("Shutdown: {}", e);
            }
        }
        for task in self.retiring.drain(..) {
            if let Err(e) = task.await {
                tracing::error!("Printer task ended abnormally: {}", e);
            }
        }
    }
}
