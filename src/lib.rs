//! printflow: a multi-printer job scheduler simulation.
//!
//! A [`dispatcher::Dispatcher`] owns the pending queue and picks FCFS, SJF or
//! SRTF from the queue's shape; each [`printer::Printer`] runs as its own tokio
//! task, pulling jobs and printing them page by page. Everything a front end
//! needs to know flows out through the [`update_channel`].

pub mod config;
pub mod dispatcher;
pub mod print_host;
pub mod printer;
pub mod status_board;
pub mod update_channel;

pub use dispatcher::{CancelOutcome, Dispatcher};
pub use print_host::{HostError, PrintHost};
pub use printer::{Printer, PrinterCommand, PrinterHandle, PrinterTiming};
pub use printflow_shared::{
    JobId, JobSnapshot, JobState, Policy, PolicyThresholds, PrintJob, PrintJobError, PrinterId,
    PrinterState, PrinterStatus, UpdateEvent,
};
pub use status_board::StatusBoard;
pub use update_channel::{UpdateReceiver, UpdateSender, update_channel};
