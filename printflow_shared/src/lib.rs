// printflow_shared: job, policy and update-event types shared by the host and its front ends

pub mod api_models;
pub mod policy;
pub mod print_job;

pub use api_models::{LogEntry, LogLevel, PrinterId, PrinterState, PrinterStatus, UpdateEvent};
pub use policy::{Policy, PolicyThresholds};
pub use print_job::{JobId, JobSnapshot, JobState, PrintJob, PrintJobError};
