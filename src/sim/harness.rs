//! Randomized stress run: many printers, random jobs, random pauses and cancels,
//! with scheduler invariants checked against the update stream.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use printflow::config::{self, SchedulerConfig};
use printflow::{JobId, JobSnapshot, JobState, PrintHost, PrinterId, PrinterState, UpdateEvent};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

/// Simulation Harness CLI
#[derive(Parser, Debug)]
#[command(name = "sim-harness", about = "Randomized scheduler stress run with invariant checks.")]
struct Cli {
    /// Path to a TOML config file for policy thresholds (timing is overridden below)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of printers to connect
    #[arg(long, default_value_t = 4)]
    printers: usize,

    /// Number of jobs to submit
    #[arg(long, default_value_t = 40)]
    jobs: usize,

    /// Largest page count for a generated job
    #[arg(long, default_value_t = 60)]
    max_pages: u32,

    /// Simulated time per page, in milliseconds
    #[arg(long, default_value_t = 5)]
    page_interval_ms: u64,

    /// Probability of canceling a random earlier job after each submission
    #[arg(long, default_value_t = 0.1, value_parser = parse_rate)]
    cancel_rate: f64,

    /// Probability of toggling pause on a random printer after each submission
    #[arg(long, default_value_t = 0.05, value_parser = parse_rate)]
    pause_rate: f64,

    /// RNG seed (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,
}

/// Parses a probability in `[0, 1]`.
fn parse_rate(value: &str) -> Result<f64, String> {
    let rate: f64 = value.parse().map_err(|e| format!("'{}' is not a number: {}", value, e))?;
    if (0.0..=1.0).contains(&rate) {
        Ok(rate)
    } else {
        Err(format!("{} is not between 0 and 1", rate))
    }
}

/// Checks the update stream against the scheduler's invariants.
#[derive(Debug, Default)]
struct InvariantChecker {
    attached: HashMap<PrinterId, JobId>,
    progress: HashMap<JobId, u32>,
    finished: HashMap<JobId, JobState>,
    violations: Vec<String>,
    events: usize,
}

impl InvariantChecker {
    fn observe(&mut self, event: &UpdateEvent) {
        self.events += 1;
        match event {
            UpdateEvent::QueueSnapshot(queue) => {
                for job in queue {
                    self.check_job(job);
                    if self.finished.contains_key(&job.id) {
                        self.violate(format!("finished job {} is back in the queue", job.id));
                    }
                }
            }
            UpdateEvent::PrinterStatus(status) => {
                match &status.job {
                    Some(job) => {
                        self.check_job(job);
                        let holder = self
                            .attached
                            .iter()
                            .find(|(printer, id)| **printer != status.printer_id && **id == job.id)
                            .map(|(printer, _)| *printer);
                        if let Some(other) = holder {
                            self.violate(format!(
                                "job {} reported on printers {} and {}",
                                job.id, other, status.printer_id
                            ));
                        }
                        self.attached.insert(status.printer_id, job.id);
                    }
                    None => {
                        self.attached.remove(&status.printer_id);
                    }
                }
                if status.state == PrinterState::Offline && status.job.is_some() {
                    let printer = status.printer_id;
                    self.violate(format!("printer {} went offline holding a job", printer));
                }
            }
            UpdateEvent::JobFinished { job, .. } => {
                self.check_job(job);
                if job.state == JobState::Completed && job.remaining_pages != 0 {
                    let left = job.remaining_pages;
                    self.violate(format!("job {} completed with {} pages left", job.id, left));
                }
                if !job.state.is_terminal() {
                    let state = job.state;
                    self.violate(format!("job {} reported finished in state {}", job.id, state));
                }
                if let Some(previous) = self.finished.insert(job.id, job.state) {
                    self.violate(format!(
                        "job {} finished twice ({} then {})",
                        job.id, previous, job.state
                    ));
                }
            }
            UpdateEvent::Log(_) | UpdateEvent::AlgorithmChanged(_) => {}
        }
    }

    fn check_job(&mut self, job: &JobSnapshot) {
        if job.completed_pages + job.remaining_pages != job.total_pages {
            self.violate(format!(
                "job {} pages do not add up: {} + {} != {}",
                job.id, job.completed_pages, job.remaining_pages, job.total_pages
            ));
        }
        let seen = self.progress.entry(job.id).or_insert(0);
        if job.completed_pages < *seen {
            let message = format!(
                "job {} progress went backwards ({} -> {})",
                job.id, *seen, job.completed_pages
            );
            self.violate(message);
        } else {
            *seen = job.completed_pages;
        }
    }

    fn violate(&mut self, message: String) {
        tracing::error!("INVARIANT VIOLATION: {}", message);
        self.violations.push(message);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let mut config = match &cli.config {
        Some(path) => match config::load_config(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load config: {e}");
                std::process::exit(1);
            }
        },
        None => SchedulerConfig::default(),
    };
    config.timing.page_interval_ms = cli.page_interval_ms.max(1);
    config.timing.idle_poll_ms = (cli.page_interval_ms / 2).max(1);
    config.timing.pause_poll_ms = cli.page_interval_ms.max(1);

    let seed = cli.seed.unwrap_or_else(|| rand::rng().random());
    let mut rng = StdRng::seed_from_u64(seed);
    println!(
        "Running harness: {} printers, {} jobs, seed {}",
        cli.printers, cli.jobs, seed
    );

    let (mut host, mut updates) = PrintHost::new(&config);
    let mut printer_ids = Vec::new();
    for i in 0..cli.printers {
        printer_ids.push(host.add_printer(&format!("Printer {}", i + 1)).await);
    }

    let mut checker = InvariantChecker::default();
    let mut submitted: Vec<JobId> = Vec::new();
    let mut paused: HashSet<PrinterId> = HashSet::new();
    let mut cancels = 0usize;

    for i in 0..cli.jobs {
        let pages = rng.random_range(1..=cli.max_pages.max(1));
        match host.submit_job(&format!("job-{:03}.pdf", i), pages).await {
            Ok(job_id) => submitted.push(job_id),
            Err(e) => checker.violate(format!("valid submission rejected: {}", e)),
        }

        if !submitted.is_empty() && rng.random_bool(cli.cancel_rate) {
            let target = submitted[rng.random_range(0..submitted.len())];
            let outcome = host.cancel_job(target).await;
            tracing::info!("cancel {} -> {:?}", target, outcome);
            cancels += 1;
        }
        if !printer_ids.is_empty() && rng.random_bool(cli.pause_rate) {
            let printer = printer_ids[rng.random_range(0..printer_ids.len())];
            if host.toggle_pause(printer).is_ok() && !paused.remove(&printer) {
                paused.insert(printer);
            }
        }

        let gap = rng.random_range(0..=cli.page_interval_ms.saturating_mul(3));
        tokio::time::sleep(Duration::from_millis(gap)).await;
        for event in updates.drain() {
            checker.observe(&event);
        }
    }

    for printer in paused.drain() {
        if let Err(e) = host.toggle_pause(printer) {
            checker.violate(format!("resume failed: {}", e));
        }
    }

    let deadline = Instant::now() + Duration::from_secs(cli.timeout_secs);
    let mut timed_out = false;
    while checker.finished.len() < submitted.len() {
        match tokio::time::timeout_at(deadline, updates.recv()).await {
            Ok(Some(event)) => checker.observe(&event),
            Ok(None) => break,
            Err(_) => {
                timed_out = true;
                break;
            }
        }
    }

    host.shutdown().await;
    for event in updates.drain() {
        checker.observe(&event);
    }

    if timed_out {
        checker.violate(format!(
            "timed out with {} of {} jobs unfinished",
            submitted.len() - checker.finished.len(),
            submitted.len()
        ));
    }
    for job_id in &submitted {
        if !checker.finished.contains_key(job_id) && !timed_out {
            checker.violate(format!("job {} never finished", job_id));
        }
    }

    let count = |wanted: JobState| {
        checker.finished.values().filter(|state| **state == wanted).count()
    };
    let completed = count(JobState::Completed);
    let canceled = count(JobState::Canceled);
    println!(
        "Observed {} events: {} completed, {} canceled ({} cancel requests)",
        checker.events, completed, canceled, cancels
    );

    if checker.violations.is_empty() {
        println!("All invariants held.");
    } else {
        println!("{} invariant violations:", checker.violations.len());
        for violation in &checker.violations {
            println!("  - {}", violation);
        }
        std::process::exit(1);
    }
}
