// src/main.rs - runs a configured print scenario against simulated printers
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use printflow::config::{self, JobConfig, SchedulerConfig};
use printflow::{JobState, PrintHost, StatusBoard};
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(
    name = "printer-host",
    about = "Runs a print scheduling scenario across simulated printers."
)]
struct Cli {
    /// Path to a TOML config file (built-in demo scenario if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Give up after this many seconds even if jobs are still pending
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    /// Print every update event as a JSON line
    #[arg(long)]
    json: bool,

    /// How often to print the status board, in milliseconds
    #[arg(long, default_value_t = 2000)]
    render_every_ms: u64,

    /// Maximum log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .init();

    tracing::info!("Starting printflow printer host");

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            config::load_config(path).map_err(|e| {
                tracing::error!("Failed to load config from '{}': {}", path.display(), e);
                Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
            })?
        }
        None => {
            tracing::info!("No config given, running the built-in demo scenario");
            SchedulerConfig::demo()
        }
    };

    tracing::info!(
        "Policy thresholds: FCFS up to {} jobs, SRTF while mean remaining <= {}",
        config.policy.fcfs_max_queue_len,
        config.policy.srtf_max_mean_remaining
    );
    tracing::info!("Page interval: {} ms", config.timing.page_interval_ms);

    let (mut host, mut updates) = PrintHost::new(&config);
    for printer in &config.printers {
        host.add_printer(&printer.name).await;
    }

    let mut jobs: Vec<JobConfig> = config.jobs.clone();
    jobs.sort_by_key(|job| job.submit_after_ms);

    let start = Instant::now();
    let deadline = start + Duration::from_secs(cli.timeout_secs);
    let render_every = Duration::from_millis(cli.render_every_ms);
    let mut last_render = start;
    let mut board = StatusBoard::new();
    let mut next_job = 0;
    let mut submitted = 0;

    let mut drain = tokio::time::interval(Duration::from_millis(config.timing.drain_interval_ms));
    drain.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        drain.tick().await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        while let Some(job) = jobs.get(next_job).filter(|job| job.submit_after_ms <= elapsed_ms) {
            match host.submit_job(&job.name, job.pages).await {
                Ok(job_id) => {
                    tracing::debug!("Submitted {} as {}", job.name, job_id);
                    submitted += 1;
                }
                Err(e) => tracing::warn!("{}", e),
            }
            next_job += 1;
        }

        for event in updates.drain() {
            if cli.json {
                println!("{}", serde_json::to_string(&event)?);
            }
            board.apply(event);
        }

        if !cli.json && last_render.elapsed() >= render_every {
            println!("{}", board.render());
            last_render = Instant::now();
        }

        if next_job == jobs.len() && board.finished().len() >= submitted {
            tracing::info!("All {} submitted jobs finished", submitted);
            break;
        }
        if Instant::now() >= deadline {
            tracing::warn!("Timed out after {} s with jobs still pending", cli.timeout_secs);
            break;
        }
    }

    host.shutdown().await;
    for event in updates.drain() {
        if cli.json {
            println!("{}", serde_json::to_string(&event)?);
        }
        board.apply(event);
    }

    if !cli.json {
        println!("{}", board.render());
    }
    tracing::info!(
        "Summary: {} completed, {} canceled, {} still queued",
        board.count_finished(JobState::Completed),
        board.count_finished(JobState::Canceled),
        board.queue().len()
    );
    Ok(())
}
