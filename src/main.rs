//! refreshd — scheduled refresh bot for report documents.
//!
//! Usage:
//!   refreshd refresh [PATHS...]        # refresh now (defaults to all active jobs)
//!   refreshd scheduler                 # run the trigger loop in the foreground
//!   refreshd jobs list                 # manage job definitions
//!   refreshd jobs add /data/r.xlsx --backup /data/r_bk.xlsx --at 09:00 --at 17:30

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use refreshd_core::{Job, RefreshdConfig};
use refreshd_engine::{FallbackCoordinator, Orchestrator, ShellEngine};
use refreshd_notify::{NoopNotifier, Notifier, Reporter, SmtpNotifier};
use refreshd_scheduler::{JobStore, PathLeases, SchedulerService, execute_refresh};

#[derive(Parser)]
#[command(name = "refreshd", version, about = "🔄 refreshd — scheduled report refresh bot")]
struct Cli {
    /// Config file path (default: ~/.refreshd/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Refresh documents now. With no paths, every active job runs.
    Refresh { paths: Vec<String> },
    /// Run the scheduler in the foreground.
    Scheduler,
    /// Manage job definitions.
    Jobs {
        #[command(subcommand)]
        command: JobsCommand,
    },
}

#[derive(Subcommand)]
enum JobsCommand {
    /// List configured jobs.
    List,
    /// Add or replace a job.
    Add {
        path: String,
        /// Fallback document, promoted when the primary exhausts retries
        #[arg(long)]
        backup: Option<String>,
        /// Daily trigger time (HH:MM), repeatable
        #[arg(long = "at")]
        times: Vec<String>,
    },
    /// Remove a job.
    Remove { path: String },
    /// Re-activate a job.
    Enable { path: String },
    /// Keep a job configured but never scheduled.
    Disable { path: String },
}

fn expand(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => RefreshdConfig::load_from(Path::new(&expand(path)))?,
        None => RefreshdConfig::load()?,
    };
    config.engine.capture_dir = expand(&config.engine.capture_dir);
    let store = JobStore::new(expand(&config.scheduler.jobs_path));

    match cli.command {
        Command::Jobs { command } => run_jobs(&store, command),
        Command::Refresh { paths } => {
            let (coordinator, reporter, notifier) = build_pipeline(&config)?;
            let leases = PathLeases::new();
            let explicit = if paths.is_empty() {
                None
            } else {
                Some(paths.iter().map(|p| PathBuf::from(expand(p))).collect())
            };

            let results = execute_refresh(
                &store,
                &coordinator,
                &leases,
                &reporter,
                notifier.as_ref(),
                explicit,
            )
            .await?;

            for result in &results {
                let mark = if result.status.is_ok() { "✔" } else { "❌" };
                println!(
                    "{mark} {} — {} ({:.2}s)",
                    result.job_path.display(),
                    result.status.label(),
                    result.duration_seconds
                );
                if let Some(detail) = &result.error_detail {
                    println!("   {detail}");
                }
            }
            if results.iter().any(|r| !r.status.is_ok()) {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Scheduler => {
            let (coordinator, reporter, notifier) = build_pipeline(&config)?;
            let service = SchedulerService::new(
                store,
                coordinator,
                reporter,
                notifier,
                config.scheduler.tick_secs,
            );
            service.load_and_register().await?;

            // SIGHUP re-reads the job store without a restart
            #[cfg(unix)]
            {
                use tokio::signal::unix::{SignalKind, signal};
                let svc = service.clone();
                tokio::spawn(async move {
                    let Ok(mut hup) = signal(SignalKind::hangup()) else {
                        return;
                    };
                    while hup.recv().await.is_some() {
                        if let Err(e) = svc.reload().await {
                            tracing::warn!("Reload failed: {e}");
                        }
                    }
                });
            }

            service.run_forever().await;
            Ok(())
        }
    }
}

fn build_pipeline(
    config: &RefreshdConfig,
) -> Result<(FallbackCoordinator, Reporter, Arc<dyn Notifier>)> {
    let engine = Arc::new(ShellEngine::new(config.engine.commands.clone())?);
    let orchestrator = Orchestrator::new(engine, config.engine.clone());
    let coordinator = FallbackCoordinator::new(orchestrator);
    let reporter = Reporter::new(config.mail.clone(), config.engine.capture_dir.clone());
    let notifier: Arc<dyn Notifier> = if config.mail.enabled {
        Arc::new(SmtpNotifier::new(config.mail.clone()))
    } else {
        Arc::new(NoopNotifier)
    };
    Ok((coordinator, reporter, notifier))
}

fn run_jobs(store: &JobStore, command: JobsCommand) -> Result<()> {
    match command {
        JobsCommand::List => {
            let jobs = store.load_or_empty()?;
            if jobs.is_empty() {
                println!("No jobs configured ({}).", store.path().display());
                return Ok(());
            }
            for job in jobs {
                let state = if job.active { "●" } else { "○" };
                let times: Vec<String> =
                    job.schedule_times.iter().map(|t| t.to_string()).collect();
                print!("{state} {}", job.path.display());
                if let Some(backup) = &job.backup {
                    print!("  backup: {}", backup.display());
                }
                if times.is_empty() {
                    println!("  (never fires automatically)");
                } else {
                    println!("  daily at {}", times.join(", "));
                }
            }
            Ok(())
        }
        JobsCommand::Add { path, backup, times } => {
            let mut job = Job::new(expand(&path));
            job.backup = backup.map(|b| PathBuf::from(expand(&b)));
            job.schedule_times = times
                .iter()
                .map(|t| t.parse())
                .collect::<refreshd_core::Result<_>>()?;
            store.upsert(job)?;
            println!("✅ Job saved: {path}");
            Ok(())
        }
        JobsCommand::Remove { path } => {
            if store.remove(Path::new(&expand(&path)))? {
                println!("✅ Job removed: {path}");
            } else {
                println!("⚠️  No job with path: {path}");
            }
            Ok(())
        }
        JobsCommand::Enable { path } => {
            if store.set_active(Path::new(&expand(&path)), true)? {
                println!("✅ Job enabled: {path}");
            } else {
                println!("⚠️  No job with path: {path}");
            }
            Ok(())
        }
        JobsCommand::Disable { path } => {
            if store.set_active(Path::new(&expand(&path)), false)? {
                println!("✅ Job disabled: {path}");
            } else {
                println!("⚠️  No job with path: {path}");
            }
            Ok(())
        }
    }
}
