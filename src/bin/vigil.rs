//! # Vigil CLI - Continuous file backup
//!
//! Command-line front end for the vigil backup engine.
//!
//! ## Usage
//! ```bash
//! # Watch directories in the foreground
//! vigil watch ~/documents ~/projects --ignore '*.tmp' --ignore '**/.git/**'
//!
//! # Ask a running daemon to shut down cleanly
//! vigil stop
//!
//! # Show a file's history
//! vigil revisions ~/documents/notes.txt
//!
//! # Restore by hash prefix
//! vigil restore ~/documents/notes.txt a1b2c3
//! ```
//!
//! Set `VIGIL_PASSPHRASE` to enable at-rest encryption; pass the same
//! value again when restoring from an encrypted store.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use vigil::{DaemonController, DaemonStatus, Result, SignalProbe, Vigil, VigilBuilder};

const PASSPHRASE_ENV: &str = "VIGIL_PASSPHRASE";

/// Vigil CLI - continuous versioned backup of watched directories
#[derive(Parser)]
#[command(name = "vigil")]
#[command(version)]
#[command(about = "Watch directories and keep every version of every file")]
#[command(long_about = None)]
struct Cli {
    /// Storage directory
    #[arg(short, long, global = true, default_value = ".vigil")]
    storage: PathBuf,

    /// Key identifier used when deriving the encryption key
    #[arg(long, global = true, default_value = "default")]
    key_id: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch directories and back up changes (runs in the foreground)
    Watch {
        /// Directories to watch
        #[arg(required = true)]
        roots: Vec<PathBuf>,

        /// Glob patterns to exclude (repeatable)
        #[arg(short, long)]
        ignore: Vec<String>,

        /// Quiet period before a changed file is backed up
        #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
        idle_wait: Duration,

        /// How often the roots are polled for changes
        #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
        poll_interval: Duration,

        /// Skip files larger than this many bytes
        #[arg(long)]
        max_file_size: Option<u64>,

        /// Maximum backups running at once
        #[arg(short, long, default_value_t = 4)]
        jobs: usize,

        /// Skip the startup scan of pre-existing files
        #[arg(long)]
        no_scan: bool,
    },

    /// Ask the running daemon to shut down cleanly
    Stop,

    /// Show whether a daemon is running for this storage directory
    Status,

    /// List a file's revision history
    #[command(alias = "log")]
    Revisions {
        /// The watched file
        file: PathBuf,

        /// Limit results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Restore a revision of a file
    #[command(alias = "rs")]
    Restore {
        /// The watched file
        file: PathBuf,

        /// Hash prefix of the revision (defaults to the only revision)
        #[arg(default_value = "")]
        hash: String,

        /// Write here instead of overwriting the original
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List every file with recorded history
    #[command(alias = "ls")]
    Files,
}

fn main() {
    let cli = Cli::parse();

    let default_directive = if cli.verbose { "vigil=debug" } else { "vigil=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive)),
        )
        .init();

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Watch {
            roots,
            ignore,
            idle_wait,
            poll_interval,
            max_file_size,
            jobs,
            no_scan,
        } => handle_watch(
            &cli.storage,
            &cli.key_id,
            roots,
            ignore,
            idle_wait,
            poll_interval,
            max_file_size,
            jobs,
            no_scan,
        ),
        Commands::Stop => handle_stop(&cli.storage),
        Commands::Status => handle_status(&cli.storage),
        Commands::Revisions { file, limit } => {
            let engine = open_engine(&cli.storage, &cli.key_id)?;
            handle_revisions(&engine, &file, limit)
        }
        Commands::Restore { file, hash, output } => {
            let engine = open_engine(&cli.storage, &cli.key_id)?;
            handle_restore(&engine, &file, &hash, output.as_deref())
        }
        Commands::Files => {
            let engine = open_engine(&cli.storage, &cli.key_id)?;
            handle_files(&engine)
        }
    }
}

/// Open the engine for store-only commands (no watched roots needed)
fn open_engine(storage: &PathBuf, key_id: &str) -> Result<Vigil> {
    let mut builder = VigilBuilder::new(storage);
    if let Ok(passphrase) = std::env::var(PASSPHRASE_ENV) {
        builder = builder.encryption(key_id, passphrase);
    }
    builder.build()
}

#[allow(clippy::too_many_arguments)]
fn handle_watch(
    storage: &PathBuf,
    key_id: &str,
    roots: Vec<PathBuf>,
    ignore: Vec<String>,
    idle_wait: Duration,
    poll_interval: Duration,
    max_file_size: Option<u64>,
    jobs: usize,
    no_scan: bool,
) -> Result<()> {
    let mut builder = VigilBuilder::new(storage)
        .ignore_patterns(ignore)
        .idle_wait(idle_wait)
        .poll_interval(poll_interval)
        .max_concurrent_backups(jobs)
        .startup_scan(!no_scan);
    for root in &roots {
        builder = builder.watch(root);
    }
    if let Some(limit) = max_file_size {
        builder = builder.max_file_size(limit);
    }
    let encrypted = match std::env::var(PASSPHRASE_ENV) {
        Ok(passphrase) => {
            builder = builder.encryption(key_id, passphrase);
            true
        }
        Err(_) => false,
    };
    let engine = builder.build()?;

    println!("{}", "Starting vigil...".blue().bold());
    for root in &roots {
        println!("  Watching: {}", root.display().to_string().cyan());
    }
    println!("  Storage: {}", storage.display().to_string().cyan());
    println!(
        "  Encryption: {}",
        if encrypted { "on".green() } else { "off".yellow() }
    );
    println!(
        "  Idle wait: {}",
        humantime::format_duration(idle_wait).to_string().cyan()
    );
    println!("\nPress Ctrl-C or run {} to stop.", "vigil stop".yellow());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = sigint.recv() => {}
            }
            let _ = shutdown_tx.send(true);
        });

        engine.run_daemon(shutdown_rx).await
    })?;

    println!("{} Stopped cleanly", "✓".green().bold());
    Ok(())
}

fn handle_stop(storage: &PathBuf) -> Result<()> {
    let controller = DaemonController::new(storage.join("vigil.lock"), Arc::new(SignalProbe));
    let info = controller.stop()?;
    println!(
        "{} Asked daemon (pid {}) to stop",
        "✓".green().bold(),
        info.pid.to_string().cyan()
    );
    Ok(())
}

fn handle_status(storage: &PathBuf) -> Result<()> {
    let controller = DaemonController::new(storage.join("vigil.lock"), Arc::new(SignalProbe));
    match controller.status() {
        DaemonStatus::Running(info) => {
            println!(
                "{} Daemon running (pid {}, since {})",
                "●".green(),
                info.pid.to_string().cyan(),
                info.started_at
                    .format("%Y-%m-%d %H:%M:%S UTC")
                    .to_string()
                    .cyan()
            );
        }
        DaemonStatus::Stale(info) => {
            println!(
                "{} Stale lock from dead process {}",
                "●".yellow(),
                info.pid.to_string().yellow()
            );
        }
        DaemonStatus::NotRunning => {
            println!("{} No daemon running", "●".dimmed());
        }
    }
    Ok(())
}

fn handle_revisions(engine: &Vigil, file: &PathBuf, limit: Option<usize>) -> Result<()> {
    let revisions = engine.revisions(file)?;
    if revisions.is_empty() {
        println!("{}", "No revisions recorded for this file.".yellow());
        return Ok(());
    }

    println!(
        "{} {}",
        "Revisions of".blue().bold(),
        file.display().to_string().cyan()
    );
    let shown = limit.unwrap_or(revisions.len());
    for revision in revisions.iter().take(shown) {
        println!(
            "  {}  {}",
            revision.short_hash().yellow(),
            revision.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    if revisions.len() > shown {
        println!("  ... and {} more", revisions.len() - shown);
    }
    Ok(())
}

fn handle_restore(
    engine: &Vigil,
    file: &PathBuf,
    hash: &str,
    output: Option<&std::path::Path>,
) -> Result<()> {
    let restored = engine.restore(file, hash, output)?;
    println!(
        "{} Restored revision {} to {}",
        "✓".green().bold(),
        restored.hash[..12].yellow(),
        restored.destination.display().to_string().cyan()
    );
    Ok(())
}

fn handle_files(engine: &Vigil) -> Result<()> {
    let files = engine.files();
    if files.is_empty() {
        println!("{}", "No files backed up yet.".yellow());
        return Ok(());
    }
    println!("{}", "Backed up files:".blue().bold());
    for file in files {
        println!("  {}", file.display());
    }
    Ok(())
}
