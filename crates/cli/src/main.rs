mod prompt;
mod report;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use humansize::{format_size, BINARY};
use log::{error, info, warn};
use tokio::sync::mpsc;
use transcoder::ledger::{read_success_log, totals};
use transcoder::scan::FileScanner;
use transcoder::tools::verify_tools;
use transcoder::{
    plan_jobs, plan_recovery, BackendKind, FfprobeProber, Prober, ProgressEvent, ReplaceMode,
    TranscodeConfig, TranscodeOrchestrator,
};
use prompt::Prompter;

/// Re-encode large videos to HEVC in place
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert every eligible video under a root
    Run(RunArgs),
    /// List video files with their current codec
    Inspect {
        root: PathBuf,
    },
    /// Group video files that share a duration
    Duplicates {
        root: PathBuf,
    },
    /// Totals from the success log
    Summary {
        /// Success log to read instead of the configured one
        #[arg(long)]
        log: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Folder or drive root to convert (asked interactively if omitted)
    #[arg(long)]
    root: Option<PathBuf>,

    /// software | hardware
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Skip files smaller than this many MB
    #[arg(long)]
    min_size_mb: Option<f64>,

    /// Don't ask for confirmation
    #[arg(short, long)]
    yes: bool,

    /// Keep a backup of the original until the converted file is in place
    #[arg(long)]
    safe_swap: bool,

    /// Concurrent conversions
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    let cfg = TranscodeConfig::load_config(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Command::Run(args) => run(cfg, args).await,
        Command::Inspect { root } => inspect(&cfg, &root).await,
        Command::Duplicates { root } => duplicates(&cfg, &root).await,
        Command::Summary { log, json } => summary(&cfg, log, json),
    }
}

async fn run(mut cfg: TranscodeConfig, args: RunArgs) -> Result<()> {
    let stdin = io::stdin();
    let mut prompter = Prompter::new(stdin.lock(), io::stdout());

    let root = match args.root {
        Some(root) => root,
        None => match prompter.choose_root()? {
            Some(root) => root,
            None => return exit_without_changes(),
        },
    };
    cfg.root = root;

    cfg.backend = match args.backend {
        Some(backend) => backend,
        None => match prompter.choose_backend()? {
            Some(backend) => backend,
            None => return exit_without_changes(),
        },
    };

    cfg.min_size_mb = match args.min_size_mb {
        Some(mb) => mb,
        None => match prompter.choose_threshold()? {
            Some(mb) => mb,
            None => return exit_without_changes(),
        },
    };

    if args.safe_swap {
        cfg.replace_mode = ReplaceMode::SafeSwap;
    }
    if let Some(workers) = args.workers {
        cfg.workers = workers;
    }

    cfg.validate().context("Invalid configuration")?;
    verify_tools(&cfg).await.context("External tools unavailable")?;

    info!("Configuration:");
    info!("  Root: {}", cfg.root.display());
    info!("  Backend: {}", cfg.backend.as_str());
    info!("  Min size: {} MB", cfg.min_size_mb);
    info!("  Replace mode: {:?}", cfg.replace_mode);
    info!("  Workers: {}", cfg.workers);

    // Nothing below changes the disk until the operator has confirmed
    let recovery = plan_recovery(&cfg.root, &cfg.extensions, &cfg.default_container);
    for action in &recovery.actions {
        info!("Pending recovery: {}", action);
    }
    for orphan in &recovery.inconsistent {
        warn!("⚠️  Needs manual attention: {}", orphan.display());
    }

    let prober = FfprobeProber::new(&cfg.ffprobe_bin);
    let plan = plan_jobs(&cfg, &prober).await?;
    if plan.jobs.is_empty() && recovery.actions.is_empty() {
        println!("Nothing to convert under {}", cfg.root.display());
        return Ok(());
    }

    if !args.yes && !prompter.confirm(&plan, &recovery, &cfg.root)? {
        return exit_without_changes();
    }
    drop(prompter);

    let report = recovery
        .apply()
        .context("Failed to recover leftovers of a previous run")?;
    if !report.is_clean() {
        info!(
            "Recovery: {} stale temp(s) removed, {} backup(s) restored, {} backup(s) removed",
            report.removed_temps.len(),
            report.restored_backups.len(),
            report.removed_backups.len()
        );
    }
    if plan.jobs.is_empty() {
        println!("Nothing to convert under {}", cfg.root.display());
        return Ok(());
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let orchestrator = TranscodeOrchestrator::from_config(cfg.clone())?.with_progress(tx);

    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⏹️  Ctrl-C received, finishing the current file(s) then stopping");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let total = plan.jobs.len();
    let printer = tokio::spawn(async move {
        let mut done = 0;
        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::Started { path, backend } => {
                    println!("[{}/{}] {} ({})", done + 1, total, path.display(), backend.as_str());
                }
                ProgressEvent::Converted(result) => {
                    done += 1;
                    println!(
                        "  done in {:.1}s: {} -> {}, saved {:.2} MB ({:.2}%)",
                        result.elapsed_secs,
                        format_size(result.original_bytes, BINARY),
                        format_size(result.new_bytes, BINARY),
                        result.saved_mb(),
                        result.saved_percent()
                    );
                }
                ProgressEvent::Failed { path, kind, message } => {
                    done += 1;
                    println!("  failed ({}): {}: {}", kind, path.display(), message);
                }
            }
        }
    });

    let started = Utc::now();
    let summary = orchestrator.run(plan.jobs).await;
    // Closes the progress channel and the ledgers
    drop(orchestrator);
    if let Err(e) = printer.await {
        warn!("Progress printer stopped: {}", e);
    }

    let elapsed = Utc::now() - started;
    for line in report::run_footer(&summary) {
        println!("{}", line);
    }
    println!("Elapsed: {}", report::format_secs(elapsed.num_seconds().max(0) as u64));

    if summary.inconsistent > 0 {
        error!("❌ Run left files in an inconsistent state");
        std::process::exit(2);
    }
    Ok(())
}

fn exit_without_changes() -> Result<()> {
    println!("Exiting without changes.");
    Ok(())
}

async fn inspect(cfg: &TranscodeConfig, root: &Path) -> Result<()> {
    if !root.is_dir() {
        return Err(anyhow!("Not a directory: {}", root.display()));
    }
    let prober = FfprobeProber::new(&cfg.ffprobe_bin);
    let scanner = FileScanner::new(root, &cfg.extensions);
    let mut count = 0;
    for path in scanner.video_paths() {
        let codec = prober.probe_codec(&path).await;
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        println!("{:<8}  {:>10}  {}", codec, format_size(size, BINARY), path.display());
        count += 1;
    }
    info!("Inspected {} video file(s)", count);
    Ok(())
}

async fn duplicates(cfg: &TranscodeConfig, root: &Path) -> Result<()> {
    if !root.is_dir() {
        return Err(anyhow!("Not a directory: {}", root.display()));
    }
    let prober = FfprobeProber::new(&cfg.ffprobe_bin);
    let scanner = FileScanner::new(root, &cfg.extensions);
    let mut durations = Vec::new();
    for path in scanner.video_paths() {
        match prober.probe(&path).await {
            Ok(report) => match report.duration_secs {
                Some(secs) => durations.push((path, secs)),
                None => warn!("No duration for {}, skipped", path.display()),
            },
            Err(e) => warn!("Skipped: {}", e),
        }
    }

    let groups = report::group_by_duration(durations);
    if groups.is_empty() {
        println!("No files share a duration");
    }
    for (secs, paths) in groups {
        println!("{} ({} files)", report::format_secs(secs), paths.len());
        for p in paths {
            println!("  {}", p.display());
        }
    }
    Ok(())
}

fn summary(cfg: &TranscodeConfig, log: Option<PathBuf>, json: bool) -> Result<()> {
    let path = log.unwrap_or_else(|| cfg.success_log.clone());
    let records = read_success_log(&path)?;
    let totals = totals(&records);

    if json {
        let report = report::SummaryReport::new(path, &totals);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Success log: {}", path.display());
        println!("Conversions: {}", totals.conversions);
        println!("Original: {:.2} MB", totals.original_mb);
        println!("Converted: {:.2} MB", totals.new_mb);
        println!("Total saved: {:.2} MB", totals.saved_mb);
    }
    Ok(())
}
