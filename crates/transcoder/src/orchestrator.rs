use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use crate::config::{BackendKind, TranscodeConfig};
use crate::encoder::{build_encoder, Encoder};
use crate::error::JobError;
use crate::ffprobe::{FfprobeProber, Prober};
use crate::filter::EligibilityFilter;
use crate::job::{ConversionJob, ConversionResult, JobStatus, VideoFile};
use crate::ledger::LedgerRecorder;
use crate::replace::{final_path, resolve_container, temp_output_path, ReplacementManager};
use crate::scan::FileScanner;

/// Progress notifications for whoever drives the run
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Started { path: PathBuf, backend: BackendKind },
    Converted(ConversionResult),
    Failed { path: PathBuf, kind: &'static str, message: String },
}

/// Candidate set for one run
#[derive(Debug, Default)]
pub struct Plan {
    pub jobs: Vec<ConversionJob>,
    /// Probed files that were passed over, with the reason
    pub skipped: Vec<(VideoFile, String)>,
}

impl Plan {
    pub fn total_bytes(&self) -> u64 {
        self.jobs.iter().map(|j| j.source.size).sum()
    }
}

/// How a single job ended
#[derive(Debug)]
pub enum JobOutcome {
    Converted(ConversionResult),
    Failed { path: PathBuf, error: JobError },
}

/// Totals for a finished (or stopped) run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub results: Vec<ConversionResult>,
    pub failed: usize,
    /// Failures that left a temp file with no canonical file
    pub inconsistent: usize,
    /// Jobs never started because a stop was requested
    pub not_started: usize,
}

impl RunSummary {
    pub fn converted(&self) -> usize {
        self.results.len()
    }

    pub fn total_saved_bytes(&self) -> i64 {
        self.results.iter().map(|r| r.saved_bytes()).sum()
    }

    pub fn total_saved_mb(&self) -> f64 {
        self.results.iter().map(|r| r.saved_mb()).sum()
    }
}

/// Everything one run needs, passed explicitly through the pipeline
pub struct RunContext {
    pub config: TranscodeConfig,
    pub prober: Arc<dyn Prober>,
    pub encoder: Arc<dyn Encoder>,
    pub replacer: ReplacementManager,
    pub ledger: LedgerRecorder,
    stop: Arc<AtomicBool>,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl RunContext {
    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            // Receiver gone just means nobody is watching
            let _ = tx.send(event);
        }
    }
}

/// Scanner → filter → encoder → replacement → ledger
pub struct TranscodeOrchestrator {
    ctx: Arc<RunContext>,
}

impl TranscodeOrchestrator {
    pub fn new(
        config: TranscodeConfig,
        prober: Arc<dyn Prober>,
        encoder: Arc<dyn Encoder>,
        ledger: LedgerRecorder,
    ) -> Self {
        let replacer = ReplacementManager::new(config.replace_mode);
        Self {
            ctx: Arc::new(RunContext {
                config,
                prober,
                encoder,
                replacer,
                ledger,
                stop: Arc::new(AtomicBool::new(false)),
                progress: None,
            }),
        }
    }

    /// Real ffprobe, the configured encoder backend, and ledgers at the configured paths
    pub fn from_config(config: TranscodeConfig) -> Result<Self> {
        let ledger = LedgerRecorder::open(&config.success_log, &config.error_log)
            .context("Failed to open ledgers")?;
        let prober: Arc<dyn Prober> = Arc::new(FfprobeProber::new(&config.ffprobe_bin));
        let encoder = build_encoder(&config);
        Ok(Self::new(config, prober, encoder, ledger))
    }

    /// Must be called before the orchestrator is shared
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        if let Some(ctx) = Arc::get_mut(&mut self.ctx) {
            ctx.progress = Some(tx);
        }
        self
    }

    pub fn config(&self) -> &TranscodeConfig {
        &self.ctx.config
    }

    pub fn ledger(&self) -> &LedgerRecorder {
        &self.ctx.ledger
    }

    /// Setting this flag stops the run at the next job boundary
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ctx.stop)
    }

    /// Scan, probe and filter. Touches nothing on disk.
    pub async fn plan(&self) -> Result<Plan> {
        plan_jobs(&self.ctx.config, self.ctx.prober.as_ref()).await
    }

    /// Run every job to a terminal state. Per-file failures never stop the batch.
    pub async fn run(&self, jobs: Vec<ConversionJob>) -> RunSummary {
        let workers = Arc::new(Semaphore::new(self.ctx.config.workers.max(1)));
        let mut set = JoinSet::new();
        let mut summary = RunSummary::default();
        let total = jobs.len();

        for (i, job) in jobs.into_iter().enumerate() {
            let permit = match Arc::clone(&workers).acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };
            if self.ctx.stop.load(Ordering::SeqCst) {
                summary.not_started = total - i;
                info!("⏹️  Stop requested, {} job(s) not started", summary.not_started);
                break;
            }
            let ctx = Arc::clone(&self.ctx);
            set.spawn(async move {
                let _permit = permit;
                process_job(&ctx, job).await
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(JobOutcome::Converted(result)) => summary.results.push(result),
                Ok(JobOutcome::Failed { error, .. }) => {
                    summary.failed += 1;
                    if matches!(&error, JobError::Replace(e) if e.is_inconsistent()) {
                        summary.inconsistent += 1;
                    }
                }
                Err(e) => {
                    error!("Job task panicked: {}", e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Run finished: {} converted, {} failed ({} inconsistent), {:.2} MB saved",
            summary.converted(),
            summary.failed,
            summary.inconsistent,
            summary.total_saved_mb()
        );
        summary
    }
}

/// Scan, probe and filter. Touches nothing on disk, so it can run before the operator confirms.
pub async fn plan_jobs(cfg: &TranscodeConfig, prober: &dyn Prober) -> Result<Plan> {
    let min_bytes = cfg.min_bytes();
    let scanner = FileScanner::new(&cfg.root, &cfg.extensions);
    let scanned = tokio::task::spawn_blocking(move || scanner.candidates(min_bytes))
        .await
        .context("Scan task failed")?;

    let filter = EligibilityFilter::new(&cfg.target_codec, min_bytes, &cfg.extensions);
    let mut plan = Plan::default();
    let mut claimed: HashSet<PathBuf> = HashSet::new();

    for file in scanned {
        let codec = prober.probe_codec(&file.path).await;
        let video = VideoFile {
            path: file.path,
            size: file.size,
            extension: file.extension,
            codec,
        };

        if let Some(reason) = filter.skip_reason(&video) {
            debug!("Skipping {}: {}", video.path.display(), reason);
            plan.skipped.push((video, reason));
            continue;
        }

        let container = resolve_container(&video.extension, &cfg.default_container);
        let temp = temp_output_path(&video.path, &container);
        let target = final_path(&video.path, &container);

        if target != video.path && target.exists() {
            let reason = format!("output path already exists: {}", target.display());
            warn!("Skipping {}: {}", video.path.display(), reason);
            plan.skipped.push((video, reason));
            continue;
        }
        // Two sources sharing a stem would share a temp and final path
        if !claimed.insert(target.clone()) {
            let reason = format!("output path claimed by another file: {}", target.display());
            warn!("Skipping {}: {}", video.path.display(), reason);
            plan.skipped.push((video, reason));
            continue;
        }

        info!("Candidate: {} ({:.2} MB, {})", video.path.display(), video.size_mb(), video.codec);
        plan.jobs.push(ConversionJob::new(video, cfg.backend, temp, target));
    }

    info!("Plan: {} job(s), {} skipped", plan.jobs.len(), plan.skipped.len());
    Ok(plan)
}

fn fail(ctx: &RunContext, job: &mut ConversionJob, status: JobStatus, error: JobError) -> JobOutcome {
    job.advance(status);
    let path = job.source.path.clone();
    let message = error.to_string();
    error!("❌ Job {}: {} failed: {}", job.id, path.display(), message);
    if let Err(e) = ctx.ledger.record_error(error.kind(), &path, &message) {
        error!("Job {}: could not write error ledger: {:#}", job.id, e);
    }
    ctx.emit(ProgressEvent::Failed {
        path: path.clone(),
        kind: error.kind(),
        message,
    });
    JobOutcome::Failed { path, error }
}

/// Drive one job from Eligible to a terminal state
pub async fn process_job(ctx: &RunContext, mut job: ConversionJob) -> JobOutcome {
    let source = job.source.path.clone();
    let temp = job.temp_output.clone();

    // The scan snapshot may be stale by now
    if !source.is_file() {
        job.advance(JobStatus::Encoding);
        return fail(ctx, &mut job, JobStatus::EncodeFailed, JobError::SourceMissing(source));
    }
    if temp.exists() {
        warn!("Job {}: removing leftover temp output {}", job.id, temp.display());
        std::fs::remove_file(&temp).ok();
    }

    info!("Job {}: converting {} -> {}", job.id, source.display(), job.final_path.display());
    ctx.emit(ProgressEvent::Started {
        path: source.clone(),
        backend: job.backend,
    });
    job.advance(JobStatus::Encoding);

    let elapsed = match ctx.encoder.encode(&source, &temp).await {
        Ok(elapsed) => elapsed,
        Err(e) => {
            // Partial output is never trusted
            if temp.exists() {
                std::fs::remove_file(&temp).ok();
                info!("Job {}: 🗑️  Deleted partial output {}", job.id, temp.display());
            }
            return fail(ctx, &mut job, JobStatus::EncodeFailed, e.into());
        }
    };
    job.advance(JobStatus::Encoded);
    info!("Job {}: encoded in {:.2}s", job.id, elapsed.as_secs_f64());

    let replacement = match ctx.replacer.replace(&source, &temp, &job.final_path) {
        Ok(r) => r,
        Err(e) => {
            if !e.is_inconsistent() && temp.exists() {
                std::fs::remove_file(&temp).ok();
            }
            return fail(ctx, &mut job, JobStatus::ReplaceFailed, e.into());
        }
    };
    job.advance(JobStatus::Replaced);

    let result = ConversionResult {
        final_path: job.final_path.clone(),
        elapsed_secs: elapsed.as_secs_f64(),
        original_bytes: replacement.original_bytes,
        new_bytes: replacement.new_bytes,
        backend: job.backend,
        codec_before: job.source.codec.clone(),
        finished_at: Utc::now(),
    };

    match ctx.ledger.record_success(&result) {
        Ok(()) => job.advance(JobStatus::Logged),
        Err(e) => error!("Job {}: replaced but could not write success ledger: {:#}", job.id, e),
    }

    info!(
        "✅ Job {}: saved {:.2} MB ({:.2}%) for {}",
        job.id,
        result.saved_mb(),
        result.saved_percent(),
        result.final_path.display()
    );
    ctx.emit(ProgressEvent::Converted(result.clone()));
    JobOutcome::Converted(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs::{self, File};
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;
    use async_trait::async_trait;
    use crate::config::ReplaceMode;
    use crate::error::{EncodeError, ProbeError};
    use crate::ffprobe::ProbeReport;
    use crate::job::Codec;
    use crate::ledger::read_success_log;

    const MB: u64 = 1024 * 1024;

    /// Codec by file name; anything not listed fails to probe
    struct FakeProber {
        codecs: HashMap<String, String>,
    }

    #[async_trait]
    impl Prober for FakeProber {
        async fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            match self.codecs.get(&name) {
                Some(c) => Ok(ProbeReport {
                    codec: Codec::Known(c.clone()),
                    duration_secs: Some(60.0),
                }),
                None => Err(ProbeError::NoVideoStream {
                    path: path.to_path_buf(),
                }),
            }
        }
    }

    /// Writes a sparse output of a fixed size per source name; names in `fail` exit non-zero
    struct FakeEncoder {
        output_sizes: HashMap<String, u64>,
        fail: Vec<String>,
        calls: AtomicUsize,
        seen: Mutex<Vec<PathBuf>>,
    }

    impl FakeEncoder {
        fn new(output_sizes: &[(&str, u64)], fail: &[&str]) -> Self {
            Self {
                output_sizes: output_sizes.iter().map(|(n, s)| (n.to_string(), *s)).collect(),
                fail: fail.iter().map(|s| s.to_string()).collect(),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Encoder for FakeEncoder {
        fn kind(&self) -> BackendKind {
            BackendKind::Software
        }

        async fn encode(&self, source: &Path, dest: &Path) -> Result<Duration, EncodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(source.to_path_buf());
            let name = source.file_name().unwrap().to_string_lossy().to_string();
            if self.fail.contains(&name) {
                // Leave a partial file behind like a crashed encoder would
                fs::write(dest, b"partial").unwrap();
                return Err(EncodeError::NonZeroExit {
                    backend: "software",
                    code: 1,
                    stderr_tail: "Conversion failed!".to_string(),
                });
            }
            let size = self.output_sizes.get(&name).copied().unwrap_or(0);
            File::create(dest)?.set_len(size)?;
            Ok(Duration::from_millis(1500))
        }
    }

    fn sparse(path: &Path, size: u64) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap().set_len(size).unwrap();
    }

    struct Fixture {
        dir: tempfile::TempDir,
        orchestrator: TranscodeOrchestrator,
        encoder: Arc<FakeEncoder>,
    }

    impl Fixture {
        fn root(&self) -> &Path {
            self.dir.path()
        }

        fn success_log(&self) -> PathBuf {
            self.dir.path().join("logs/success.log")
        }

        fn error_lines(&self) -> usize {
            fs::read_to_string(self.dir.path().join("logs/errors.log"))
                .map(|s| s.lines().count())
                .unwrap_or(0)
        }
    }

    fn fixture(
        files: &[(&str, u64)],
        codecs: &[(&str, &str)],
        outputs: &[(&str, u64)],
        fail: &[&str],
        min_size_mb: f64,
        workers: usize,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("videos");
        fs::create_dir_all(&root).unwrap();
        for (name, size) in files {
            sparse(&root.join(name), *size);
        }
        let cfg = TranscodeConfig {
            root: root.clone(),
            min_size_mb,
            workers,
            replace_mode: ReplaceMode::DeleteThenRename,
            success_log: dir.path().join("logs/success.log"),
            error_log: dir.path().join("logs/errors.log"),
            ..Default::default()
        };
        let prober = Arc::new(FakeProber {
            codecs: codecs.iter().map(|(n, c)| (n.to_string(), c.to_string())).collect(),
        });
        let encoder = Arc::new(FakeEncoder::new(outputs, fail));
        let ledger = LedgerRecorder::open(&cfg.success_log, &cfg.error_log).unwrap();
        let orchestrator = TranscodeOrchestrator::new(cfg, prober, encoder.clone(), ledger);
        Fixture {
            dir,
            orchestrator,
            encoder,
        }
    }

    #[tokio::test]
    async fn test_h264_mov_is_converted_and_logged() {
        let fx = fixture(
            &[("holiday.mov", 500 * MB)],
            &[("holiday.mov", "h264")],
            &[("holiday.mov", 150 * MB)],
            &[],
            100.0,
            1,
        );

        let plan = fx.orchestrator.plan().await.unwrap();
        assert_eq!(plan.jobs.len(), 1);
        let summary = fx.orchestrator.run(plan.jobs).await;

        assert_eq!(summary.converted(), 1);
        assert_eq!(summary.total_saved_bytes(), (350 * MB) as i64);

        let records = read_success_log(&fx.success_log()).unwrap();
        assert_eq!(records.len(), 1);
        assert!((records[0].saved_mb - 350.0).abs() < 0.01);
        assert!((records[0].saved_percent - 70.0).abs() < 0.01);
        assert_eq!(records[0].codec, "h264");
        assert_eq!(records[0].backend, "software");

        // Same extension, so the converted file sits at the original path with the new size
        let final_path = fx.root().join("videos/holiday.mov");
        assert_eq!(fs::metadata(&final_path).unwrap().len(), 150 * MB);
        assert!(!fx.root().join("videos/holiday.hevcify-tmp.mov").exists());
    }

    #[tokio::test]
    async fn test_hevc_mp4_is_never_enqueued() {
        let fx = fixture(&[("done.mp4", 50 * MB)], &[("done.mp4", "hevc")], &[], &[], 0.0, 1);

        let plan = fx.orchestrator.plan().await.unwrap();
        assert!(plan.jobs.is_empty());
        assert_eq!(plan.skipped.len(), 1);

        let summary = fx.orchestrator.run(plan.jobs).await;
        assert_eq!(summary.converted(), 0);
        assert_eq!(fx.encoder.calls.load(Ordering::SeqCst), 0);
        assert!(read_success_log(&fx.success_log()).unwrap().is_empty());
        assert_eq!(fx.error_lines(), 0);
    }

    #[tokio::test]
    async fn test_unknown_codec_is_enqueued() {
        let fx = fixture(&[("mystery.avi", 10 * MB)], &[], &[("mystery.avi", 4 * MB)], &[], 0.0, 1);

        let plan = fx.orchestrator.plan().await.unwrap();
        assert_eq!(plan.jobs.len(), 1);
        assert_eq!(plan.jobs[0].source.codec, Codec::Unknown);

        let summary = fx.orchestrator.run(plan.jobs).await;
        assert_eq!(summary.converted(), 1);
        // avi is normalized to mp4 and the original removed
        assert!(!fx.root().join("videos/mystery.avi").exists());
        assert_eq!(fs::metadata(fx.root().join("videos/mystery.mp4")).unwrap().len(), 4 * MB);
        assert_eq!(read_success_log(&fx.success_log()).unwrap()[0].codec, "unknown");
    }

    #[tokio::test]
    async fn test_encoder_failure_leaves_original_and_continues() {
        let fx = fixture(
            &[("a_broken.mkv", 30 * MB), ("b_fine.mkv", 40 * MB)],
            &[("a_broken.mkv", "h264"), ("b_fine.mkv", "mpeg4")],
            &[("b_fine.mkv", 10 * MB)],
            &["a_broken.mkv"],
            0.0,
            1,
        );

        let plan = fx.orchestrator.plan().await.unwrap();
        assert_eq!(plan.jobs.len(), 2);
        let summary = fx.orchestrator.run(plan.jobs).await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.converted(), 1);
        assert_eq!(fx.error_lines(), 1);

        let broken = fx.root().join("videos/a_broken.mkv");
        assert_eq!(fs::metadata(&broken).unwrap().len(), 30 * MB);
        assert!(!fx.root().join("videos/a_broken.hevcify-tmp.mkv").exists());

        let records = read_success_log(&fx.success_log()).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].final_path.ends_with("b_fine.mkv"));
    }

    #[tokio::test]
    async fn test_empty_output_is_replace_failure_without_loss() {
        let fx = fixture(&[("c.mov", 20 * MB)], &[("c.mov", "h264")], &[("c.mov", 0)], &[], 0.0, 1);

        let plan = fx.orchestrator.plan().await.unwrap();
        let summary = fx.orchestrator.run(plan.jobs).await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.inconsistent, 0);
        assert_eq!(fs::metadata(fx.root().join("videos/c.mov")).unwrap().len(), 20 * MB);
        assert!(read_success_log(&fx.success_log()).unwrap().is_empty());
        let errors = fs::read_to_string(fx.root().join("logs/errors.log")).unwrap();
        assert!(errors.contains("\treplace\t"));
    }

    #[tokio::test]
    async fn test_threshold_above_every_file_means_empty_run() {
        let fx = fixture(
            &[("a.mov", 200 * MB), ("b.mp4", 999 * MB)],
            &[("a.mov", "h264"), ("b.mp4", "h264")],
            &[],
            &[],
            1000.0,
            1,
        );

        let plan = fx.orchestrator.plan().await.unwrap();
        assert!(plan.jobs.is_empty());
        let summary = fx.orchestrator.run(plan.jobs).await;
        assert_eq!(summary.total_saved_bytes(), 0);
        assert_eq!(fx.encoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_plan_is_idempotent() {
        let fx = fixture(
            &[("a.mov", 5 * MB), ("sub/b.wmv", 6 * MB), ("sub/c.mp4", 7 * MB)],
            &[("a.mov", "h264"), ("c.mp4", "hevc")],
            &[],
            &[],
            0.0,
            1,
        );

        let first: Vec<PathBuf> = fx.orchestrator.plan().await.unwrap().jobs.into_iter().map(|j| j.source.path).collect();
        let second: Vec<PathBuf> = fx.orchestrator.plan().await.unwrap().jobs.into_iter().map(|j| j.source.path).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn test_colliding_outputs_are_not_double_enqueued() {
        let fx = fixture(
            &[("clip.avi", 5 * MB), ("clip.wmv", 6 * MB)],
            &[("clip.avi", "mpeg4"), ("clip.wmv", "wmv3")],
            &[],
            &[],
            0.0,
            1,
        );

        let plan = fx.orchestrator.plan().await.unwrap();
        assert_eq!(plan.jobs.len(), 1);
        assert_eq!(plan.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_accounting_matches_ledger() {
        let fx = fixture(
            &[("a.mov", 100 * MB), ("b.mkv", 80 * MB), ("c.mp4", 64 * MB)],
            &[("a.mov", "h264"), ("b.mkv", "h264"), ("c.mp4", "h264")],
            &[("a.mov", 33 * MB), ("b.mkv", 50 * MB), ("c.mp4", 70 * MB)],
            &[],
            0.0,
            3,
        );

        let plan = fx.orchestrator.plan().await.unwrap();
        let summary = fx.orchestrator.run(plan.jobs).await;
        assert_eq!(summary.converted(), 3);

        let records = read_success_log(&fx.success_log()).unwrap();
        assert_eq!(records.len(), 3);
        let logged: f64 = records.iter().map(|r| r.saved_mb).sum();
        let expected = (100.0 + 80.0 + 64.0) - (33.0 + 50.0 + 70.0);
        assert!((logged - expected).abs() < 0.05);
        assert!((summary.total_saved_mb() - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stop_before_run_starts_nothing() {
        let fx = fixture(&[("a.mov", 5 * MB)], &[("a.mov", "h264")], &[("a.mov", MB)], &[], 0.0, 1);

        let plan = fx.orchestrator.plan().await.unwrap();
        fx.orchestrator.stop_handle().store(true, Ordering::SeqCst);
        let summary = fx.orchestrator.run(plan.jobs).await;

        assert_eq!(summary.not_started, 1);
        assert_eq!(fx.encoder.calls.load(Ordering::SeqCst), 0);
        assert!(fx.root().join("videos/a.mov").exists());
    }

    #[tokio::test]
    async fn test_vanished_source_is_logged_not_encoded() {
        let fx = fixture(&[("gone.mov", 5 * MB)], &[("gone.mov", "h264")], &[], &[], 0.0, 1);

        let plan = fx.orchestrator.plan().await.unwrap();
        fs::remove_file(fx.root().join("videos/gone.mov")).unwrap();
        let summary = fx.orchestrator.run(plan.jobs).await;

        assert_eq!(summary.failed, 1);
        assert_eq!(fx.encoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.error_lines(), 1);
    }

    #[tokio::test]
    async fn test_progress_events() {
        let fx = fixture(&[("a.mov", 5 * MB)], &[("a.mov", "h264")], &[("a.mov", MB)], &[], 0.0, 1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = fx.orchestrator.with_progress(tx);

        let plan = orchestrator.plan().await.unwrap();
        orchestrator.run(plan.jobs).await;
        drop(orchestrator);

        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        assert!(matches!(events[0], ProgressEvent::Started { .. }));
        assert!(matches!(events[1], ProgressEvent::Converted(_)));
    }
}
