use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use log::{debug, info};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Semaphore;
use crate::config::{BackendKind, HardwareSettings, SoftwareSettings, TranscodeConfig};
use crate::error::EncodeError;

/// Lines of ffmpeg stderr kept for the error ledger
const STDERR_TAIL_LINES: usize = 5;

/// Containers that need the hvc1 tag for HEVC to play back on Apple devices
const HVC1_TAGGED_CONTAINERS: &[&str] = &["mp4", "mov"];

/// Produces an HEVC file at `dest` from `source`, copying audio unchanged.
///
/// On failure the destination may hold a partial file; callers treat it as absent.
#[async_trait]
pub trait Encoder: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Wall-clock time of a successful encode
    async fn encode(&self, source: &Path, dest: &Path) -> Result<Duration, EncodeError>;
}

/// CPU encode through ffmpeg's libx265
#[derive(Debug, Clone)]
pub struct SoftwareEncoder {
    pub ffmpeg_bin: PathBuf,
    pub settings: SoftwareSettings,
}

impl SoftwareEncoder {
    pub fn new(ffmpeg_bin: impl Into<PathBuf>, settings: SoftwareSettings) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            settings,
        }
    }

    pub fn build_args(&self, source: &Path, dest: &Path) -> Result<Vec<String>, EncodeError> {
        let mut args = input_args(source)?;

        args.push("-c:v".to_string());
        args.push(self.settings.codec.clone());
        args.push("-crf".to_string());
        args.push(self.settings.crf.to_string());
        args.push("-preset".to_string());
        args.push(self.settings.preset.clone());
        // Use every core
        args.push("-threads".to_string());
        args.push("0".to_string());

        output_args(&mut args, dest)?;
        Ok(args)
    }
}

#[async_trait]
impl Encoder for SoftwareEncoder {
    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    async fn encode(&self, source: &Path, dest: &Path) -> Result<Duration, EncodeError> {
        let args = self.build_args(source, dest)?;
        run_ffmpeg(&self.ffmpeg_bin, args, self.kind()).await
    }
}

/// GPU encode through an ffmpeg hardware encoder. Encodes are gated by a semaphore
/// sized to the number of encoder engines on the device.
#[derive(Debug, Clone)]
pub struct HardwareEncoder {
    pub ffmpeg_bin: PathBuf,
    pub settings: HardwareSettings,
    engines: Arc<Semaphore>,
}

impl HardwareEncoder {
    pub fn new(ffmpeg_bin: impl Into<PathBuf>, settings: HardwareSettings) -> Self {
        let engines = Arc::new(Semaphore::new(settings.engines.max(1)));
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            settings,
            engines,
        }
    }

    pub fn build_args(&self, source: &Path, dest: &Path) -> Result<Vec<String>, EncodeError> {
        let codec = self.settings.codec.as_str();
        let mut args = Vec::new();

        // VAAPI needs the device opened before the input
        if codec.ends_with("_vaapi") {
            args.push("-vaapi_device".to_string());
            args.push("/dev/dri/renderD128".to_string());
        }

        args.extend(input_args(source)?);

        if codec.ends_with("_vaapi") {
            args.push("-vf".to_string());
            args.push("format=nv12,hwupload".to_string());
        }

        args.push("-c:v".to_string());
        args.push(codec.to_string());

        let quality = self.settings.cq.to_string();
        if codec.ends_with("_nvenc") {
            args.extend(["-preset", self.settings.preset.as_str(), "-tune", "hq", "-rc", "vbr", "-cq", quality.as_str(), "-b:v", "0"].map(String::from));
        } else if codec.ends_with("_qsv") {
            args.extend(["-preset", self.settings.preset.as_str(), "-global_quality", quality.as_str()].map(String::from));
        } else if codec.ends_with("_vaapi") {
            args.extend(["-qp", quality.as_str()].map(String::from));
        } else if codec.ends_with("_videotoolbox") {
            args.extend(["-q:v", quality.as_str()].map(String::from));
        } else {
            args.extend(["-preset", self.settings.preset.as_str(), "-cq", quality.as_str()].map(String::from));
        }

        output_args(&mut args, dest)?;
        Ok(args)
    }
}

#[async_trait]
impl Encoder for HardwareEncoder {
    fn kind(&self) -> BackendKind {
        BackendKind::Hardware
    }

    async fn encode(&self, source: &Path, dest: &Path) -> Result<Duration, EncodeError> {
        let args = self.build_args(source, dest)?;
        let _engine = self
            .engines
            .acquire()
            .await
            .map_err(|e| EncodeError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        debug!("Acquired hardware encoder engine for {}", source.display());
        run_ffmpeg(&self.ffmpeg_bin, args, self.kind()).await
    }
}

/// Build the backend chosen for this run
pub fn build_encoder(cfg: &TranscodeConfig) -> Arc<dyn Encoder> {
    match cfg.backend {
        BackendKind::Software => Arc::new(SoftwareEncoder::new(&cfg.ffmpeg_bin, cfg.software.clone())),
        BackendKind::Hardware => Arc::new(HardwareEncoder::new(&cfg.ffmpeg_bin, cfg.hardware.clone())),
    }
}

fn path_arg(path: &Path) -> Result<String, EncodeError> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| EncodeError::TextEncoding(path.to_path_buf()))
}

fn input_args(source: &Path) -> Result<Vec<String>, EncodeError> {
    Ok(vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        path_arg(source)?,
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "0:a?".to_string(),
    ])
}

fn output_args(args: &mut Vec<String>, dest: &Path) -> Result<(), EncodeError> {
    let ext = dest
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if HVC1_TAGGED_CONTAINERS.contains(&ext.as_str()) {
        args.push("-tag:v".to_string());
        args.push("hvc1".to_string());
    }

    // Audio untouched
    args.push("-c:a".to_string());
    args.push("copy".to_string());

    args.push(path_arg(dest)?);
    Ok(())
}

/// Last `keep` lines of a stream, read to EOF. Lines that aren't UTF-8 are kept lossily.
async fn stderr_tail<R: AsyncBufRead + Unpin>(mut reader: R, keep: usize) -> Vec<String> {
    let mut tail: Vec<String> = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if tail.len() == keep {
                    tail.remove(0);
                }
                tail.push(line);
            }
            Err(e) => {
                debug!("Stopped reading ffmpeg stderr: {}", e);
                break;
            }
        }
    }
    tail
}

/// Run ffmpeg to completion, keeping the tail of stderr for failure reports
async fn run_ffmpeg(ffmpeg_bin: &Path, args: Vec<String>, backend: BackendKind) -> Result<Duration, EncodeError> {
    debug!("Executing {} encode: {} {}", backend.as_str(), ffmpeg_bin.display(), args.join(" "));

    let start = Instant::now();
    let mut child = Command::new(ffmpeg_bin)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| EncodeError::Spawn {
            program: ffmpeg_bin.display().to_string(),
            source,
        })?;

    let tail = match child.stderr.take() {
        Some(stderr) => stderr_tail(BufReader::new(stderr), STDERR_TAIL_LINES).await,
        None => Vec::new(),
    };

    let status = child.wait().await?;
    let elapsed = start.elapsed();

    if !status.success() {
        return Err(EncodeError::NonZeroExit {
            backend: backend.as_str(),
            code: status.code().unwrap_or(-1),
            stderr_tail: tail.join(" | "),
        });
    }

    info!("{} encode finished in {:.2}s", backend.as_str(), elapsed.as_secs_f64());
    Ok(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(args: &[String], flag: &str) -> Option<usize> {
        args.iter().position(|a| a == flag)
    }

    fn value_after(args: &[String], flag: &str) -> Option<String> {
        position(args, flag).and_then(|i| args.get(i + 1).cloned())
    }

    #[test]
    fn test_software_args_copy_audio_and_use_libx265() {
        let enc = SoftwareEncoder::new("ffmpeg", SoftwareSettings::default());
        let args = enc
            .build_args(Path::new("/v/clip.mov"), Path::new("/v/clip.hevcify-tmp.mov"))
            .unwrap();

        assert_eq!(value_after(&args, "-i").as_deref(), Some("/v/clip.mov"));
        assert_eq!(value_after(&args, "-c:v").as_deref(), Some("libx265"));
        assert_eq!(value_after(&args, "-crf").as_deref(), Some("18"));
        assert_eq!(value_after(&args, "-c:a").as_deref(), Some("copy"));
        assert_eq!(value_after(&args, "-tag:v").as_deref(), Some("hvc1"));
        assert_eq!(args.last().map(String::as_str), Some("/v/clip.hevcify-tmp.mov"));
    }

    #[test]
    fn test_mkv_output_has_no_hvc1_tag() {
        let enc = SoftwareEncoder::new("ffmpeg", SoftwareSettings::default());
        let args = enc
            .build_args(Path::new("/v/a.mkv"), Path::new("/v/a.hevcify-tmp.mkv"))
            .unwrap();
        assert!(position(&args, "-tag:v").is_none());
    }

    #[test]
    fn test_nvenc_args() {
        let enc = HardwareEncoder::new("ffmpeg", HardwareSettings::default());
        let args = enc
            .build_args(Path::new("/v/a.avi"), Path::new("/v/a.hevcify-tmp.mp4"))
            .unwrap();
        assert_eq!(value_after(&args, "-c:v").as_deref(), Some("hevc_nvenc"));
        assert_eq!(value_after(&args, "-preset").as_deref(), Some("p6"));
        assert_eq!(value_after(&args, "-cq").as_deref(), Some("20"));
        assert_eq!(value_after(&args, "-c:a").as_deref(), Some("copy"));
    }

    #[test]
    fn test_vaapi_device_precedes_input() {
        let settings = HardwareSettings {
            codec: "hevc_vaapi".to_string(),
            ..Default::default()
        };
        let enc = HardwareEncoder::new("ffmpeg", settings);
        let args = enc
            .build_args(Path::new("/v/a.mkv"), Path::new("/v/a.hevcify-tmp.mkv"))
            .unwrap();
        assert!(position(&args, "-vaapi_device").unwrap() < position(&args, "-i").unwrap());
        assert_eq!(value_after(&args, "-qp").as_deref(), Some("20"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path_is_text_encoding_error() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let bad = Path::new(OsStr::from_bytes(b"/v/\xffclip.mov"));
        let enc = SoftwareEncoder::new("ffmpeg", SoftwareSettings::default());
        let err = enc.build_args(bad, Path::new("/v/out.mp4")).unwrap_err();
        assert!(matches!(err, EncodeError::TextEncoding(_)));
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_spawn_error() {
        let enc = SoftwareEncoder::new("/nonexistent/ffmpeg-hevcify", SoftwareSettings::default());
        let err = enc
            .encode(Path::new("/v/a.mov"), Path::new("/v/a.hevcify-tmp.mov"))
            .await
            .unwrap_err();
        assert!(matches!(err, EncodeError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_reported() {
        // `false` ignores its arguments and exits 1
        let enc = SoftwareEncoder::new("false", SoftwareSettings::default());
        let err = enc
            .encode(Path::new("/v/a.mov"), Path::new("/v/a.hevcify-tmp.mov"))
            .await
            .unwrap_err();
        assert!(matches!(err, EncodeError::NonZeroExit { code: 1, .. }));
    }

    #[tokio::test]
    async fn test_stderr_tail_survives_invalid_utf8() {
        let stderr: &[u8] = b"one\n\xff\xfe raw tag\nthree\nfour\nfive\nError while decoding\n";
        let tail = stderr_tail(stderr, 5).await;
        assert_eq!(tail.len(), 5);
        assert_eq!(tail[0], "\u{fffd}\u{fffd} raw tag");
        assert_eq!(tail[4], "Error while decoding");
    }

    /// Fake ffmpeg that records overlapping runs: `mkdir` is atomic, so a second
    /// concurrent run finds `busy` already present.
    #[cfg(unix)]
    fn overlap_detecting_ffmpeg(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-ffmpeg");
        let body = format!(
            "#!/bin/sh\nif ! mkdir \"{d}/busy\" 2>/dev/null; then echo x >> \"{d}/overlaps\"; sleep 0.3; exit 0; fi\nsleep 0.3\nrmdir \"{d}/busy\"\n",
            d = dir.display()
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    async fn encode_concurrently(enc: Arc<HardwareEncoder>, n: usize) -> Duration {
        let start = Instant::now();
        let mut set = tokio::task::JoinSet::new();
        for i in 0..n {
            let enc = Arc::clone(&enc);
            set.spawn(async move {
                let src = PathBuf::from(format!("/v/clip{}.mkv", i));
                let dest = PathBuf::from(format!("/v/clip{}.hevcify-tmp.mkv", i));
                enc.encode(&src, &dest).await
            });
        }
        while let Some(joined) = set.join_next().await {
            joined.unwrap().unwrap();
        }
        start.elapsed()
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_engine_serializes_hardware_encodes() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = overlap_detecting_ffmpeg(dir.path());
        let settings = HardwareSettings {
            engines: 1,
            ..Default::default()
        };
        let enc = Arc::new(HardwareEncoder::new(&ffmpeg, settings));

        let elapsed = encode_concurrently(enc, 3).await;

        assert!(!dir.path().join("overlaps").exists(), "two encodes shared the engine");
        assert!(elapsed >= Duration::from_millis(900));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_more_engines_allow_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = overlap_detecting_ffmpeg(dir.path());
        let settings = HardwareSettings {
            engines: 3,
            ..Default::default()
        };
        let enc = Arc::new(HardwareEncoder::new(&ffmpeg, settings));

        encode_concurrently(enc, 3).await;

        assert!(dir.path().join("overlaps").exists());
    }

    #[test]
    fn test_build_encoder_follows_config() {
        let cfg = TranscodeConfig {
            backend: BackendKind::Hardware,
            ..Default::default()
        };
        assert_eq!(build_encoder(&cfg).kind(), BackendKind::Hardware);
        assert_eq!(build_encoder(&TranscodeConfig::default()).kind(), BackendKind::Software);
    }
}
