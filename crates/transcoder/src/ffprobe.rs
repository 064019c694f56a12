use std::path::{Path, PathBuf};
use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use tokio::process::Command;
use crate::error::ProbeError;
use crate::job::Codec;

/// The parts of ffprobe's JSON we care about
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeData {
    #[serde(default)]
    pub streams: Vec<FFProbeStream>,
    pub format: Option<FFProbeFormat>,
}

/// Format-level metadata from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeFormat {
    pub format_name: Option<String>,
    /// Seconds, as ffprobe prints it ("123.456000")
    pub duration: Option<String>,
}

/// Stream-level metadata from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeStream {
    pub index: i32,
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
}

impl FFProbeData {
    /// Codec name of the first video stream
    pub fn first_video_codec(&self) -> Option<&str> {
        self.streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .and_then(|s| s.codec_name.as_deref())
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
    }
}

/// What a probe learned about one file
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub codec: Codec,
    pub duration_secs: Option<f64>,
}

impl ProbeReport {
    pub fn unknown() -> Self {
        Self {
            codec: Codec::Unknown,
            duration_secs: None,
        }
    }
}

/// Media inspection seam: the orchestrator only needs the codec, `duplicates` wants the duration too.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Inspect one file. A failure here never blocks other files.
    async fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError>;

    /// Codec of the first video stream, with every probe failure folded into [`Codec::Unknown`]
    async fn probe_codec(&self, path: &Path) -> Codec {
        match self.probe(path).await {
            Ok(report) => report.codec,
            Err(e) => {
                warn!("Codec probe failed, treating as unknown: {}", e);
                Codec::Unknown
            }
        }
    }
}

/// Runs an ffprobe binary on the host
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    pub ffprobe_bin: PathBuf,
}

impl FfprobeProber {
    pub fn new(ffprobe_bin: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_bin: ffprobe_bin.into(),
        }
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError> {
        debug!("ffprobe: {} {}", self.ffprobe_bin.display(), path.display());

        let output = Command::new(&self.ffprobe_bin)
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_streams")
            .arg("-show_format")
            .arg(path)
            .output()
            .await
            .map_err(|source| ProbeError::Spawn {
                path: path.to_path_buf(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(ProbeError::NonZeroExit {
                path: path.to_path_buf(),
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        if !stderr.trim().is_empty() {
            warn!("ffprobe diagnostics for {}: {}", path.display(), stderr.trim());
        }

        parse_probe_output(path, &output.stdout)
    }
}

/// Turn ffprobe's JSON into a report
pub fn parse_probe_output(path: &Path, stdout: &[u8]) -> Result<ProbeReport, ProbeError> {
    let data: FFProbeData = serde_json::from_slice(stdout).map_err(|e| ProbeError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let codec = data
        .first_video_codec()
        .map(|c| Codec::Known(c.to_lowercase()))
        .ok_or_else(|| ProbeError::NoVideoStream {
            path: path.to_path_buf(),
        })?;

    Ok(ProbeReport {
        codec,
        duration_secs: data.duration_secs(),
    })
}
