use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::error::ConfigError;

/// Video extensions recognized by the scanner (lower-case, no leading dot)
pub const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4", "mkv", "avi", "flv", "wmv", "mpeg", "mpg"];

/// Which encoder strategy a run uses. Chosen once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Software,
    Hardware,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Software => "software",
            BackendKind::Hardware => "hardware",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "software" | "sw" | "cpu" => Ok(BackendKind::Software),
            "hardware" | "hw" | "gpu" => Ok(BackendKind::Hardware),
            other => Err(format!("unknown backend: {}", other)),
        }
    }
}

/// How the encoded output is swapped in for the original
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplaceMode {
    /// Remove the original, then rename the temp output into place
    DeleteThenRename,
    /// Move the original aside, rename the temp output into place, then drop the backup
    SafeSwap,
}

/// Settings for the CPU encoder (ffmpeg + libx265)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftwareSettings {
    pub codec: String,
    pub crf: u8,
    pub preset: String,
}

impl Default for SoftwareSettings {
    fn default() -> Self {
        Self {
            codec: "libx265".to_string(),
            crf: 18,
            preset: "medium".to_string(),
        }
    }
}

/// Settings for the GPU encoder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareSettings {
    /// ffmpeg encoder name, e.g. hevc_nvenc, hevc_qsv, hevc_vaapi
    pub codec: String,
    pub preset: String,
    /// Constant-quality value passed as -cq
    pub cq: u8,
    /// Number of independent encoder engines on the device
    pub engines: usize,
}

impl Default for HardwareSettings {
    fn default() -> Self {
        Self {
            codec: "hevc_nvenc".to_string(),
            preset: "p6".to_string(),
            cq: 20,
            engines: 1,
        }
    }
}

/// Configuration for a transcoding run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Directory tree to scan
    pub root: PathBuf,
    /// Minimum file size in MB (1 MB = 1024 * 1024 bytes)
    pub min_size_mb: f64,
    pub backend: BackendKind,
    /// Codec family files are converted into; files already in it are skipped
    pub target_codec: String,
    pub extensions: Vec<String>,
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
    pub software: SoftwareSettings,
    pub hardware: HardwareSettings,
    pub replace_mode: ReplaceMode,
    pub success_log: PathBuf,
    pub error_log: PathBuf,
    /// Concurrent jobs. 1 keeps the sequential baseline.
    pub workers: usize,
    /// Container used when the original extension can't carry HEVC
    pub default_container: String,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl TranscodeConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            root: PathBuf::from("."),
            min_size_mb: 0.0,
            backend: BackendKind::Software,
            target_codec: "hevc".to_string(),
            extensions: VIDEO_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            software: SoftwareSettings::default(),
            hardware: HardwareSettings::default(),
            replace_mode: ReplaceMode::DeleteThenRename,
            success_log: PathBuf::from("conversion_success.log"),
            error_log: PathBuf::from("conversion_errors.log"),
            workers: 1,
            default_container: "mp4".to_string(),
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            }
        }

        Ok(config)
    }

    /// Threshold in bytes
    pub fn min_bytes(&self) -> u64 {
        (self.min_size_mb * 1024.0 * 1024.0) as u64
    }

    /// Reject settings that would make the run meaningless before any file is touched
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.root.is_dir() {
            return Err(ConfigError::BadRoot(self.root.clone()));
        }
        if !self.min_size_mb.is_finite() || self.min_size_mb < 0.0 {
            return Err(ConfigError::BadThreshold(self.min_size_mb.to_string()));
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroCount("workers"));
        }
        if self.hardware.engines == 0 {
            return Err(ConfigError::ZeroCount("hardware.engines"));
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        Ok(())
    }
}

/// Parse an operator-entered threshold in MB
pub fn parse_threshold_mb(input: &str) -> Result<f64, ConfigError> {
    let value: f64 = input
        .trim()
        .parse()
        .map_err(|_| ConfigError::BadThreshold(input.trim().to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::BadThreshold(input.trim().to_string()));
    }
    Ok(value)
}
