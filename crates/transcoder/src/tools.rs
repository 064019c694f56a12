use std::path::Path;
use anyhow::{anyhow, Context, Result};
use log::info;
use tokio::process::Command;
use crate::config::{BackendKind, TranscodeConfig};
use crate::error::ConfigError;

/// First line of `<bin> -version`
async fn detect_version(bin: &Path) -> Result<String> {
    let output = Command::new(bin)
        .arg("-version")
        .output()
        .await
        .with_context(|| format!("Failed to execute: {}", bin.display()))?;

    if !output.status.success() {
        return Err(anyhow!("{} -version exited with {}", bin.display(), output.status));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .next()
        .map(|l| l.trim().to_string())
        .ok_or_else(|| anyhow!("Empty output from {} -version", bin.display()))
}

/// Whether `ffmpeg -encoders` output lists `encoder` as a name column
pub fn encoders_list_contains(listing: &str, encoder: &str) -> bool {
    listing
        .lines()
        .filter_map(|l| l.split_whitespace().nth(1))
        .any(|name| name == encoder)
}

async fn has_encoder(ffmpeg_bin: &Path, encoder: &str) -> Result<bool> {
    let output = Command::new(ffmpeg_bin)
        .arg("-hide_banner")
        .arg("-encoders")
        .output()
        .await
        .with_context(|| format!("Failed to query encoders at: {}", ffmpeg_bin.display()))?;

    if !output.status.success() {
        return Err(anyhow!("ffmpeg encoder query failed"));
    }
    Ok(encoders_list_contains(&String::from_utf8_lossy(&output.stdout), encoder))
}

/// Make sure the external tools this run needs are callable. Runs before any file is touched.
pub async fn verify_tools(cfg: &TranscodeConfig) -> Result<(), ConfigError> {
    let ffprobe = detect_version(&cfg.ffprobe_bin)
        .await
        .map_err(|e| ConfigError::ToolUnavailable(format!("{:#}", e)))?;
    info!("ffprobe: {}", ffprobe);

    let ffmpeg = detect_version(&cfg.ffmpeg_bin)
        .await
        .map_err(|e| ConfigError::ToolUnavailable(format!("{:#}", e)))?;
    info!("ffmpeg: {}", ffmpeg);

    let encoder = match cfg.backend {
        BackendKind::Software => cfg.software.codec.as_str(),
        BackendKind::Hardware => cfg.hardware.codec.as_str(),
    };
    let available = has_encoder(&cfg.ffmpeg_bin, encoder)
        .await
        .map_err(|e| ConfigError::ToolUnavailable(format!("{:#}", e)))?;
    if !available {
        return Err(ConfigError::ToolUnavailable(format!(
            "ffmpeg at {} has no {} encoder",
            cfg.ffmpeg_bin.display(),
            encoder
        )));
    }
    info!("🎬 Using {} encoder: {}", cfg.backend.as_str(), encoder);
    Ok(())
}
