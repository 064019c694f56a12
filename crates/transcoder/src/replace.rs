use std::fs;
use std::path::{Path, PathBuf};
use log::{error, info, warn};
use crate::config::ReplaceMode;
use crate::error::ReplacementError;

/// Marker inserted between stem and extension of an in-progress encode
pub const TEMP_MARKER: &str = "hevcify-tmp";
/// Marker for the original moved aside during a safe swap
pub const BACKUP_MARKER: &str = "hevcify-orig";

/// Containers that carry HEVC with stream-copied audio; anything else is remuxed to the default
pub const KEEP_CONTAINERS: &[&str] = &["mp4", "mkv", "mov"];

/// True for temp outputs and swap backups left by this tool
pub fn is_work_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.contains(&format!(".{}.", TEMP_MARKER)) || n.contains(&format!(".{}.", BACKUP_MARKER)))
        .unwrap_or(false)
}

/// Sizes for accounting, captured around the swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replacement {
    pub original_bytes: u64,
    pub new_bytes: u64,
}

/// Extension the converted file ends up with
pub fn resolve_container(original_ext: &str, default_container: &str) -> String {
    let ext = original_ext.trim_start_matches('.').to_lowercase();
    if KEEP_CONTAINERS.contains(&ext.as_str()) {
        ext
    } else {
        default_container.trim_start_matches('.').to_lowercase()
    }
}

fn sibling_with(source: &Path, marker: Option<&str>, ext: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match marker {
        Some(m) => format!("{}.{}.{}", stem, m, ext),
        None => format!("{}.{}", stem, ext),
    };
    source.with_file_name(name)
}

/// `<dir>/<stem>.hevcify-tmp.<container>`
pub fn temp_output_path(source: &Path, container: &str) -> PathBuf {
    sibling_with(source, Some(TEMP_MARKER), container)
}

/// `<dir>/<stem>.<container>`
pub fn final_path(source: &Path, container: &str) -> PathBuf {
    sibling_with(source, None, container)
}

/// `<dir>/<stem>.hevcify-orig.<original ext>`
pub fn backup_path(source: &Path) -> PathBuf {
    let ext = source
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    sibling_with(source, Some(BACKUP_MARKER), &ext)
}

/// Swaps an encoded temp output in for its original
#[derive(Debug, Clone, Copy)]
pub struct ReplacementManager {
    mode: ReplaceMode,
}

impl ReplacementManager {
    pub fn new(mode: ReplaceMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ReplaceMode {
        self.mode
    }

    /// Verify the temp output, then put it at `final_path` in place of `source`.
    pub fn replace(&self, source: &Path, temp: &Path, final_path: &Path) -> Result<Replacement, ReplacementError> {
        let pre = |reason: String| ReplacementError::PreDelete {
            source_path: source.to_path_buf(),
            reason,
        };

        // (a) temp output must exist and be non-empty
        let new_bytes = match fs::metadata(temp) {
            Ok(m) if m.len() > 0 => m.len(),
            Ok(_) => {
                fs::remove_file(temp).ok();
                return Err(pre(format!("encoded output is empty: {}", temp.display())));
            }
            Err(e) => return Err(pre(format!("encoded output missing: {}: {}", temp.display(), e))),
        };

        // The scan snapshot may be stale
        let original_bytes = match fs::metadata(source) {
            Ok(m) => m.len(),
            Err(e) => {
                fs::remove_file(temp).ok();
                return Err(pre(format!("original no longer readable: {}", e)));
            }
        };

        if final_path != source && final_path.exists() {
            return Err(pre(format!("final path already taken: {}", final_path.display())));
        }

        match self.mode {
            ReplaceMode::DeleteThenRename => delete_then_rename(source, temp, final_path)?,
            ReplaceMode::SafeSwap => safe_swap(source, temp, final_path)?,
        }

        info!("🔁 Replaced {} -> {}", source.display(), final_path.display());
        Ok(Replacement {
            original_bytes,
            new_bytes,
        })
    }
}

fn post_delete(source: &Path, temp: &Path, final_path: &Path, reason: String) -> ReplacementError {
    let err = ReplacementError::PostDelete {
        source_path: source.to_path_buf(),
        temp_path: temp.to_path_buf(),
        final_path: final_path.to_path_buf(),
        reason,
    };
    error!("{}", err);
    err
}

fn delete_then_rename(source: &Path, temp: &Path, final_path: &Path) -> Result<(), ReplacementError> {
    // (b) remove the original
    fs::remove_file(source).map_err(|e| ReplacementError::PreDelete {
        source_path: source.to_path_buf(),
        reason: format!("failed to remove original: {}", e),
    })?;

    // (c) rename temp into place; from here on a failure has lost the original
    fs::rename(temp, final_path)
        .map_err(|e| post_delete(source, temp, final_path, format!("rename failed: {}", e)))?;

    if !final_path.exists() {
        return Err(post_delete(source, temp, final_path, "final file missing after rename".to_string()));
    }
    Ok(())
}

fn safe_swap(source: &Path, temp: &Path, final_path: &Path) -> Result<(), ReplacementError> {
    let backup = backup_path(source);

    fs::rename(source, &backup).map_err(|e| ReplacementError::PreDelete {
        source_path: source.to_path_buf(),
        reason: format!("failed to move original aside to {}: {}", backup.display(), e),
    })?;

    if let Err(e) = fs::rename(temp, final_path) {
        return match fs::rename(&backup, source) {
            Ok(()) => {
                warn!("Swap failed, original restored from {}", backup.display());
                Err(ReplacementError::PreDelete {
                    source_path: source.to_path_buf(),
                    reason: format!("rename of encoded output failed, original restored: {}", e),
                })
            }
            Err(restore) => Err(post_delete(
                source,
                temp,
                final_path,
                format!("rename failed ({}) and restore from {} failed ({})", e, backup.display(), restore),
            )),
        };
    }

    if let Err(e) = fs::remove_file(&backup) {
        // The new file is in place; a stray backup only costs disk space
        warn!("Could not remove backup {}: {}", backup.display(), e);
    }
    Ok(())
}
