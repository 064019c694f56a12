use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use walkdir::WalkDir;
use crate::replace::{resolve_container, BACKUP_MARKER, TEMP_MARKER};

/// One change recovery wants to make on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Temp output whose source is still present
    RemoveTemp { temp: PathBuf, original: PathBuf },
    /// Backup of an interrupted safe swap moved back into place
    RestoreBackup { backup: PathBuf, canonical: PathBuf },
    /// Backup of a swap that finished except for this deletion
    RemoveBackup { backup: PathBuf, converted: PathBuf },
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryAction::RemoveTemp { temp, original } => {
                write!(f, "delete stale temp {} (original {} still present)", temp.display(), original.display())
            }
            RecoveryAction::RestoreBackup { backup, canonical } => {
                write!(f, "restore {} from {}", canonical.display(), backup.display())
            }
            RecoveryAction::RemoveBackup { backup, converted } => {
                write!(f, "delete backup {} (converted {} in place)", backup.display(), converted.display())
            }
        }
    }
}

/// What recovery would do, worked out without touching anything
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryPlan {
    pub actions: Vec<RecoveryAction>,
    /// Work files with no source to fall back on; left in place for the operator
    pub inconsistent: Vec<PathBuf>,
}

/// What recovery actually did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub removed_temps: Vec<PathBuf>,
    pub restored_backups: Vec<PathBuf>,
    pub removed_backups: Vec<PathBuf>,
    pub inconsistent: Vec<PathBuf>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.removed_temps.is_empty()
            && self.restored_backups.is_empty()
            && self.removed_backups.is_empty()
            && self.inconsistent.is_empty()
    }
}

/// Split `<stem>.<marker>.<ext>` into (stem, ext)
fn split_marked(path: &Path, marker: &str) -> Option<(String, String)> {
    let name = path.file_name()?.to_str()?;
    let needle = format!(".{}.", marker);
    let idx = name.rfind(&needle)?;
    let stem = &name[..idx];
    let ext = &name[idx + needle.len()..];
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some((stem.to_string(), ext.to_string()))
}

/// Resolves which plain file a work file was made from
struct Siblings<'a> {
    extensions: &'a [String],
    default_container: &'a str,
    /// Canonical paths that a planned restore will bring back
    restored: HashSet<PathBuf>,
}

impl Siblings<'_> {
    fn recognized(&self, ext: &str) -> bool {
        self.extensions.iter().any(|x| x.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }

    /// The source whose conversion writes `<stem>.hevcify-tmp.<container>`: a plain
    /// `<stem>.<ext>` next to it whose extension resolves to that same container.
    /// A same-stem file that converts to some other container is unrelated.
    fn original_for(&self, dir: &Path, stem: &str, container: &str) -> Option<PathBuf> {
        let matches = |p: &Path| {
            p.file_stem().and_then(|s| s.to_str()) == Some(stem)
                && p.extension()
                    .and_then(|e| e.to_str())
                    .filter(|e| self.recognized(e))
                    .map(|e| resolve_container(e, self.default_container).eq_ignore_ascii_case(container))
                    .unwrap_or(false)
        };

        let on_disk = fs::read_dir(dir).ok().and_then(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .find(|p| p.is_file() && matches(p.as_path()))
        });
        on_disk.or_else(|| {
            self.restored
                .iter()
                .find(|p| p.parent() == Some(dir) && matches(p.as_path()))
                .cloned()
        })
    }
}

/// Find leftovers of an interrupted run under `root` and decide what to do with each.
/// Read-only.
pub fn plan_recovery(root: &Path, extensions: &[String], default_container: &str) -> RecoveryPlan {
    debug!("Checking for leftovers of interrupted runs under {}", root.display());
    let mut plan = RecoveryPlan::default();
    let mut siblings = Siblings {
        extensions,
        default_container,
        restored: HashSet::new(),
    };

    let mut temps = Vec::new();
    let mut backups = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if split_marked(&path, TEMP_MARKER).is_some() {
            temps.push(path);
        } else if split_marked(&path, BACKUP_MARKER).is_some() {
            backups.push(path);
        }
    }
    temps.sort();
    backups.sort();

    // Backups first: a restored original turns its temp into a plain stale temp
    for backup in backups {
        let Some((stem, ext)) = split_marked(&backup, BACKUP_MARKER) else {
            continue;
        };
        let dir = backup.parent().unwrap_or(root);
        let canonical = dir.join(format!("{}.{}", stem, ext));
        let container = resolve_container(&ext, default_container);
        let converted = dir.join(format!("{}.{}", stem, container));
        let temp_pending = temps.iter().any(|t| {
            t.parent() == Some(dir)
                && split_marked(t, TEMP_MARKER)
                    .map(|(s, e)| s == stem && e.eq_ignore_ascii_case(&container))
                    .unwrap_or(false)
        });

        if temp_pending && !canonical.exists() {
            siblings.restored.insert(canonical.clone());
            plan.actions.push(RecoveryAction::RestoreBackup { backup, canonical });
        } else if !temp_pending && converted.exists() {
            plan.actions.push(RecoveryAction::RemoveBackup { backup, converted });
        } else if !canonical.exists() {
            siblings.restored.insert(canonical.clone());
            plan.actions.push(RecoveryAction::RestoreBackup { backup, canonical });
        } else {
            plan.inconsistent.push(backup);
        }
    }

    for temp in temps {
        let Some((stem, container)) = split_marked(&temp, TEMP_MARKER) else {
            continue;
        };
        let dir = temp.parent().unwrap_or(root);
        match siblings.original_for(dir, &stem, &container) {
            Some(original) => plan.actions.push(RecoveryAction::RemoveTemp { temp, original }),
            None => plan.inconsistent.push(temp),
        }
    }

    plan
}

impl RecoveryPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.inconsistent.is_empty()
    }

    /// Carry out the planned actions. Each one is re-checked against the disk first;
    /// a temp whose original has vanished since planning is kept and reported instead.
    pub fn apply(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport {
            inconsistent: self.inconsistent.clone(),
            ..Default::default()
        };

        for action in &self.actions {
            match action {
                RecoveryAction::RestoreBackup { backup, canonical } => {
                    if canonical.exists() {
                        warn!("Not restoring {}: {} is already taken", backup.display(), canonical.display());
                        report.inconsistent.push(backup.clone());
                        continue;
                    }
                    fs::rename(backup, canonical).with_context(|| {
                        format!("Failed to restore backup: {} -> {}", backup.display(), canonical.display())
                    })?;
                    info!("🔄 Restored original from backup: {}", canonical.display());
                    report.restored_backups.push(canonical.clone());
                }
                RecoveryAction::RemoveBackup { backup, converted } => {
                    if !converted.exists() {
                        warn!("Keeping backup {}: {} is gone", backup.display(), converted.display());
                        report.inconsistent.push(backup.clone());
                        continue;
                    }
                    fs::remove_file(backup)
                        .with_context(|| format!("Failed to delete backup: {}", backup.display()))?;
                    info!("🗑️  Deleted leftover backup: {}", backup.display());
                    report.removed_backups.push(backup.clone());
                }
                RecoveryAction::RemoveTemp { temp, original } => {
                    if !original.exists() {
                        report.inconsistent.push(temp.clone());
                        continue;
                    }
                    fs::remove_file(temp)
                        .with_context(|| format!("Failed to delete stale temp file: {}", temp.display()))?;
                    info!("🗑️  Deleted stale temp file: {}", temp.display());
                    report.removed_temps.push(temp.clone());
                }
            }
        }

        for path in &report.inconsistent {
            error!(
                "INCONSISTENT STATE: {} has no original to fall back on; left in place for manual recovery",
                path.display()
            );
        }
        Ok(report)
    }
}

/// Plan and apply in one step
pub fn recover_leftovers(root: &Path, extensions: &[String], default_container: &str) -> Result<RecoveryReport> {
    plan_recovery(root, extensions, default_container).apply()
}
