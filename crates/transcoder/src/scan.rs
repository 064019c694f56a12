use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use walkdir::WalkDir;
use crate::error::ScanError;
use crate::replace::is_work_file;

/// A file seen during traversal, before any probing
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub size: u64,
    /// Lower-cased, no leading dot
    pub extension: String,
}

/// Result of looking at one video file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    /// Recognized video at or above the size threshold
    Candidate(ScannedFile),
    /// Recognized video that was passed over (file, reason)
    Skipped(ScannedFile, String),
}

/// Walks a directory tree for video files. Holds no traversal state, so every call to
/// [`FileScanner::video_paths`] starts a fresh walk.
#[derive(Debug, Clone)]
pub struct FileScanner {
    root: PathBuf,
    extensions: Vec<String>,
}

impl FileScanner {
    pub fn new(root: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            root: root.into(),
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lower-cased extension if `path` has a recognized one
    pub fn recognized_extension(&self, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.extensions.contains(&ext).then_some(ext)
    }

    /// Lazy walk yielding absolute paths of recognized video files.
    /// Unreadable entries are logged and skipped; they never end the walk.
    pub fn video_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        let root = std::fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", ScanError::from(e));
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| !is_work_file(p))
            .filter(|p| self.recognized_extension(p).is_some())
    }

    /// Walk and stat every video file, splitting by the size threshold
    pub fn scan(&self, min_bytes: u64) -> Vec<ScanResult> {
        let mut results = Vec::new();
        let mut media_files_found = 0;

        info!("Scanning directory: {}", self.root.display());

        for path in self.video_paths() {
            let Some(extension) = self.recognized_extension(&path) else {
                continue;
            };

            let size = match std::fs::metadata(&path) {
                Ok(m) => m.len(),
                Err(e) => {
                    let err = ScanError {
                        path: Some(path.clone()),
                        message: e.to_string(),
                    };
                    warn!("Skipping file: {}", err);
                    continue;
                }
            };

            media_files_found += 1;
            if media_files_found % 1000 == 0 {
                info!("Found {} video files so far...", media_files_found);
            }

            let file = ScannedFile {
                path,
                size,
                extension,
            };

            if size < min_bytes {
                let reason = format!("file < {} bytes", min_bytes);
                debug!("Skipping {}: {}", file.path.display(), reason);
                results.push(ScanResult::Skipped(file, reason));
            } else {
                debug!("Found candidate: {} ({} bytes)", file.path.display(), size);
                results.push(ScanResult::Candidate(file));
            }
        }

        info!(
            "Scan complete: {} video files, {} candidates",
            media_files_found,
            results.iter().filter(|r| matches!(r, ScanResult::Candidate(_))).count()
        );
        results
    }

    /// Candidates only, in path order
    pub fn candidates(&self, min_bytes: u64) -> Vec<ScannedFile> {
        let mut files: Vec<ScannedFile> = self
            .scan(min_bytes)
            .into_iter()
            .filter_map(|r| match r {
                ScanResult::Candidate(f) => Some(f),
                ScanResult::Skipped(..) => None,
            })
            .collect();
        files.sort();
        files
    }
}
