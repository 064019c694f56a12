use std::fmt;
use std::path::PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::config::BackendKind;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Video codec of the first video stream, as far as we could tell
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Codec {
    Known(String),
    Unknown,
}

impl Codec {
    pub fn name(&self) -> &str {
        match self {
            Codec::Known(name) => name,
            Codec::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// What to do with a file whose codec could not be determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownCodecPolicy {
    /// Re-encode anyway
    Attempt,
    /// Leave it alone
    Skip,
}

/// Files that can't be probed are re-encoded rather than silently skipped.
pub const UNKNOWN_CODEC_POLICY: UnknownCodecPolicy = UnknownCodecPolicy::Attempt;

/// Snapshot of a video file taken at scan time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFile {
    pub path: PathBuf,
    pub size: u64,
    /// Lower-cased, no leading dot
    pub extension: String,
    pub codec: Codec,
}

impl VideoFile {
    pub fn size_mb(&self) -> f64 {
        bytes_to_mb(self.size)
    }
}

/// Per-job state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Discovered,
    Eligible,
    Skipped,
    Encoding,
    EncodeFailed,
    Encoded,
    ReplaceFailed,
    Replaced,
    Logged,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Skipped | JobStatus::EncodeFailed | JobStatus::ReplaceFailed | JobStatus::Logged
        )
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Discovered, Eligible)
                | (Discovered, Skipped)
                | (Eligible, Encoding)
                | (Encoding, Encoded)
                | (Encoding, EncodeFailed)
                | (Encoded, Replaced)
                | (Encoded, ReplaceFailed)
                | (Replaced, Logged)
        )
    }
}

/// A file on its way from eligible to replaced-on-disk. Owned by one worker at a time.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub id: String,
    pub source: VideoFile,
    pub backend: BackendKind,
    pub temp_output: PathBuf,
    pub final_path: PathBuf,
    pub status: JobStatus,
}

impl ConversionJob {
    pub fn new(source: VideoFile, backend: BackendKind, temp_output: PathBuf, final_path: PathBuf) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source,
            backend,
            temp_output,
            final_path,
            status: JobStatus::Eligible,
        }
    }

    /// Move to the next state. Illegal transitions are a programming error and are logged, not applied.
    pub fn advance(&mut self, next: JobStatus) {
        if self.status.can_transition_to(next) {
            log::debug!("Job {}: {:?} -> {:?}", self.id, self.status, next);
            self.status = next;
        } else {
            log::error!("Job {}: refusing illegal transition {:?} -> {:?}", self.id, self.status, next);
        }
    }
}

/// Outcome of one completed job
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    pub final_path: PathBuf,
    pub elapsed_secs: f64,
    pub original_bytes: u64,
    pub new_bytes: u64,
    pub backend: BackendKind,
    pub codec_before: Codec,
    pub finished_at: DateTime<Utc>,
}

impl ConversionResult {
    /// Signed: a larger output yields a negative saving
    pub fn saved_bytes(&self) -> i64 {
        self.original_bytes as i64 - self.new_bytes as i64
    }

    pub fn saved_mb(&self) -> f64 {
        self.saved_bytes() as f64 / BYTES_PER_MB
    }

    pub fn saved_percent(&self) -> f64 {
        if self.original_bytes == 0 {
            return 0.0;
        }
        self.saved_bytes() as f64 / self.original_bytes as f64 * 100.0
    }

    pub fn original_mb(&self) -> f64 {
        bytes_to_mb(self.original_bytes)
    }

    pub fn new_mb(&self) -> f64 {
        bytes_to_mb(self.new_bytes)
    }
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}
