use std::path::PathBuf;
use thiserror::Error;

/// Codec could not be determined for a file. Never fatal: the caller resolves it to
/// [`crate::Codec::Unknown`].
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to launch ffprobe for {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ffprobe exited with code {code} for {path}: {stderr}")]
    NonZeroExit {
        path: PathBuf,
        code: i32,
        stderr: String,
    },

    #[error("unparseable ffprobe output for {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("no video stream reported for {path}")]
    NoVideoStream { path: PathBuf },
}

/// Encoder process reported failure. The source file is untouched.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{backend} encoder exited with code {code}: {stderr_tail}")]
    NonZeroExit {
        backend: &'static str,
        code: i32,
        stderr_tail: String,
    },

    /// Paths that can't be handed to the encoder as text.
    #[error("path is not valid UTF-8 text: {0}")]
    TextEncoding(PathBuf),

    #[error("encoder I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while swapping the encoded output into place.
#[derive(Debug, Error)]
pub enum ReplacementError {
    /// Nothing was lost: the original is still at its path.
    #[error("replacement aborted before touching {source_path}: {reason}")]
    PreDelete { source_path: PathBuf, reason: String },

    /// The original was removed (or moved aside and could not be restored) and the
    /// encoded output never reached its final path.
    #[error(
        "INCONSISTENT STATE: original {source_path} removed but {temp_path} was not moved to {final_path}: {reason}"
    )]
    PostDelete {
        source_path: PathBuf,
        temp_path: PathBuf,
        final_path: PathBuf,
        reason: String,
    },
}

impl ReplacementError {
    /// True for the data-loss-adjacent class.
    pub fn is_inconsistent(&self) -> bool {
        matches!(self, ReplacementError::PostDelete { .. })
    }
}

/// A directory or file could not be read during traversal. Logged and skipped.
#[derive(Debug, Error)]
#[error("cannot read {}: {message}", display_path(.path))]
pub struct ScanError {
    pub path: Option<PathBuf>,
    pub message: String,
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "<unknown>".to_string(),
    }
}

impl From<walkdir::Error> for ScanError {
    fn from(err: walkdir::Error) -> Self {
        ScanError {
            path: err.path().map(|p| p.to_path_buf()),
            message: err.to_string(),
        }
    }
}

/// Operator-facing configuration problems. These abort the run before any file is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("root path does not exist or is not a directory: {0}")]
    BadRoot(PathBuf),

    #[error("invalid minimum size threshold: {0}")]
    BadThreshold(String),

    #[error("{0} must be at least 1")]
    ZeroCount(&'static str),

    #[error("no video extensions configured")]
    NoExtensions,

    #[error("external tool unavailable: {0}")]
    ToolUnavailable(String),
}

/// Per-job failure, as recorded in the error ledger.
#[derive(Debug, Error)]
pub enum JobError {
    /// The file changed or vanished between scan and encode
    #[error("source no longer present: {0}")]
    SourceMissing(PathBuf),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Replace(#[from] ReplacementError),
}

impl JobError {
    /// Short tag written to the error ledger.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::SourceMissing(_) => "missing",
            JobError::Encode(_) => "encode",
            JobError::Replace(e) if e.is_inconsistent() => "replace-inconsistent",
            JobError::Replace(_) => "replace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_delete_is_inconsistent() {
        let err = ReplacementError::PostDelete {
            source_path: PathBuf::from("/v/a.mov"),
            temp_path: PathBuf::from("/v/a.hevcify-tmp.mov"),
            final_path: PathBuf::from("/v/a.mov"),
            reason: "rename failed".to_string(),
        };
        assert!(err.is_inconsistent());
        assert!(err.to_string().starts_with("INCONSISTENT STATE"));
        assert_eq!(JobError::from(err).kind(), "replace-inconsistent");
    }

    #[test]
    fn test_pre_delete_is_not_inconsistent() {
        let err = ReplacementError::PreDelete {
            source_path: PathBuf::from("/v/a.mov"),
            reason: "temp output empty".to_string(),
        };
        assert!(!err.is_inconsistent());
        assert_eq!(JobError::from(err).kind(), "replace");
    }
}
