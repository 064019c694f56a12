use crate::job::{Codec, UnknownCodecPolicy, VideoFile, UNKNOWN_CODEC_POLICY};

/// Names ffprobe and friends use for the HEVC family
const HEVC_ALIASES: &[&str] = &["hevc", "h265", "h.265", "hev1", "hvc1", "x265"];

/// Decides whether a probed file is worth re-encoding
#[derive(Debug, Clone)]
pub struct EligibilityFilter {
    target_codec: String,
    min_bytes: u64,
    extensions: Vec<String>,
    unknown_policy: UnknownCodecPolicy,
}

impl EligibilityFilter {
    pub fn new(target_codec: &str, min_bytes: u64, extensions: &[String]) -> Self {
        Self {
            target_codec: target_codec.trim().to_lowercase(),
            min_bytes,
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            unknown_policy: UNKNOWN_CODEC_POLICY,
        }
    }

    pub fn with_unknown_policy(mut self, policy: UnknownCodecPolicy) -> Self {
        self.unknown_policy = policy;
        self
    }

    /// True if `codec` belongs to the target family
    pub fn is_target_codec(&self, codec: &str) -> bool {
        same_codec_family(&self.target_codec, codec)
    }

    pub fn is_eligible(&self, file: &VideoFile) -> bool {
        self.skip_reason(file).is_none()
    }

    /// Why `file` is not a candidate, or None if it is
    pub fn skip_reason(&self, file: &VideoFile) -> Option<String> {
        if !self.extensions.contains(&file.extension) {
            return Some(format!("extension .{} not recognized", file.extension));
        }
        if file.size < self.min_bytes {
            return Some(format!("file < {} bytes", self.min_bytes));
        }
        match &file.codec {
            Codec::Known(name) if self.is_target_codec(name) => {
                Some(format!("already {}", self.target_codec))
            }
            Codec::Known(_) => None,
            Codec::Unknown => match self.unknown_policy {
                UnknownCodecPolicy::Attempt => None,
                UnknownCodecPolicy::Skip => Some("codec unknown".to_string()),
            },
        }
    }
}

/// Codec names compare equal when they name the same family
pub fn same_codec_family(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a == b {
        return true;
    }
    HEVC_ALIASES.contains(&a.as_str()) && HEVC_ALIASES.contains(&b.as_str())
}
