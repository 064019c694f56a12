pub mod config;
pub mod error;
pub mod job;
pub mod scan;
pub mod ffprobe;
pub mod filter;
pub mod encoder;
pub mod replace;
pub mod ledger;
pub mod recovery;
pub mod tools;
pub mod orchestrator;

pub use config::{BackendKind, ReplaceMode, TranscodeConfig};
pub use error::{ConfigError, EncodeError, JobError, ProbeError, ReplacementError, ScanError};
pub use job::{Codec, ConversionJob, ConversionResult, JobStatus, VideoFile};
pub use ffprobe::{FFProbeData, FFProbeFormat, FFProbeStream, FfprobeProber, ProbeReport, Prober};
pub use filter::EligibilityFilter;
pub use encoder::{build_encoder, Encoder, HardwareEncoder, SoftwareEncoder};
pub use replace::ReplacementManager;
pub use ledger::{LedgerRecorder, LedgerTotals, SuccessRecord};
pub use recovery::{plan_recovery, recover_leftovers, RecoveryAction, RecoveryPlan, RecoveryReport};
pub use orchestrator::{plan_jobs, Plan, ProgressEvent, RunSummary, TranscodeOrchestrator};
