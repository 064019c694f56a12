use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::warn;
use crate::job::ConversionResult;

/// Column order of the success log
pub const SUCCESS_FIELDS: &[&str] = &[
    "final_path",
    "elapsed_seconds",
    "original_size_MB",
    "new_size_MB",
    "saved_MB",
    "saved_percent",
    "codec",
    "backend",
];

/// One parsed row of the success log
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessRecord {
    pub final_path: PathBuf,
    pub elapsed_secs: f64,
    pub original_mb: f64,
    pub new_mb: f64,
    pub saved_mb: f64,
    pub saved_percent: f64,
    pub codec: String,
    pub backend: String,
}

impl SuccessRecord {
    pub fn parse_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != SUCCESS_FIELDS.len() {
            return Err(anyhow!("expected {} fields, got {}", SUCCESS_FIELDS.len(), fields.len()));
        }
        let num = |i: usize| -> Result<f64> {
            fields[i]
                .trim()
                .parse::<f64>()
                .with_context(|| format!("bad {} value: {:?}", SUCCESS_FIELDS[i], fields[i]))
        };
        Ok(Self {
            final_path: PathBuf::from(unescape_field(fields[0])),
            elapsed_secs: num(1)?,
            original_mb: num(2)?,
            new_mb: num(3)?,
            saved_mb: num(4)?,
            saved_percent: num(5)?,
            codec: fields[6].to_string(),
            backend: fields[7].trim_end().to_string(),
        })
    }
}

/// Format a result as a success log line (no trailing newline)
pub fn format_success(result: &ConversionResult) -> String {
    format!(
        "{}\t{:.2}\t{:.2}\t{:.2}\t{:.2}\t{:.2}\t{}\t{}",
        escape_field(&result.final_path.display().to_string()),
        result.elapsed_secs,
        result.original_mb(),
        result.new_mb(),
        result.saved_mb(),
        result.saved_percent(),
        result.codec_before,
        result.backend.as_str(),
    )
}

/// Format a failure as an error log line (no trailing newline)
pub fn format_error(at: DateTime<Utc>, kind: &str, path: &Path, message: &str) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        at.to_rfc3339(),
        kind,
        escape_field(&path.display().to_string()),
        single_line(message)
    )
}

/// Backslash-escape the separators so a path reads back exactly as written
fn escape_field(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_field(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn single_line(text: &str) -> String {
    text.replace(['\t', '\n', '\r'], " ")
}

struct Handles {
    success: File,
    errors: File,
}

/// Append-only success and error logs. Both files are opened once and appended to under one
/// mutex, so concurrent workers can't interleave or reorder lines. Dropping closes them.
pub struct LedgerRecorder {
    success_path: PathBuf,
    error_path: PathBuf,
    handles: Mutex<Handles>,
}

impl LedgerRecorder {
    pub fn open(success_path: impl Into<PathBuf>, error_path: impl Into<PathBuf>) -> Result<Self> {
        let success_path = success_path.into();
        let error_path = error_path.into();
        let success = open_append(&success_path)?;
        let errors = open_append(&error_path)?;
        Ok(Self {
            success_path,
            error_path,
            handles: Mutex::new(Handles { success, errors }),
        })
    }

    pub fn success_path(&self) -> &Path {
        &self.success_path
    }

    pub fn error_path(&self) -> &Path {
        &self.error_path
    }

    pub fn record_success(&self, result: &ConversionResult) -> Result<()> {
        let line = format_success(result);
        let mut handles = self.handles.lock().map_err(|_| anyhow!("ledger lock poisoned"))?;
        append_line(&mut handles.success, &line)
            .with_context(|| format!("Failed to append to {}", self.success_path.display()))
    }

    pub fn record_error(&self, kind: &str, path: &Path, message: &str) -> Result<()> {
        let line = format_error(Utc::now(), kind, path, message);
        let mut handles = self.handles.lock().map_err(|_| anyhow!("ledger lock poisoned"))?;
        append_line(&mut handles.errors, &line)
            .with_context(|| format!("Failed to append to {}", self.error_path.display()))
    }
}

impl Drop for LedgerRecorder {
    fn drop(&mut self) {
        if let Ok(handles) = self.handles.get_mut() {
            let _ = handles.success.sync_all();
            let _ = handles.errors.sync_all();
        }
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create ledger directory: {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open ledger: {}", path.display()))
}

fn append_line(file: &mut File, line: &str) -> std::io::Result<()> {
    file.write_all(format!("{}\n", line).as_bytes())?;
    file.flush()
}

/// Totals over a success log
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LedgerTotals {
    pub conversions: usize,
    pub original_mb: f64,
    pub new_mb: f64,
    pub saved_mb: f64,
}

/// Read every parseable record of a success log. Malformed lines are skipped with a warning.
pub fn read_success_log(path: &Path) -> Result<Vec<SuccessRecord>> {
    let file = File::open(path).with_context(|| format!("Failed to open ledger: {}", path.display()))?;
    let mut records = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match SuccessRecord::parse_line(&line) {
            Ok(r) => records.push(r),
            Err(e) => warn!("{}:{}: skipping malformed ledger line: {}", path.display(), n + 1, e),
        }
    }
    Ok(records)
}

pub fn totals(records: &[SuccessRecord]) -> LedgerTotals {
    records.iter().fold(LedgerTotals::default(), |mut t, r| {
        t.conversions += 1;
        t.original_mb += r.original_mb;
        t.new_mb += r.new_mb;
        t.saved_mb += r.saved_mb;
        t
    })
}
