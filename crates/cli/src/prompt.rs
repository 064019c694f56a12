use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use anyhow::{Context, Result};
use humansize::{format_size, BINARY};
use transcoder::config::parse_threshold_mb;
use transcoder::{BackendKind, Plan, RecoveryPlan};

/// Answers that abort the run
const EXIT_WORDS: &[&str] = &["exit", "quit", "q", "no", "n"];

fn is_exit(answer: &str) -> bool {
    answer.is_empty() || EXIT_WORDS.iter().any(|w| answer.eq_ignore_ascii_case(w))
}

/// Drive roots present on this machine
pub fn available_drives() -> Vec<PathBuf> {
    if cfg!(windows) {
        (b'A'..=b'Z')
            .map(|letter| PathBuf::from(format!("{}:\\", letter as char)))
            .filter(|p| p.exists())
            .collect()
    } else {
        vec![PathBuf::from("/")]
    }
}

/// Pick a drive by list number (1-based) or by letter
pub fn parse_drive_choice(answer: &str, drives: &[PathBuf]) -> Option<PathBuf> {
    let answer = answer.trim();
    if let Ok(n) = answer.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| drives.get(i)).cloned();
    }
    let letter = answer.trim_end_matches(['\\', '/', ':']).to_uppercase();
    drives
        .iter()
        .find(|d| {
            d.to_string_lossy()
                .trim_end_matches(['\\', '/', ':'])
                .eq_ignore_ascii_case(&letter)
        })
        .cloned()
}

/// Question/answer loop over any reader and writer. Every method returns `None` when the
/// operator declined or answered something unusable; the caller exits without changes.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, question: &str) -> Result<String> {
        write!(self.output, "{} ", question)?;
        self.output.flush()?;
        let mut line = String::new();
        self.input.read_line(&mut line).context("Failed to read answer")?;
        Ok(line.trim().to_string())
    }

    fn say(&mut self, text: &str) -> Result<()> {
        writeln!(self.output, "{}", text)?;
        Ok(())
    }

    pub fn choose_root(&mut self) -> Result<Option<PathBuf>> {
        let answer = self.ask("Convert a [f]older or a whole [d]rive? (exit to quit)")?;
        match answer.to_lowercase().as_str() {
            "f" | "folder" => {
                let path = self.ask("Folder path:")?;
                if is_exit(&path) {
                    return Ok(None);
                }
                let path = PathBuf::from(path);
                if path.is_dir() {
                    Ok(Some(path))
                } else {
                    self.say(&format!("Not a directory: {}", path.display()))?;
                    Ok(None)
                }
            }
            "d" | "drive" => {
                let drives = available_drives();
                for (i, d) in drives.iter().enumerate() {
                    self.say(&format!("  {}. {}", i + 1, d.display()))?;
                }
                let pick = self.ask("Drive:")?;
                if is_exit(&pick) {
                    return Ok(None);
                }
                let choice = parse_drive_choice(&pick, &drives);
                if choice.is_none() {
                    self.say(&format!("No such drive: {}", pick))?;
                }
                Ok(choice)
            }
            _ => Ok(None),
        }
    }

    pub fn choose_backend(&mut self) -> Result<Option<BackendKind>> {
        let answer = self.ask("Encoder: [s]oftware (CPU) or [h]ardware (GPU)?")?;
        if is_exit(&answer) {
            return Ok(None);
        }
        let normalized = match answer.to_lowercase().as_str() {
            "s" => "software".to_string(),
            "h" => "hardware".to_string(),
            other => other.to_string(),
        };
        match BackendKind::from_str(&normalized) {
            Ok(kind) => Ok(Some(kind)),
            Err(_) => {
                self.say(&format!("Unknown encoder: {}", answer))?;
                Ok(None)
            }
        }
    }

    pub fn choose_threshold(&mut self) -> Result<Option<f64>> {
        let answer = self.ask("Only convert files of at least how many MB?")?;
        if is_exit(&answer) {
            return Ok(None);
        }
        match parse_threshold_mb(&answer) {
            Ok(mb) => Ok(Some(mb)),
            Err(e) => {
                self.say(&e.to_string())?;
                Ok(None)
            }
        }
    }

    /// Show pending recovery and the candidates, then require a literal "yes"
    pub fn confirm(&mut self, plan: &Plan, recovery: &RecoveryPlan, root: &Path) -> Result<bool> {
        if !recovery.actions.is_empty() {
            self.say("Leftovers of an interrupted run will be cleaned up first:")?;
            for action in &recovery.actions {
                self.say(&format!("  {}", action))?;
            }
        }
        if !recovery.inconsistent.is_empty() {
            self.say("Left in place, needs manual attention:")?;
            for path in &recovery.inconsistent {
                self.say(&format!("  {}", path.display()))?;
            }
        }
        self.say(&format!("Files to convert under {}:", root.display()))?;
        for job in &plan.jobs {
            self.say(&format!(
                "  {:>10}  {:<8}  {}",
                format_size(job.source.size, BINARY),
                job.source.codec,
                job.source.path.display()
            ))?;
        }
        self.say(&format!(
            "{} file(s), {} total. Originals are replaced in place.",
            plan.jobs.len(),
            format_size(plan.total_bytes(), BINARY)
        ))?;
        let answer = self.ask("Type yes to continue:")?;
        Ok(answer.eq_ignore_ascii_case("yes"))
    }
}
