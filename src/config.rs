//! Process configuration. Everything externally tunable is read from the
//! environment exactly once at startup and carried in an immutable [Config]
//! that gets passed down to each component.

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};

/// Seconds of user inactivity after which a capture cycle is skipped.
const DEFAULT_IDLE_THRESHOLD_SECS: u64 = 300;
/// The scheduler triggers one capture per minute.
const DEFAULT_CAPTURE_INTERVAL_SECS: u32 = 60;
/// How many skipped capture cycles a session survives before it is closed.
const DEFAULT_MISSED_CYCLE_TOLERANCE: u32 = 1;
/// Recognized text is cut off here so the partitions don't balloon.
const DEFAULT_MAX_TEXT_CHARS: usize = 5000;
const DEFAULT_OCR_LANGUAGES: &str = "ja,en";
const DEFAULT_AI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_AI_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_SUMMARIZER_TIMEOUT_SECS: u64 = 45;

#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub idle_threshold: Duration,
    pub capture_interval_secs: u32,
    pub missed_cycle_tolerance: u32,
    pub max_text_chars: usize,
    pub ocr_tool: PathBuf,
    pub ocr_languages: Vec<String>,
    pub summarizer: SummarizerConfig,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl Config {
    pub fn load(root: PathBuf) -> Result<Self> {
        Self::load_from(root, |name| env::var(name).ok())
    }

    /// Environment access goes through `lookup` so tests don't have to mutate
    /// process-global state.
    fn load_from(root: PathBuf, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let idle_threshold_secs: u64 = parse_var(
            &lookup,
            "WORKLOG_IDLE_THRESHOLD_SECS",
            DEFAULT_IDLE_THRESHOLD_SECS,
        )?;
        let capture_interval_secs = parse_var(
            &lookup,
            "WORKLOG_CAPTURE_INTERVAL_SECS",
            DEFAULT_CAPTURE_INTERVAL_SECS,
        )?;
        let missed_cycle_tolerance = parse_var(
            &lookup,
            "WORKLOG_MISSED_CYCLE_TOLERANCE",
            DEFAULT_MISSED_CYCLE_TOLERANCE,
        )?;
        let max_text_chars = parse_var(&lookup, "WORKLOG_MAX_TEXT_CHARS", DEFAULT_MAX_TEXT_CHARS)?;

        let ocr_tool = lookup("WORKLOG_OCR_TOOL")
            .map(PathBuf::from)
            .unwrap_or_else(|| root.join("dist").join("ocr_tool"));
        let ocr_languages = lookup("WORKLOG_OCR_LANGUAGES")
            .unwrap_or_else(|| DEFAULT_OCR_LANGUAGES.to_string())
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();

        let summarizer = SummarizerConfig {
            base_url: lookup("AI_BASE_URL").unwrap_or_else(|| DEFAULT_AI_BASE_URL.to_string()),
            api_key: lookup("AI_API_KEY").filter(|v| !v.trim().is_empty()),
            model: lookup("AI_MODEL").unwrap_or_else(|| DEFAULT_AI_MODEL.to_string()),
            timeout: Duration::from_secs(DEFAULT_SUMMARIZER_TIMEOUT_SECS),
        };

        Ok(Self {
            root,
            idle_threshold: Duration::from_secs(idle_threshold_secs),
            capture_interval_secs,
            missed_cycle_tolerance,
            max_text_chars,
            ocr_tool,
            ocr_languages,
            summarizer,
            webhook_url: lookup("WORKLOG_WEBHOOK_URL").filter(|v| !v.trim().is_empty()),
        })
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    pub fn diagnostics_dir(&self) -> PathBuf {
        self.root.join("diagnostics")
    }

    /// Largest event gap that still extends an open session.
    pub fn session_max_gap(&self) -> chrono::Duration {
        chrono::Duration::seconds(
            (self.capture_interval_secs * (1 + self.missed_cycle_tolerance)) as i64,
        )
    }
}

fn parse_var<T: FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {name}: {raw:?}")),
        None => Ok(default),
    }
}
