use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::instrument;

/// Recognition of a full screen can take a while in accurate mode.
const OCR_TIMEOUT: Duration = Duration::from_secs(30);

/// Contract for turning an image into recognized text. May legitimately
/// return an empty string when the screen holds nothing readable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, image: &Path) -> Result<String>;
}

/// Runs the external OCR binary: text on stdout, diagnostics on stderr,
/// non-zero exit when the image cannot be loaded or recognition fails.
pub struct OcrCli {
    binary: PathBuf,
    languages: Vec<String>,
}

impl OcrCli {
    pub fn new(binary: PathBuf, languages: Vec<String>) -> Self {
        Self { binary, languages }
    }
}

#[async_trait]
impl TextExtractor for OcrCli {
    #[instrument(skip(self))]
    async fn extract(&self, image: &Path) -> Result<String> {
        let mut command = Command::new(&self.binary);
        command
            .arg("--languages")
            .arg(self.languages.join(","))
            .arg("--accurate")
            .arg(image);

        let output = tokio::time::timeout(OCR_TIMEOUT, command.output())
            .await
            .context("text extraction timed out")?
            .with_context(|| format!("failed to run {:?}", self.binary))?;

        if !output.status.success() {
            bail!(
                "text extraction failed with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Cuts `input` down to at most `max_chars` characters. The cut is marked
/// with an ellipsis that fits inside the budget, so the result never exceeds
/// the limit.
pub fn truncate_text(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    if max_chars <= 3 {
        return "...".chars().take(max_chars).collect();
    }
    let mut out = String::new();
    for (idx, ch) in input.chars().enumerate() {
        if idx >= max_chars - 3 {
            break;
        }
        out.push(ch);
    }
    out.push_str("...");
    out
}
