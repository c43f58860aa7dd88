use std::{path::Path, time::Duration};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::instrument;

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

/// Contract for producing a raster image of a display.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScreenCapturer: Send + Sync {
    /// Captures the given display into `output`. The file must exist and be
    /// non-empty on success.
    async fn capture(&self, display: u32, output: &Path) -> Result<()>;
}

/// Captures through the platform's `screencapture` utility. `-x` suppresses
/// the shutter sound so a once-a-minute trigger stays unnoticeable.
pub struct ScreencaptureCli;

#[async_trait]
impl ScreenCapturer for ScreencaptureCli {
    #[instrument(skip(self, display, output))]
    async fn capture(&self, display: u32, output: &Path) -> Result<()> {
        let mut command = Command::new("screencapture");
        command
            .arg("-x")
            .arg("-D")
            .arg(display.to_string())
            .arg(output);

        let result = tokio::time::timeout(CAPTURE_TIMEOUT, command.output())
            .await
            .context("screencapture timed out")?
            .context("screencapture could not be started")?;

        if !result.status.success() {
            bail!(
                "screencapture failed with {}: {}",
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            );
        }
        if output.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
            bail!("screencapture produced no image at {output:?}");
        }

        Ok(())
    }
}

/// Transient screenshot image. Holding it keeps the file alive; dropping it
/// removes the file, which covers every exit path of a capture cycle.
pub struct TempShot {
    file: NamedTempFile,
}

impl TempShot {
    pub fn new(tmp_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(tmp_dir)
            .with_context(|| format!("failed to create {tmp_dir:?}"))?;
        let file = tempfile::Builder::new()
            .prefix("screenshot_")
            .suffix(".png")
            .tempfile_in(tmp_dir)
            .context("failed to create transient screenshot file")?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
