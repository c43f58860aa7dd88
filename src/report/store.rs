use std::path::PathBuf;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use super::ReportPeriod;

/// Persisted report documents, one Markdown file per period. Regeneration is
/// the only mutation path; the swap is atomic so an interrupted run can never
/// leave a half-written report behind.
pub struct ReportStore {
    reports_dir: PathBuf,
}

impl ReportStore {
    pub fn new(reports_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&reports_dir)?;

        Ok(Self { reports_dir })
    }

    pub fn path_for(&self, period: &ReportPeriod) -> PathBuf {
        self.reports_dir.join(period.file_name())
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.reports_dir
    }

    pub fn write(&self, period: &ReportPeriod, content: &str) -> Result<PathBuf> {
        let path = self.path_for(period);

        // Written next to the destination so the rename stays on one
        // filesystem.
        let staged = NamedTempFile::new_in(&self.reports_dir)
            .context("failed to stage report file")?;
        std::fs::write(staged.path(), content)
            .with_context(|| format!("failed to write report for {}", period.label()))?;
        staged
            .persist(&path)
            .with_context(|| format!("failed to move report into place at {path:?}"))?;

        Ok(path)
    }
}
