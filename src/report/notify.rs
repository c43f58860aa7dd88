//! Optional delivery of a finished report to a webhook sink. Delivery is
//! best-effort and at-most-once per period; a failure never invalidates the
//! already persisted report.

use std::{
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use tracing::info;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Notifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(webhook_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            webhook_url,
            client,
        })
    }

    pub async fn post_report(&self, label: &str, markdown: &str) -> Result<()> {
        let body = serde_json::json!({
            "text": format!("📊 *{label} 週報*\n{}", markdown_to_mrkdwn(markdown)),
        });

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("webhook delivery failed with status {}", response.status());
        }
        info!("Posted report {label} to webhook");
        Ok(())
    }
}

/// Remembers which periods were already delivered, one label per line next to
/// the reports themselves.
pub struct PostedMarker {
    path: PathBuf,
}

impl PostedMarker {
    pub fn new(reports_dir: &Path) -> Self {
        Self {
            path: reports_dir.join(".posted"),
        }
    }

    pub fn is_posted(&self, label: &str) -> bool {
        std::fs::read_to_string(&self.path)
            .map(|content| content.lines().any(|line| line == label))
            .unwrap_or(false)
    }

    pub fn mark(&self, label: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {:?}", self.path))?;
        writeln!(file, "{label}")?;
        Ok(())
    }
}

/// Converts the report Markdown into the webhook's mrkdwn dialect: headings
/// become bold lines, tables become bullet lines.
pub fn markdown_to_mrkdwn(text: &str) -> String {
    let mut result: Vec<String> = Vec::new();
    let mut table_rows: Vec<Vec<String>> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('|') {
            if is_separator_row(trimmed) {
                continue;
            }
            let cells = split_row(trimmed);
            if !cells.is_empty() {
                table_rows.push(cells);
            }
            continue;
        }
        flush_table(&mut result, &mut table_rows);

        if let Some(rest) = line.strip_prefix("# ") {
            result.push(format!("\n*{}*", rest.trim()));
        } else if let Some(rest) = line.strip_prefix("## ") {
            result.push(format!("\n*{}*", rest.trim()));
        } else if let Some(rest) = line.strip_prefix("### ") {
            result.push(format!("*{}*", rest.trim()));
        } else {
            result.push(line.replace("**", "*"));
        }
    }
    flush_table(&mut result, &mut table_rows);

    result.join("\n")
}

fn is_separator_row(line: &str) -> bool {
    line.contains('-')
        && line
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':' | ' ' | '\t'))
}

fn split_row(line: &str) -> Vec<String> {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() < 3 {
        return vec![];
    }
    parts[1..parts.len() - 1]
        .iter()
        .map(|v| v.trim().to_string())
        .collect()
}

fn flush_table(result: &mut Vec<String>, table_rows: &mut Vec<Vec<String>>) {
    if table_rows.is_empty() {
        return;
    }
    let headers = table_rows[0].clone();
    for row in table_rows.iter().skip(1) {
        if row.len() < headers.len() {
            continue;
        }
        let parts = headers
            .iter()
            .zip(row)
            .filter(|(_, cell)| !cell.is_empty())
            .map(|(header, cell)| format!("{header}: {cell}"))
            .collect::<Vec<_>>();
        result.push(format!("• {}", parts.join(" / ")));
    }
    table_rows.clear();
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::{PostedMarker, markdown_to_mrkdwn};

    #[test]
    fn headings_become_bold() {
        assert!(markdown_to_mrkdwn("# Title").contains("*Title*"));
        assert!(markdown_to_mrkdwn("## Section").contains("*Section*"));
        assert!(markdown_to_mrkdwn("### Subsection").contains("*Subsection*"));
    }

    #[test]
    fn bold_markers_are_converted() {
        let converted = markdown_to_mrkdwn("This is **important** text");
        assert!(converted.contains("*important*"));
        assert!(!converted.contains("**"));
    }

    #[test]
    fn tables_become_bullet_lines() {
        let table = "| App | Time | Usage |\n\
                     |-----|------|-------|\n\
                     | Safari | 2h | Browsing |\n\
                     | Code | 3h | Development |";
        let converted = markdown_to_mrkdwn(table);
        assert!(converted.contains("• App: Safari / Time: 2h / Usage: Browsing"));
        assert!(converted.contains("Code"));
    }

    #[test]
    fn plain_text_and_lists_are_preserved() {
        assert!(markdown_to_mrkdwn("Normal text here").contains("Normal text here"));
        let lists = markdown_to_mrkdwn("- Item 1\n- Item 2");
        assert!(lists.contains("- Item 1"));
        assert!(lists.contains("- Item 2"));
    }

    #[test]
    fn trailing_table_is_flushed() {
        let text = "## Apps\n| App | Time |\n|-----|------|\n| Code | 3h |";
        let converted = markdown_to_mrkdwn(text);
        assert!(converted.contains("• App: Code / Time: 3h"));
    }

    #[test]
    fn posted_marker_records_labels_once() -> Result<()> {
        let dir = tempdir()?;
        let marker = PostedMarker::new(dir.path());

        assert!(!marker.is_posted("2026-W32"));
        marker.mark("2026-W32")?;
        assert!(marker.is_posted("2026-W32"));
        assert!(!marker.is_posted("2026-W33"));

        marker.mark("2026-W33")?;
        assert!(marker.is_posted("2026-W32"));
        assert!(marker.is_posted("2026-W33"));
        Ok(())
    }
}
