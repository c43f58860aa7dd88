//! The report synthesizer. Reads a closed period's event partitions, derives
//! sessions and per-app durations, drives the summarization service and
//! persists the rendered document. Regeneration is all-or-nothing: a failed
//! run never touches a previously committed report.

pub mod aggregate;
pub mod compose;
pub mod notify;
pub mod render;
pub mod session;
pub mod store;
pub mod summarizer;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{Datelike, Duration, NaiveDate};
use futures::{StreamExt, stream};
use tracing::{info, warn};

use crate::{
    config::Config,
    storage::{entities::ActivityEvent, event_log::EventLog},
};

use self::{
    aggregate::{aggregate_usage, daily_breakdown},
    compose::{build_daily_prompt, build_weekly_prompt, parse_sections},
    notify::{Notifier, PostedMarker},
    render::{render_daily, render_empty, render_weekly},
    session::{SegmenterConfig, segment_events},
    store::ReportStore,
    summarizer::Summarizer,
};

/// The Mon-Fri working week containing a given date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkWeek {
    monday: NaiveDate,
}

impl WorkWeek {
    pub fn containing(date: NaiveDate) -> Self {
        let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
        Self { monday }
    }

    pub fn start(&self) -> NaiveDate {
        self.monday
    }

    pub fn end(&self) -> NaiveDate {
        self.monday + Duration::days(4)
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        (0..5)
            .map(|offset| self.monday + Duration::days(offset))
            .collect()
    }

    /// ISO week label, e.g. `2026-W32`.
    pub fn label(&self) -> String {
        let iso = self.monday.iso_week();
        format!("{}-W{:02}", iso.year(), iso.week())
    }
}

/// Key of a report document. Identical periods map to identical store paths,
/// which is what makes regeneration an overwrite instead of an accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPeriod {
    Day(NaiveDate),
    Week(WorkWeek),
}

impl ReportPeriod {
    pub fn label(&self) -> String {
        match self {
            ReportPeriod::Day(date) => date.to_string(),
            ReportPeriod::Week(week) => week.label(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.md", self.label())
    }
}

pub async fn generate_daily_report<L: EventLog>(
    config: &Config,
    event_log: &L,
    summarizer: &dyn Summarizer,
    store: &ReportStore,
    date: NaiveDate,
) -> Result<PathBuf> {
    if !event_log.has_partition(date) {
        bail!("no activity log exists for {date}");
    }

    let events = event_log.events_for(date).await?;
    let period = ReportPeriod::Day(date);
    let sessions = segment_events(&events, &segmenter_config(config));

    if sessions.is_empty() {
        info!("No activity recorded for {date}, writing a minimal report");
        return store.write(&period, &render_empty(&period));
    }

    let usage = aggregate_usage(&sessions);
    let prompt = build_daily_prompt(date, &sessions, &usage);
    let raw = summarizer
        .summarize(&prompt)
        .await
        .context("summarization failed, the existing report is left untouched")?;
    let sections = parse_sections(&raw)?;

    let markdown = render_daily(date, &usage, &sections);
    store.write(&period, &markdown)
}

pub async fn generate_weekly_report<L: EventLog>(
    config: &Config,
    event_log: &L,
    summarizer: &dyn Summarizer,
    store: &ReportStore,
    week: WorkWeek,
    notifier: Option<&Notifier>,
) -> Result<PathBuf> {
    let dates = week.dates();
    if !dates.iter().any(|date| event_log.has_partition(*date)) {
        bail!("no activity logs exist for week {}", week.label());
    }

    let events = load_events(event_log, &dates).await?;
    let period = ReportPeriod::Week(week);
    let sessions = segment_events(&events, &segmenter_config(config));

    let markdown = if sessions.is_empty() {
        info!(
            "No activity recorded for week {}, writing a minimal report",
            week.label()
        );
        render_empty(&period)
    } else {
        let usage = aggregate_usage(&sessions);
        let breakdown = daily_breakdown(&sessions);
        let prompt = build_weekly_prompt(&week, &sessions, &usage, &breakdown);
        let raw = summarizer
            .summarize(&prompt)
            .await
            .context("summarization failed, the existing report is left untouched")?;
        let sections = parse_sections(&raw)?;
        render_weekly(&week, &usage, &breakdown, &sections)
    };

    let path = store.write(&period, &markdown)?;

    if let Some(notifier) = notifier {
        deliver_once(notifier, store, &week, &markdown).await;
    }

    Ok(path)
}

fn segmenter_config(config: &Config) -> SegmenterConfig {
    SegmenterConfig {
        max_gap: config.session_max_gap(),
    }
}

/// Reads the week's partitions as an ordered buffered stream and concatenates
/// them in date order.
async fn load_events<L: EventLog>(
    event_log: &L,
    dates: &[NaiveDate],
) -> Result<Vec<ActivityEvent>> {
    let days: Vec<Result<Vec<ActivityEvent>>> = stream::iter(dates.iter().copied())
        .map(|date| event_log.events_for(date))
        .buffered(4)
        .collect()
        .await;

    let mut events = Vec::new();
    for day in days {
        events.extend(day?);
    }
    Ok(events)
}

/// Best-effort at-most-once webhook delivery. Failures are logged only; the
/// report itself is already committed.
async fn deliver_once(notifier: &Notifier, store: &ReportStore, week: &WorkWeek, markdown: &str) {
    let label = week.label();
    let marker = PostedMarker::new(store.dir());
    if marker.is_posted(&label) {
        info!("Report {label} was already delivered, skipping webhook");
        return;
    }
    match notifier.post_report(&label, markdown).await {
        Ok(()) => {
            if let Err(e) = marker.mark(&label) {
                warn!("Failed to record webhook delivery for {label} {e:?}");
            }
        }
        Err(e) => warn!("Webhook delivery failed for {label} {e:?}"),
    }
}
