//! Renders the fixed Markdown report layouts. Section order is part of the
//! report contract; the generated narrative is merged with locally computed
//! usage tables.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

use super::{
    ReportPeriod, WorkWeek,
    aggregate::{AppUsage, DayActivity},
    compose::NarrativeSections,
};

pub const NO_ACTIVITY_NARRATIVE: &str = "活動記録はありませんでした。";
const NOTHING_TO_REPORT: &str = "特になし";
/// How many apps a day line of the weekly overview names.
const OVERVIEW_APPS: usize = 3;

pub fn render_daily(date: NaiveDate, usage: &[AppUsage], sections: &NarrativeSections) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {date} 日報\n\n"));

    out.push_str("## 作業内容\n");
    push_bullets(&mut out, &sections.narrative);
    out.push('\n');

    out.push_str("## 使用アプリ\n");
    push_usage_table(&mut out, usage, &sections.app_purposes);
    out.push('\n');

    out.push_str("## 得られた知見・メモ\n");
    push_text(&mut out, &sections.notes);
    out.push('\n');

    out.push_str("## 作業中のもの\n");
    push_bullets(&mut out, &sections.open_items);

    out
}

pub fn render_weekly(
    week: &WorkWeek,
    usage: &[AppUsage],
    breakdown: &BTreeMap<NaiveDate, DayActivity>,
    sections: &NarrativeSections,
) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "# {} 週報（{} 〜 {}）\n\n",
        week.label(),
        week.start(),
        week.end()
    ));

    out.push_str("## 今週の作業サマリー\n");
    push_bullets(&mut out, &sections.narrative);
    out.push('\n');

    out.push_str("## 使用アプリ（週間）\n");
    push_usage_table(&mut out, usage, &sections.app_purposes);
    out.push('\n');

    out.push_str("## 日別の活動概要\n");
    if breakdown.is_empty() {
        out.push_str(&format!("{NOTHING_TO_REPORT}\n"));
    }
    for (date, day) in breakdown {
        let apps = day
            .usage
            .iter()
            .take(OVERVIEW_APPS)
            .map(|v| v.app.as_ref())
            .collect::<Vec<_>>()
            .join("、");
        out.push_str(&format!(
            "- {date}: {}（{apps}）\n",
            format_duration_jp(day.total)
        ));
    }
    out.push('\n');

    out.push_str("## 学習・調査メモ\n");
    push_text(&mut out, &sections.notes);
    out.push('\n');

    out.push_str("## 作業中のもの\n");
    push_bullets(&mut out, &sections.open_items);

    out
}

/// Rendered when a period has partitions but no recorded activity. The
/// summarization service is never consulted for these.
pub fn render_empty(period: &ReportPeriod) -> String {
    let title = match period {
        ReportPeriod::Day(date) => format!("# {date} 日報\n\n"),
        ReportPeriod::Week(week) => format!(
            "# {} 週報（{} 〜 {}）\n\n",
            week.label(),
            week.start(),
            week.end()
        ),
    };

    let mut out = title;
    out.push_str(&format!("## 作業内容\n{NO_ACTIVITY_NARRATIVE}\n\n"));
    out.push_str("## 使用アプリ\n");
    push_usage_table(&mut out, &[], &BTreeMap::new());
    out.push('\n');
    out.push_str(&format!("## 得られた知見・メモ\n{NOTHING_TO_REPORT}\n\n"));
    out.push_str(&format!("## 作業中のもの\n{NOTHING_TO_REPORT}\n"));
    out
}

fn push_bullets(out: &mut String, bullets: &[String]) {
    if bullets.is_empty() {
        out.push_str(&format!("{NOTHING_TO_REPORT}\n"));
        return;
    }
    for bullet in bullets {
        out.push_str(&format!("- {bullet}\n"));
    }
}

fn push_text(out: &mut String, text: &str) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        out.push_str(&format!("{NOTHING_TO_REPORT}\n"));
    } else {
        out.push_str(trimmed);
        out.push('\n');
    }
}

fn push_usage_table(
    out: &mut String,
    usage: &[AppUsage],
    purposes: &BTreeMap<String, String>,
) {
    out.push_str("| アプリ名 | 使用時間 | 主な用途 |\n");
    out.push_str("|---------|---------|---------|\n");
    for entry in usage {
        let purpose = purposes
            .get(entry.app.as_ref())
            .map(|v| v.as_str())
            .unwrap_or("-");
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            entry.app,
            format_duration_jp(entry.duration),
            purpose
        ));
    }
}

/// Renders an exact second count as hours/minutes. Rounding happens here and
/// nowhere earlier.
pub fn format_duration_jp(duration: Duration) -> String {
    let hours = duration.num_hours();
    let minutes = duration.num_minutes() % 60;
    if hours > 0 {
        format!("{hours}時間{minutes}分")
    } else {
        format!("{minutes}分")
    }
}
