//! Builds the bounded summarization request and parses the service's answer.
//! The service contributes text only; every duration in the final report is
//! computed locally.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

use super::{
    WorkWeek,
    aggregate::{AppUsage, DayActivity},
    render::format_duration_jp,
    session::Session,
};

/// Caps keeping the prompt payload bounded on noisy days.
const MAX_PROMPT_SESSIONS: usize = 80;
const PROMPT_EXCERPT_CHARS: usize = 300;
const MAX_PROMPT_APPS: usize = 10;
const MAX_PROMPT_TITLES: usize = 3;

/// The sections the summarization service is asked to return, as one JSON
/// object. Anything that doesn't parse into this shape counts as a failed
/// summarization.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NarrativeSections {
    /// Work-content bullets.
    pub narrative: Vec<String>,
    /// Learnings and observations, free text.
    #[serde(default)]
    pub notes: String,
    /// Unfinished or in-progress items.
    #[serde(default)]
    pub open_items: Vec<String>,
    /// One-line purpose per application, merged into the usage table.
    #[serde(default)]
    pub app_purposes: BTreeMap<String, String>,
}

pub fn build_daily_prompt(date: NaiveDate, sessions: &[Session], usage: &[AppUsage]) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "以下は{date}の作業ログデータです。これを解析して日報の材料を作成してください。\n\n",
    ));
    push_overview(&mut prompt, sessions);
    push_usage(&mut prompt, "アプリ使用時間", usage);
    push_sessions(&mut prompt, sessions, false);
    push_response_contract(&mut prompt);
    prompt
}

pub fn build_weekly_prompt(
    week: &WorkWeek,
    sessions: &[Session],
    usage: &[AppUsage],
    breakdown: &BTreeMap<NaiveDate, DayActivity>,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "以下は{} 〜 {}の週間作業ログデータです。これを解析して週報の材料を作成してください。\n\n",
        week.start(),
        week.end(),
    ));
    push_overview(&mut prompt, sessions);

    prompt.push_str("## 日ごとの作業時間\n");
    for (date, day) in breakdown {
        prompt.push_str(&format!("- {date}: {}\n", format_duration_jp(day.total)));
    }
    prompt.push('\n');

    push_usage(&mut prompt, "週全体のアプリ使用時間", usage);
    push_sessions(&mut prompt, sessions, true);
    push_response_contract(&mut prompt);
    prompt
}

fn push_overview(prompt: &mut String, sessions: &[Session]) {
    prompt.push_str("## 記録概要\n");
    if let (Some(first), Some(last)) = (sessions.first(), sessions.last()) {
        prompt.push_str(&format!("- 記録開始: {}\n", first.start));
        prompt.push_str(&format!("- 記録終了: {}\n", last.end));
    }
    prompt.push_str(&format!("- セッション数: {}\n\n", sessions.len()));
}

fn push_usage(prompt: &mut String, heading: &str, usage: &[AppUsage]) {
    prompt.push_str(&format!("## {heading}\n"));
    for entry in usage.iter().take(MAX_PROMPT_APPS) {
        prompt.push_str(&format!(
            "- {}: {}\n",
            entry.app,
            format_duration_jp(entry.duration)
        ));
    }
    prompt.push('\n');
}

fn push_sessions(prompt: &mut String, sessions: &[Session], with_date: bool) {
    prompt.push_str("## 作業セッション（ウィンドウタイトルと画面内容の手がかり）\n");
    let time_format = if with_date { "%m/%d %H:%M" } else { "%H:%M" };
    for session in sessions.iter().take(MAX_PROMPT_SESSIONS) {
        let titles = session
            .window_titles
            .iter()
            .take(MAX_PROMPT_TITLES)
            .map(|v| v.as_ref())
            .collect::<Vec<_>>()
            .join(" / ");
        let excerpt: String = session
            .text_excerpts
            .replace('\n', " ")
            .chars()
            .take(PROMPT_EXCERPT_CHARS)
            .collect();

        prompt.push_str(&format!(
            "- {}〜{} {} ({})",
            session.start.format(time_format),
            session.end.format(time_format),
            session.app,
            format_duration_jp(session.duration()),
        ));
        if !titles.is_empty() {
            prompt.push_str(&format!(" [{titles}]"));
        }
        if !excerpt.is_empty() {
            prompt.push_str(&format!(" | {excerpt}"));
        }
        prompt.push('\n');
    }
    if sessions.len() > MAX_PROMPT_SESSIONS {
        prompt.push_str(&format!(
            "- （他{}セッションは省略）\n",
            sessions.len() - MAX_PROMPT_SESSIONS
        ));
    }
    prompt.push('\n');
}

fn push_response_contract(prompt: &mut String) {
    prompt.push_str(
        "---\n\
         次のキーを持つJSONオブジェクトのみを返してください:\n\
         - \"narrative\": 主な作業内容の箇条書き（文字列の配列）\n\
         - \"notes\": 画面内容やウィンドウタイトルから推測される知見・気づき（なければ「特になし」）\n\
         - \"open_items\": 未完了と思われる作業の配列\n\
         - \"app_purposes\": アプリ名から主な用途（短い一文）へのマップ\n\
         \n\
         注意:\n\
         - 推測を含む場合は「〜と思われる」などを付けて明示する\n\
         - 個人情報やセンシティブな情報は伏せる\n\
         - 作業時間の数値はログデータのものをそのまま使う\n\
         - JSON以外のテキストは出力しない\n",
    );
}

/// Parses the service response. Tolerates a Markdown code fence around the
/// object since chat backends like to add one; anything beyond that is a
/// malformed response.
pub fn parse_sections(raw: &str) -> Result<NarrativeSections> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let body = match (start, end) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => raw,
    };

    serde_json::from_str::<NarrativeSections>(body)
        .context("summarization response is not the expected JSON object")
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Local, NaiveDate, TimeZone};

    use crate::report::{aggregate::aggregate_usage, session::Session};

    use super::{MAX_PROMPT_SESSIONS, build_daily_prompt, parse_sections};

    fn session(hour: u32, minute: u32, app: &str) -> Session {
        let start = Local
            .with_ymd_and_hms(2026, 8, 5, hour, minute, 0)
            .unwrap();
        Session {
            app: app.into(),
            window_titles: vec!["main.rs".into()],
            start,
            end: start + Duration::minutes(30),
            text_excerpts: "x".repeat(4000),
        }
    }

    #[test]
    fn prompt_carries_sessions_usage_and_contract() {
        let sessions = vec![session(9, 0, "Code"), session(10, 0, "Safari")];
        let usage = aggregate_usage(&sessions);
        let prompt = build_daily_prompt(
            NaiveDate::from_ymd_opt(2026, 8, 5).unwrap(),
            &sessions,
            &usage,
        );

        assert!(prompt.contains("2026-08-05"));
        assert!(prompt.contains("Code"));
        assert!(prompt.contains("30分"));
        assert!(prompt.contains("\"narrative\""));
        assert!(prompt.contains("JSON以外のテキストは出力しない"));
    }

    #[test]
    fn prompt_is_bounded_on_noisy_days() {
        let sessions: Vec<_> = (0..120)
            .map(|i| session(9 + (i / 60) as u32, (i % 60) as u32, "Code"))
            .collect();
        let usage = aggregate_usage(&sessions);
        let prompt = build_daily_prompt(
            NaiveDate::from_ymd_opt(2026, 8, 5).unwrap(),
            &sessions,
            &usage,
        );

        let session_lines = prompt
            .lines()
            .filter(|line| line.starts_with("- ") && line.contains("〜"))
            .count();
        assert!(session_lines <= MAX_PROMPT_SESSIONS + 1);
        assert!(prompt.contains("他40セッションは省略"));
        // Excerpts are re-capped for the prompt even though sessions carry
        // longer evidence.
        assert!(prompt.len() < 120 * 1000);
    }

    #[test]
    fn parse_accepts_plain_json() {
        let raw = r#"{"narrative":["コードレビュー"],"notes":"特になし","open_items":["PR修正"],"app_purposes":{"Code":"開発"}}"#;
        let sections = parse_sections(raw).unwrap();
        assert_eq!(sections.narrative, vec!["コードレビュー"]);
        assert_eq!(sections.open_items, vec!["PR修正"]);
        assert_eq!(sections.app_purposes["Code"], "開発");
    }

    #[test]
    fn parse_accepts_fenced_json() {
        let raw = "```json\n{\"narrative\":[\"作業\"]}\n```";
        let sections = parse_sections(raw).unwrap();
        assert_eq!(sections.narrative, vec!["作業"]);
        assert_eq!(sections.notes, "");
        assert!(sections.open_items.is_empty());
    }

    #[test]
    fn parse_rejects_prose_and_missing_narrative() {
        assert!(parse_sections("見つかりませんでした").is_err());
        assert!(parse_sections(r#"{"notes":"x"}"#).is_err());
    }
}
