use std::{collections::BTreeMap, sync::Arc};

use chrono::{Duration, NaiveDate};

use super::session::Session;

/// Cumulative time attributed to one application over a period. Durations are
/// exact integer seconds; rendering rounds, aggregation never does.
#[derive(Debug, Clone, PartialEq)]
pub struct AppUsage {
    pub app: Arc<str>,
    pub duration: Duration,
}

/// Returns per-app cumulative durations, longest first. Ties are ordered by
/// app name so regeneration is deterministic.
pub fn aggregate_usage(sessions: &[Session]) -> Vec<AppUsage> {
    let mut map = BTreeMap::<Arc<str>, Duration>::new();

    for session in sessions {
        let entry = map.entry(session.app.clone()).or_insert_with(Duration::zero);
        *entry += session.duration();
    }

    let mut usages = map
        .into_iter()
        .map(|(app, duration)| AppUsage { app, duration })
        .collect::<Vec<_>>();
    usages.sort_by(|a, b| b.duration.cmp(&a.duration).then(a.app.cmp(&b.app)));
    usages
}

/// Per-day activity for the weekly breakdown. A session counts for the day it
/// started on.
#[derive(Debug, Clone, PartialEq)]
pub struct DayActivity {
    pub total: Duration,
    pub usage: Vec<AppUsage>,
}

pub fn daily_breakdown(sessions: &[Session]) -> BTreeMap<NaiveDate, DayActivity> {
    let mut by_day = BTreeMap::<NaiveDate, Vec<Session>>::new();
    for session in sessions {
        by_day
            .entry(session.start.date_naive())
            .or_default()
            .push(session.clone());
    }

    by_day
        .into_iter()
        .map(|(date, sessions)| {
            let usage = aggregate_usage(&sessions);
            let total = usage
                .iter()
                .fold(Duration::zero(), |acc, v| acc + v.duration);
            (date, DayActivity { total, usage })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Local, NaiveDate, TimeZone};

    use crate::report::session::Session;

    use super::{aggregate_usage, daily_breakdown};

    fn session(day: u32, hour: u32, minutes: i64, app: &str) -> Session {
        let start = Local.with_ymd_and_hms(2026, 8, day, hour, 0, 0).unwrap();
        Session {
            app: app.into(),
            window_titles: vec![],
            start,
            end: start + Duration::minutes(minutes),
            text_excerpts: String::new(),
        }
    }

    #[test]
    fn per_app_durations_sum_across_sessions() {
        let sessions = vec![
            session(5, 9, 30, "A"),
            session(5, 10, 15, "B"),
            session(5, 11, 45, "A"),
        ];

        let usage = aggregate_usage(&sessions);
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].app.as_ref(), "A");
        assert_eq!(usage[0].duration, Duration::minutes(75));
        assert_eq!(usage[1].app.as_ref(), "B");
        assert_eq!(usage[1].duration, Duration::minutes(15));
    }

    #[test]
    fn totals_are_conserved() {
        let sessions = vec![
            session(5, 9, 10, "A"),
            session(5, 10, 20, "B"),
            session(5, 11, 30, "C"),
            session(5, 12, 40, "A"),
        ];

        let usage = aggregate_usage(&sessions);
        let from_usage = usage
            .iter()
            .fold(Duration::zero(), |acc, v| acc + v.duration);
        let from_sessions = sessions
            .iter()
            .fold(Duration::zero(), |acc, v| acc + v.duration());
        assert_eq!(from_usage, from_sessions);
    }

    #[test]
    fn equal_durations_order_by_name() {
        let sessions = vec![session(5, 10, 10, "Zed"), session(5, 9, 10, "Arc")];
        let usage = aggregate_usage(&sessions);
        assert_eq!(usage[0].app.as_ref(), "Arc");
        assert_eq!(usage[1].app.as_ref(), "Zed");
    }

    #[test]
    fn breakdown_groups_by_start_day() {
        let sessions = vec![
            session(3, 9, 60, "A"),
            session(3, 11, 30, "B"),
            session(4, 9, 15, "A"),
        ];

        let breakdown = daily_breakdown(&sessions);
        assert_eq!(breakdown.len(), 2);

        let monday = &breakdown[&NaiveDate::from_ymd_opt(2026, 8, 3).unwrap()];
        assert_eq!(monday.total, Duration::minutes(90));
        assert_eq!(monday.usage[0].app.as_ref(), "A");

        let tuesday = &breakdown[&NaiveDate::from_ymd_opt(2026, 8, 4).unwrap()];
        assert_eq!(tuesday.total, Duration::minutes(15));
    }
}
