use chrono::NaiveDate;

/// This is the standard way of converting a date to a partition file name in worklog.
pub fn date_to_log_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d.jsonl").to_string()
}

/// Inverse of [date_to_log_name], used when a report is requested for a log
/// file path instead of a date.
pub fn date_from_log_stem(stem: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}
