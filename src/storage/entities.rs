use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate};
use serde::Deserialize;
use serde::Serialize;

/// One capture observation as it is written to the day's partition. A record
/// exists only for minutes where the user was active and the screen unlocked;
/// skipped cycles leave no trace.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct ActivityEvent {
    #[serde(with = "local_second_ts")]
    pub timestamp: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<Arc<str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_title: Option<Arc<str>>,
    pub display: u32,
    /// Recognized on-screen text. Empty when extraction failed or found
    /// nothing; already truncated by the capture side.
    #[serde(default, alias = "ocr_text")]
    pub text: String,
}

impl ActivityEvent {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Label used to attribute the event to a working context.
    pub fn app_label(&self) -> Arc<str> {
        self.app.clone().unwrap_or_else(|| "Unknown".into())
    }
}

/// Timestamps are stored as ISO-8601 local time at second precision. Older
/// logs written by the previous tooling carry no UTC offset, so reading
/// accepts naive local timestamps too.
mod local_second_ts {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
    use serde::{self, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

    pub fn serialize<S>(timestamp: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&timestamp.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Local>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if let Ok(v) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(v.with_timezone(&Local));
        }
        let naive = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(serde::de::Error::custom)?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| serde::de::Error::custom(format!("ambiguous local time {raw}")))
    }
}
