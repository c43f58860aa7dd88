use std::{
    future::Future,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::utils::time::date_to_log_name;

use super::entities::ActivityEvent;

/// Interface for abstracting storage of activity events. Events are appended
/// into one file per calendar day; a day's file becomes read-only input for
/// the report synthesizer once the day has rolled over.
pub trait EventLog {
    /// Appends one event to the partition for its own date, creating the
    /// partition if it does not yet exist.
    fn append_event(&self, event: &ActivityEvent) -> impl Future<Output = Result<()>>;

    /// Retrieves all events recorded for a certain day, in append order.
    /// A day without a partition yields an empty list.
    fn events_for(&self, date: NaiveDate) -> impl Future<Output = Result<Vec<ActivityEvent>>> + Send;

    /// Whether any partition was ever written for the day. Lets callers
    /// distinguish "nothing captured" from "captured, but empty".
    fn has_partition(&self, date: NaiveDate) -> bool;
}

/// The main realization of [EventLog].
pub struct EventLogImpl {
    log_dir: PathBuf,
}

impl EventLogImpl {
    pub fn new(log_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&log_dir)?;

        Ok(Self { log_dir })
    }

    pub fn partition_path(&self, date: NaiveDate) -> PathBuf {
        self.log_dir.join(date_to_log_name(date))
    }

    async fn read_all_inner(path: &Path) -> Result<Vec<ActivityEvent>> {
        async fn extract(path: &Path) -> std::result::Result<Vec<ActivityEvent>, std::io::Error> {
            debug!("Extracting {path:?}");
            let file = File::open(path).await?;
            file.lock_shared()?;
            let buffer = BufReader::new(file);
            let mut lines = buffer.lines();
            let mut events = vec![];
            while let Ok(Some(v)) = lines.next_line().await {
                if v.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ActivityEvent>(&v) {
                    Ok(v) => events.push(v),
                    Err(e) => {
                        // ignore illegal values. Might happen after shutdowns
                        warn!(
                            "During parsing in path {:?} found illegal json string {}:  {e}",
                            path, &v
                        )
                    }
                }
            }

            lines.into_inner().into_inner().unlock_async().await?;

            Ok(events)
        }

        match extract(path).await {
            Ok(s) => Ok(s),
            Err(e) => {
                if e.kind() == ErrorKind::NotFound {
                    Ok(vec![])
                } else {
                    Err(e)?
                }
            }
        }
    }
}

impl EventLog for EventLogImpl {
    async fn append_event(&self, event: &ActivityEvent) -> Result<()> {
        let path = self.partition_path(event.date());

        let mut file = File::options()
            .append(true)
            .create(true)
            .open(path)
            .await?;

        let mut buffer = serde_json::to_vec(event)?;
        buffer.push(b'\n');

        // Semi-safe acquire-release for a file
        file.lock_exclusive()?;
        let result = async {
            file.write_all(&buffer).await?;
            file.flush().await?;
            Ok::<_, anyhow::Error>(())
        }
        .await;
        file.unlock_async().await?;
        result
    }

    async fn events_for(&self, date: NaiveDate) -> Result<Vec<ActivityEvent>> {
        let path = self.partition_path(date);
        let data = Self::read_all_inner(&path).await?;
        Ok(data)
    }

    fn has_partition(&self, date: NaiveDate) -> bool {
        self.partition_path(date).is_file()
    }
}
