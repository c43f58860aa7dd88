use chrono::{DateTime, Local};

/// Represents an entity responsible for providing the current time across the
/// application. Events are stamped in the host's local zone, so the injected
/// clock speaks local time too.
pub trait Clock: Sync + Send + 'static {
    fn now(&self) -> DateTime<Local>;
}

pub struct DefaultClock;

impl Clock for DefaultClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
