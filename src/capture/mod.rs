//! The capture pipeline. One invocation = one cycle: gate on idle/lock state,
//! snapshot the foreground window, photograph the active display, extract
//! text, append a single [ActivityEvent] to today's partition.

pub mod ocr;
pub mod probe;
pub mod screen;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::Timelike;
use tracing::{info, warn};

use crate::{
    config::Config,
    storage::{entities::ActivityEvent, event_log::EventLog},
    utils::clock::Clock,
};

use self::{
    ocr::{TextExtractor, truncate_text},
    probe::SystemProbe,
    screen::{ScreenCapturer, TempShot},
};

/// Result of one capture cycle. Skips are deliberate outcomes, not errors:
/// the process exits 0 and the scheduler simply fires again next minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Recorded,
    SkippedIdle,
    SkippedLocked,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub idle_threshold: Duration,
    pub max_text_chars: usize,
    pub tmp_dir: PathBuf,
}

impl CaptureSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            idle_threshold: config.idle_threshold,
            max_text_chars: config.max_text_chars,
            tmp_dir: config.tmp_dir(),
        }
    }
}

pub struct EventLogger<L> {
    probe: Box<dyn SystemProbe>,
    screen: Box<dyn ScreenCapturer>,
    extractor: Box<dyn TextExtractor>,
    event_log: L,
    clock: Box<dyn Clock>,
    settings: CaptureSettings,
}

impl<L: EventLog> EventLogger<L> {
    pub fn new(
        probe: Box<dyn SystemProbe>,
        screen: Box<dyn ScreenCapturer>,
        extractor: Box<dyn TextExtractor>,
        event_log: L,
        clock: Box<dyn Clock>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            probe,
            screen,
            extractor,
            event_log,
            clock,
            settings,
        }
    }

    /// Executes one capture cycle. A missing capability degrades its own
    /// field; only a failed display capture or a failed append aborts.
    pub async fn run_cycle(&mut self) -> Result<CaptureOutcome> {
        let idle = match self.probe.idle_time().await {
            Ok(v) => v,
            Err(e) => {
                warn!("Idle probe failed, assuming active {e:?}");
                Duration::ZERO
            }
        };
        if idle >= self.settings.idle_threshold {
            info!("Skipping capture, user idle for {idle:?}");
            return Ok(CaptureOutcome::SkippedIdle);
        }

        let locked = match self.probe.screen_locked().await {
            Ok(v) => v,
            Err(e) => {
                warn!("Lock probe failed, assuming unlocked {e:?}");
                false
            }
        };
        if locked {
            info!("Skipping capture, screen is locked");
            return Ok(CaptureOutcome::SkippedLocked);
        }

        let window = match self.probe.active_window().await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Window lookup failed, leaving fields absent {e:?}");
                None
            }
        };

        let display = match self.probe.active_display().await {
            Ok(v) => v,
            Err(e) => {
                warn!("Display lookup failed, falling back to main display {e:?}");
                1
            }
        };

        // The image lives only for this cycle; dropping the guard removes it
        // on every exit path.
        let shot = TempShot::new(&self.settings.tmp_dir)?;
        self.screen
            .capture(display, shot.path())
            .await
            .context("failed to capture display")?;

        let text = match self.extractor.extract(shot.path()).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Text extraction failed, recording empty text {e:?}");
                String::new()
            }
        };
        let text = truncate_text(&text, self.settings.max_text_chars);

        let timestamp = self.clock.now();
        let event = ActivityEvent {
            timestamp: timestamp.with_nanosecond(0).unwrap_or(timestamp),
            app: window.as_ref().and_then(|w| non_empty(&w.app)),
            window_title: window.as_ref().and_then(|w| non_empty(&w.window_title)),
            display,
            text,
        };

        self.event_log
            .append_event(&event)
            .await
            .context("failed to append event to today's log")?;

        info!(
            "Recorded activity for {} - {}",
            event.app.as_deref().unwrap_or("<unknown>"),
            event.window_title.as_deref().unwrap_or("")
        );
        Ok(CaptureOutcome::Recorded)
    }
}

fn non_empty(value: &Arc<str>) -> Option<Arc<str>> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::{Result, anyhow};
    use chrono::{DateTime, Local, NaiveDate, TimeZone};
    use tempfile::tempdir;

    use crate::{
        capture::{
            CaptureOutcome, CaptureSettings, EventLogger,
            ocr::MockTextExtractor,
            probe::{MockSystemProbe, WindowSnapshot},
            screen::MockScreenCapturer,
        },
        storage::event_log::{EventLog, EventLogImpl},
        utils::{clock::Clock, logging::TEST_LOGGING},
    };

    const TEST_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2026, 8, 5) {
        Some(v) => v,
        None => panic!("valid date"),
    };

    struct FixedClock(DateTime<Local>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Local> {
            self.0
        }
    }

    fn test_clock() -> Box<FixedClock> {
        Box::new(FixedClock(
            Local.with_ymd_and_hms(2026, 8, 5, 9, 30, 0).unwrap(),
        ))
    }

    fn settings(tmp_dir: std::path::PathBuf) -> CaptureSettings {
        CaptureSettings {
            idle_threshold: Duration::from_secs(300),
            max_text_chars: 5000,
            tmp_dir,
        }
    }

    fn active_probe() -> MockSystemProbe {
        let mut probe = MockSystemProbe::new();
        probe
            .expect_idle_time()
            .returning(|| Ok(Duration::from_secs(3)));
        probe.expect_screen_locked().returning(|| Ok(false));
        probe.expect_active_window().returning(|| {
            Ok(WindowSnapshot {
                app: "Safari".into(),
                window_title: "Google - Search".into(),
            })
        });
        probe.expect_active_display().returning(|| Ok(1));
        probe
    }

    fn capturing_screen() -> MockScreenCapturer {
        let mut screen = MockScreenCapturer::new();
        screen.expect_capture().returning(|_, path| {
            std::fs::write(path, b"image").unwrap();
            Ok(())
        });
        screen
    }

    #[tokio::test]
    async fn idle_user_skips_without_side_effects() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let mut probe = MockSystemProbe::new();
        probe
            .expect_idle_time()
            .returning(|| Ok(Duration::from_secs(300)));

        // No expectations on the remaining capabilities: touching them fails
        // the test.
        let mut logger = EventLogger::new(
            Box::new(probe),
            Box::new(MockScreenCapturer::new()),
            Box::new(MockTextExtractor::new()),
            EventLogImpl::new(dir.path().join("logs"))?,
            test_clock(),
            settings(dir.path().join("tmp")),
        );

        assert_eq!(logger.run_cycle().await?, CaptureOutcome::SkippedIdle);
        assert!(!logger.event_log.has_partition(TEST_DATE));
        Ok(())
    }

    #[tokio::test]
    async fn locked_screen_skips_without_side_effects() -> Result<()> {
        let dir = tempdir()?;
        let mut probe = MockSystemProbe::new();
        probe
            .expect_idle_time()
            .returning(|| Ok(Duration::from_secs(0)));
        probe.expect_screen_locked().returning(|| Ok(true));

        let mut logger = EventLogger::new(
            Box::new(probe),
            Box::new(MockScreenCapturer::new()),
            Box::new(MockTextExtractor::new()),
            EventLogImpl::new(dir.path().join("logs"))?,
            test_clock(),
            settings(dir.path().join("tmp")),
        );

        assert_eq!(logger.run_cycle().await?, CaptureOutcome::SkippedLocked);
        assert!(!logger.event_log.has_partition(TEST_DATE));
        Ok(())
    }

    #[tokio::test]
    async fn active_cycle_appends_one_event() -> Result<()> {
        let dir = tempdir()?;
        let mut extractor = MockTextExtractor::new();
        extractor
            .expect_extract()
            .returning(|_| Ok("On-screen text".to_string()));

        let mut logger = EventLogger::new(
            Box::new(active_probe()),
            Box::new(capturing_screen()),
            Box::new(extractor),
            EventLogImpl::new(dir.path().join("logs"))?,
            test_clock(),
            settings(dir.path().join("tmp")),
        );

        assert_eq!(logger.run_cycle().await?, CaptureOutcome::Recorded);

        let events = logger.event_log.events_for(TEST_DATE).await?;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].app.as_deref(), Some("Safari"));
        assert_eq!(events[0].window_title.as_deref(), Some("Google - Search"));
        assert_eq!(events[0].display, 1);
        assert_eq!(events[0].text, "On-screen text");
        Ok(())
    }

    #[tokio::test]
    async fn window_probe_failure_degrades_to_absent_fields() -> Result<()> {
        let dir = tempdir()?;
        let mut probe = MockSystemProbe::new();
        probe
            .expect_idle_time()
            .returning(|| Ok(Duration::from_secs(0)));
        probe.expect_screen_locked().returning(|| Ok(false));
        probe
            .expect_active_window()
            .returning(|| Err(anyhow!("no accessibility permission")));
        probe.expect_active_display().returning(|| Ok(2));

        let mut extractor = MockTextExtractor::new();
        extractor.expect_extract().returning(|_| Ok(String::new()));

        let mut logger = EventLogger::new(
            Box::new(probe),
            Box::new(capturing_screen()),
            Box::new(extractor),
            EventLogImpl::new(dir.path().join("logs"))?,
            test_clock(),
            settings(dir.path().join("tmp")),
        );

        assert_eq!(logger.run_cycle().await?, CaptureOutcome::Recorded);

        let events = logger.event_log.events_for(TEST_DATE).await?;
        assert_eq!(events[0].app, None);
        assert_eq!(events[0].window_title, None);
        assert_eq!(events[0].display, 2);
        Ok(())
    }

    #[tokio::test]
    async fn extraction_failure_degrades_to_empty_text() -> Result<()> {
        let dir = tempdir()?;
        let mut extractor = MockTextExtractor::new();
        extractor
            .expect_extract()
            .returning(|_| Err(anyhow!("ocr binary crashed")));

        let mut logger = EventLogger::new(
            Box::new(active_probe()),
            Box::new(capturing_screen()),
            Box::new(extractor),
            EventLogImpl::new(dir.path().join("logs"))?,
            test_clock(),
            settings(dir.path().join("tmp")),
        );

        assert_eq!(logger.run_cycle().await?, CaptureOutcome::Recorded);

        let events = logger.event_log.events_for(TEST_DATE).await?;
        assert_eq!(events[0].text, "");
        Ok(())
    }

    #[tokio::test]
    async fn long_extraction_output_is_truncated() -> Result<()> {
        let dir = tempdir()?;
        let mut extractor = MockTextExtractor::new();
        extractor
            .expect_extract()
            .returning(|_| Ok("x".repeat(6000)));

        let mut logger = EventLogger::new(
            Box::new(active_probe()),
            Box::new(capturing_screen()),
            Box::new(extractor),
            EventLogImpl::new(dir.path().join("logs"))?,
            test_clock(),
            settings(dir.path().join("tmp")),
        );

        logger.run_cycle().await?;

        let events = logger.event_log.events_for(TEST_DATE).await?;
        assert_eq!(events[0].text.chars().count(), 5000);
        Ok(())
    }

    #[tokio::test]
    async fn capture_failure_aborts_and_writes_nothing() -> Result<()> {
        let dir = tempdir()?;
        let mut screen = MockScreenCapturer::new();
        screen
            .expect_capture()
            .returning(|_, _| Err(anyhow!("no display available")));

        let mut logger = EventLogger::new(
            Box::new(active_probe()),
            Box::new(screen),
            Box::new(MockTextExtractor::new()),
            EventLogImpl::new(dir.path().join("logs"))?,
            test_clock(),
            settings(dir.path().join("tmp")),
        );

        assert!(logger.run_cycle().await.is_err());
        assert!(!logger.event_log.has_partition(TEST_DATE));

        // The transient image is gone even on the failure path.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("tmp"))?.collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn idle_probe_failure_degrades_to_active() -> Result<()> {
        let dir = tempdir()?;
        let mut probe = MockSystemProbe::new();
        probe
            .expect_idle_time()
            .returning(|| Err(anyhow!("ioreg unavailable")));
        probe.expect_screen_locked().returning(|| Ok(false));
        probe.expect_active_window().returning(|| {
            Ok(WindowSnapshot {
                app: "Safari".into(),
                window_title: "".into(),
            })
        });
        probe.expect_active_display().returning(|| Ok(1));

        let mut extractor = MockTextExtractor::new();
        extractor.expect_extract().returning(|_| Ok(String::new()));

        let mut logger = EventLogger::new(
            Box::new(probe),
            Box::new(capturing_screen()),
            Box::new(extractor),
            EventLogImpl::new(dir.path().join("logs"))?,
            test_clock(),
            settings(dir.path().join("tmp")),
        );

        assert_eq!(logger.run_cycle().await?, CaptureOutcome::Recorded);

        let events = logger.event_log.events_for(TEST_DATE).await?;
        // Empty title normalizes to an absent field.
        assert_eq!(events[0].window_title, None);
        Ok(())
    }
}
