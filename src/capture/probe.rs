//! Desktop state probe. [SystemProbe] is the contract the capture cycle
//! depends on; [MacProbe] is the concrete implementation, shelling out to
//! `osascript` and `ioreg` the way the status menu tooling on the platform
//! does. Output parsing is kept in pure helpers so it can be tested without a
//! desktop session.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::instrument;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// AppleScript returning the frontmost application name on the first line and
/// the front window title on the following lines. The title lookup is wrapped
/// in `try` since some processes expose no window.
const ACTIVE_WINDOW_SCRIPT: &str = r#"
use framework "AppKit"
use scripting additions

set frontApp to (info for (path to frontmost application))
set appName to short name of frontApp

set windowTitle to ""

try
    tell application "System Events"
        tell (first process whose frontmost is true)
            set windowTitle to name of front window
        end tell
    end tell
end try

return appName & linefeed & windowTitle
"#;

/// AppleScript resolving which display holds the frontmost window, 1-based.
const ACTIVE_DISPLAY_SCRIPT: &str = r#"
use framework "AppKit"
use scripting additions

set windowX to 0
try
    tell application "System Events"
        tell (first process whose frontmost is true)
            set windowPos to position of front window
            set windowX to item 1 of windowPos
        end tell
    end tell
end try

set screenList to current application's NSScreen's screens()
set screenCount to count of screenList

set displayNum to 1
repeat with i from 1 to screenCount
    set scr to item i of screenList
    set scrFrame to scr's frame()
    set scrX to (current application's NSMinX(scrFrame)) as integer
    set scrWidth to (current application's NSWidth(scrFrame)) as integer

    if windowX >= scrX and windowX < (scrX + scrWidth) then
        set displayNum to i
        exit repeat
    end if
end repeat

return displayNum
"#;

#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    /// Name of the foreground application. May be empty when the probe could
    /// not resolve it.
    pub app: Arc<str>,
    /// Title of the foreground window, empty for windowless processes.
    pub window_title: Arc<str>,
}

/// Intended to serve as a contract every desktop environment must implement.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SystemProbe: Send + Sync {
    /// Retrieve the amount of time the user has been inactive.
    async fn idle_time(&mut self) -> Result<Duration>;

    async fn screen_locked(&mut self) -> Result<bool>;

    async fn active_window(&mut self) -> Result<WindowSnapshot>;

    /// Index of the display holding the foreground window, 1-based.
    async fn active_display(&mut self) -> Result<u32>;
}

pub struct MacProbe;

impl MacProbe {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MacProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SystemProbe for MacProbe {
    #[instrument(skip(self))]
    async fn idle_time(&mut self) -> Result<Duration> {
        let mut command = Command::new("ioreg");
        command.args(["-c", "IOHIDSystem", "-d", "4"]);
        let output = run_probe_command(command, "idle time lookup").await?;
        parse_idle_time(&output).context("no HIDIdleTime entry in ioreg output")
    }

    #[instrument(skip(self))]
    async fn screen_locked(&mut self) -> Result<bool> {
        let mut command = Command::new("ioreg");
        command.args(["-n", "Root", "-d", "1"]);
        let output = run_probe_command(command, "lock state lookup").await?;
        Ok(parse_screen_locked(&output))
    }

    #[instrument(skip(self))]
    async fn active_window(&mut self) -> Result<WindowSnapshot> {
        let output = run_osascript(ACTIVE_WINDOW_SCRIPT, "active window lookup").await?;
        Ok(parse_window_output(&output))
    }

    #[instrument(skip(self))]
    async fn active_display(&mut self) -> Result<u32> {
        let output = run_osascript(ACTIVE_DISPLAY_SCRIPT, "active display lookup").await?;
        parse_display_number(&output).context("display lookup returned no number")
    }
}

async fn run_osascript(script: &str, what: &str) -> Result<String> {
    let mut command = Command::new("osascript");
    command.arg("-e").arg(script);
    run_probe_command(command, what).await
}

async fn run_probe_command(mut command: Command, what: &str) -> Result<String> {
    let output = tokio::time::timeout(PROBE_TIMEOUT, command.output())
        .await
        .with_context(|| format!("{what} timed out"))?
        .with_context(|| format!("{what} could not be started"))?;

    if !output.status.success() {
        bail!(
            "{what} failed with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// First line is the application name, everything after the first linefeed
/// belongs to the window title (titles can themselves contain newlines).
fn parse_window_output(output: &str) -> WindowSnapshot {
    let trimmed = output.trim_end_matches(['\n', '\r']);
    let (app, title) = match trimmed.split_once('\n') {
        Some((app, title)) => (app, title),
        None => (trimmed, ""),
    };
    WindowSnapshot {
        app: app.trim_end_matches('\r').into(),
        window_title: title.into(),
    }
}

/// `ioreg -c IOHIDSystem` reports `HIDIdleTime` in nanoseconds.
fn parse_idle_time(output: &str) -> Option<Duration> {
    for line in output.lines() {
        if !line.contains("HIDIdleTime") {
            continue;
        }
        let raw = line.rsplit_once('=')?.1.trim();
        let nanos = raw.parse::<u64>().ok()?;
        return Some(Duration::from_nanos(nanos));
    }
    None
}

/// `ioreg -n Root` exposes `CGSSessionScreenIsLocked = Yes` only while the
/// session is actually locked. Anything else counts as unlocked.
fn parse_screen_locked(output: &str) -> bool {
    for line in output.lines() {
        if !line.contains("CGSSessionScreenIsLocked") {
            continue;
        }
        let Some((_, value)) = line.rsplit_once('=') else {
            continue;
        };
        return matches!(value.trim(), "Yes" | "true" | "1");
    }
    false
}

fn parse_display_number(output: &str) -> Option<u32> {
    output.trim().parse::<u32>().ok()
}
