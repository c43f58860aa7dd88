use std::sync::Arc;

use chrono::{DateTime, Duration, Local};

use crate::storage::entities::ActivityEvent;

/// Caps applied while collecting OCR excerpts into a session. Evidence for
/// the summarizer, not an archive, so noisy screens must not blow it up.
const EXCERPT_PER_EVENT_CHARS: usize = 500;
const EXCERPT_PER_SESSION_CHARS: usize = 4000;

/// A derived, contiguous span of time attributed to one working context.
/// Sessions are rebuilt from scratch on every report run and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub app: Arc<str>,
    /// Representative window titles, unique, in first-seen order.
    pub window_titles: Vec<Arc<str>>,
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    /// Bounded concatenation of the member events' recognized text.
    pub text_excerpts: String,
}

impl Session {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    fn open_from(event: &ActivityEvent) -> Self {
        let mut session = Self {
            app: event.app_label(),
            window_titles: Vec::new(),
            start: event.timestamp,
            end: event.timestamp,
            text_excerpts: String::new(),
        };
        session.absorb(event);
        session
    }

    fn absorb(&mut self, event: &ActivityEvent) {
        self.end = event.timestamp;
        if let Some(title) = &event.window_title {
            if !self.window_titles.contains(title) {
                self.window_titles.push(title.clone());
            }
        }
        push_excerpt(&mut self.text_excerpts, &event.text);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SegmenterConfig {
    /// Largest gap between two events that still belongs to one session.
    /// With a one-minute capture interval and a tolerance of one missed
    /// cycle this is two minutes.
    pub max_gap: Duration,
}

/// Groups an ordered event sequence into contiguous work sessions. An event
/// extends the open session iff its app matches and the gap since the
/// previous event stays within [SegmenterConfig::max_gap]; window-title
/// changes alone never close a session.
pub fn segment_events(events: &[ActivityEvent], config: &SegmenterConfig) -> Vec<Session> {
    let mut sessions = Vec::<Session>::new();

    for event in events {
        match sessions.last_mut() {
            Some(open)
                if open.app == event.app_label()
                    && event.timestamp - open.end <= config.max_gap =>
            {
                open.absorb(event)
            }
            _ => sessions.push(Session::open_from(event)),
        }
    }

    sessions
}

fn push_excerpt(excerpts: &mut String, text: &str) {
    if text.is_empty() || excerpts.chars().count() >= EXCERPT_PER_SESSION_CHARS {
        return;
    }

    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return;
    }

    let remaining = EXCERPT_PER_SESSION_CHARS - excerpts.chars().count();
    let budget = remaining.min(EXCERPT_PER_EVENT_CHARS);

    if !excerpts.is_empty() {
        excerpts.push('\n');
    }
    excerpts.extend(normalized.chars().take(budget));
}
