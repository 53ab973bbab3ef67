use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use regex::Regex;
use serde_derive::Deserialize;

use super::CalendarSignal;

/// Hosts that mark an event as an online meeting.
pub const DEFAULT_MEETING_MARKERS: &[&str] = &[
    "zoom.us",
    "teams.microsoft.com",
    "meet.google.com",
    "webex.com",
];

#[derive(Deserialize, Debug, Clone)]
pub struct CalendarEvent {
    #[serde(default)]
    pub title: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl CalendarEvent {
    fn covers(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now <= self.end
    }

    fn looks_like_meeting(&self, markers: &Regex) -> bool {
        let blob = [&self.location, &self.notes, &self.url]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        markers.is_match(&blob)
    }
}

/// True when some event spans `now` and mentions a meeting platform.
pub fn ongoing_meeting(events: &[CalendarEvent], now: DateTime<Utc>, markers: &Regex) -> bool {
    events
        .iter()
        .filter(|event| event.covers(now))
        .any(|event| {
            let matched = event.looks_like_meeting(markers);
            if matched {
                debug!(
                    "Ongoing meeting event: {}",
                    event.title.as_deref().unwrap_or("<untitled>")
                );
            }
            matched
        })
}

fn marker_regex(markers: &[String]) -> anyhow::Result<Regex> {
    let alternation = markers
        .iter()
        .map(|marker| regex::escape(marker))
        .collect::<Vec<_>>()
        .join("|");
    Ok(Regex::new(&format!("(?i)({})", alternation))?)
}

/// Calendar backed by a JSON export of events, re-read on every query so that
/// an external sync job can rewrite it at any time.
#[derive(Debug, Clone)]
pub struct EventFileCalendar {
    path: PathBuf,
    markers: Regex,
}

impl EventFileCalendar {
    pub fn new(path: impl Into<PathBuf>, markers: Option<Vec<String>>) -> anyhow::Result<Self> {
        let markers = markers
            .filter(|markers| !markers.is_empty())
            .unwrap_or_else(|| {
                DEFAULT_MEETING_MARKERS
                    .iter()
                    .map(|marker| marker.to_string())
                    .collect()
            });

        Ok(EventFileCalendar {
            path: path.into(),
            markers: marker_regex(&markers)?,
        })
    }

    fn load_events(&self) -> anyhow::Result<Vec<CalendarEvent>> {
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl CalendarSignal for EventFileCalendar {
    fn query(&self) -> bool {
        match self.load_events() {
            Ok(events) => ongoing_meeting(&events, Utc::now(), &self.markers),
            Err(err) => {
                warn!("Calendar unavailable at {}: {}", self.path.display(), err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(start_offset_min: i64, end_offset_min: i64, location: &str) -> CalendarEvent {
        let now = Utc::now();
        CalendarEvent {
            title: Some("Standup".to_string()),
            start: now + Duration::minutes(start_offset_min),
            end: now + Duration::minutes(end_offset_min),
            location: Some(location.to_string()),
            notes: None,
            url: None,
        }
    }

    fn default_markers() -> Regex {
        let markers: Vec<String> = DEFAULT_MEETING_MARKERS.iter().map(|m| m.to_string()).collect();
        marker_regex(&markers).unwrap()
    }

    #[test]
    fn test_current_event_with_marker_matches() {
        let events = vec![event(-10, 20, "https://ACME.zoom.us/j/123")];
        assert!(ongoing_meeting(&events, Utc::now(), &default_markers()));
    }

    #[test]
    fn test_future_or_past_events_do_not_match() {
        let events = vec![
            event(10, 40, "https://meet.google.com/abc"),
            event(-60, -30, "https://meet.google.com/abc"),
        ];
        assert!(!ongoing_meeting(&events, Utc::now(), &default_markers()));
    }

    #[test]
    fn test_event_without_marker_does_not_match() {
        let events = vec![event(-10, 20, "Room 4B")];
        assert!(!ongoing_meeting(&events, Utc::now(), &default_markers()));
    }

    #[test]
    fn test_marker_dots_are_literal() {
        let events = vec![event(-10, 20, "zoomXus")];
        assert!(!ongoing_meeting(&events, Utc::now(), &default_markers()));
    }

    #[test]
    fn test_event_file_calendar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        let now = Utc::now();
        let json = format!(
            r#"[{{"title": "1:1", "start": "{}", "end": "{}", "notes": "Join at https://teams.microsoft.com/l/meetup"}}]"#,
            (now - Duration::minutes(5)).to_rfc3339(),
            (now + Duration::minutes(25)).to_rfc3339(),
        );
        std::fs::write(&path, json).unwrap();

        let calendar = EventFileCalendar::new(&path, None).unwrap();
        assert!(calendar.query());

        let custom = EventFileCalendar::new(&path, Some(vec!["jitsi".to_string()])).unwrap();
        assert!(!custom.query());
    }

    #[test]
    fn test_missing_or_invalid_file_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        let calendar = EventFileCalendar::new(&path, None).unwrap();
        assert!(!calendar.query());

        std::fs::write(&path, "{not json").unwrap();
        assert!(!calendar.query());
    }
}
