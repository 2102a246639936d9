use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{info, warn};

const DATE_FORMATS: &[&str] = &["%B %d, %Y", "%b %d, %Y", "%Y-%m-%d"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum Arm {
    Left,
    #[default]
    Right,
}

impl Arm {
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().to_ascii_lowercase();
        if s.starts_with("left") || s == "l" {
            Some(Arm::Left)
        } else if s.starts_with("righ") || s == "r" {
            Some(Arm::Right)
        } else {
            None
        }
    }
}

// Scraped feeds mostly say "Right"/"Left" but casing drifts; unknown values
// fall back to the right arm like the scrapers do.
impl<'de> Deserialize<'de> for Arm {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(Arm::default());
        };
        Ok(Arm::parse(&raw).unwrap_or_else(|| {
            warn!(arm = %raw, "unknown arm, assuming right");
            Arm::default()
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub participants: Vec<String>,
    #[serde(default)]
    pub winner: String,
    #[serde(default)]
    pub loser: Option<String>,
    #[serde(default)]
    pub score: String,
    #[serde(default)]
    pub arm: Arm,
    #[serde(default)]
    pub weight_category: Option<String>,
    #[serde(default)]
    pub is_title: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_title: String,
    #[serde(default)]
    pub event_date: String,
    #[serde(default)]
    pub event_location: Option<String>,
    #[serde(default)]
    pub matches: Vec<Match>,
}

impl Event {
    /// Parsed event date; `None` when the scraped string is in no known format.
    pub fn date(&self) -> Option<NaiveDate> {
        parse_event_date(&self.event_date)
    }
}

pub fn parse_event_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Parse an event list, skipping individual events that fail to deserialize.
pub fn parse_events_json(raw: &str, source: &str) -> Result<Vec<Event>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(trimmed).context("invalid events json")?;
    let Some(items) = value.as_array() else {
        return Err(anyhow!("events file {source} is not a json array"));
    };

    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        match serde_json::from_value::<Event>(item.clone()) {
            Ok(event) => out.push(event),
            Err(err) => warn!(source, index = idx, error = %err, "skipping malformed event"),
        }
    }
    Ok(out)
}

pub fn load_events_file(path: &Path) -> Result<Vec<Event>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read events file {}", path.display()))?;
    let events = parse_events_json(&raw, &path.display().to_string())?;
    info!(path = %path.display(), events = events.len(), "loaded events");
    Ok(events)
}

/// Concatenate several federation files in the given order. A file that
/// cannot be read or parsed is skipped with a warning.
pub fn load_events_files(paths: &[impl AsRef<Path>]) -> Vec<Event> {
    let mut out = Vec::new();
    for path in paths {
        match load_events_file(path.as_ref()) {
            Ok(events) => out.extend(events),
            Err(err) => warn!(error = %format!("{err:#}"), "skipping events file"),
        }
    }
    out
}
