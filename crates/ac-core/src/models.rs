//! Demo data model
//!
//! A [`DemoFileInfo`] is the unit of work the recorder processes: one
//! demo file plus its optional event metadata. Items are built once by
//! discovery and are immutable afterwards.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EventFileError;

/// Connection parameters shared by the RCON and OBS clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Host name or address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Password used to authenticate
    pub password: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            password: String::new(),
        }
    }
}

impl ConnectionSettings {
    /// Create settings for a host/port/password triple
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
        }
    }

    /// The `host:port` address string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Kind of event attached to a demo tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DemoEventKind {
    Kill,
    Killstreak,
    Survival,
}

impl FromStr for DemoEventKind {
    type Err = EventFileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Kill" => Ok(Self::Kill),
            "Killstreak" => Ok(Self::Killstreak),
            "Survival" => Ok(Self::Survival),
            other => Err(EventFileError::UnknownEventKind(other.to_string())),
        }
    }
}

impl fmt::Display for DemoEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kill => write!(f, "Kill"),
            Self::Killstreak => write!(f, "Killstreak"),
            Self::Survival => write!(f, "Survival"),
        }
    }
}

/// A single event parsed from a demo's metadata file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoEvent {
    /// Unique id for this event
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Demo tick the event occurred at
    pub tick: u32,
    /// What happened
    pub kind: DemoEventKind,
    /// Free-form value attached by the producer (e.g. killstreak count)
    pub value: String,
    /// Optional user-assigned name
    #[serde(default)]
    pub custom_name: Option<String>,
}

impl DemoEvent {
    /// Create a new event with a fresh id
    pub fn new(tick: u32, kind: DemoEventKind, value: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tick,
            kind,
            value: value.into(),
            custom_name: None,
        }
    }
}

/// One demo file plus its optional event metadata
///
/// Events can come from two sources: the file written alongside the
/// demo by the game-side logger (`demo_events`) and events produced by
/// this tool (`clipper_events`). Either or both may be absent.
#[derive(Debug, Clone)]
pub struct DemoFileInfo {
    /// Unique id for this work item
    pub id: Uuid,
    /// Path to the `.dem` file
    pub demo_path: PathBuf,
    /// Path of the sibling event file, if one was resolved
    pub event_file_path: Option<PathBuf>,
    /// Events parsed from the event file
    pub demo_events: Option<Vec<DemoEvent>>,
    /// Events produced by autoclipper itself
    pub clipper_events: Option<Vec<DemoEvent>>,
}

impl DemoFileInfo {
    /// Create an item for a demo path with no event metadata
    pub fn new(demo_path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            demo_path: demo_path.into(),
            event_file_path: None,
            demo_events: None,
            clipper_events: None,
        }
    }

    /// File name of the demo, for logging
    pub fn file_name(&self) -> &str {
        self.demo_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("<invalid demo path>")
    }

    /// The demo path as a str for console commands
    pub fn demo_path_str(&self) -> std::borrow::Cow<'_, str> {
        self.demo_path.to_string_lossy()
    }

    /// Merge both event sources into one tick-ordered list.
    ///
    /// If both sources exist they are merged by tick (demo-file events
    /// first on ties); a single source is returned as-is; no sources
    /// yields an empty list.
    pub fn combined_events(&self) -> Vec<DemoEvent> {
        match (&self.demo_events, &self.clipper_events) {
            (Some(demo), Some(clipper)) => merge_by_tick(demo, clipper),
            (Some(demo), None) => demo.clone(),
            (None, Some(clipper)) => clipper.clone(),
            (None, None) => Vec::new(),
        }
    }
}

/// Stable two-way merge of tick-ordered event lists
fn merge_by_tick(left: &[DemoEvent], right: &[DemoEvent]) -> Vec<DemoEvent> {
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if left[i].tick <= right[j].tick {
            merged.push(left[i].clone());
            i += 1;
        } else {
            merged.push(right[j].clone());
            j += 1;
        }
    }
    merged.extend_from_slice(&left[i..]);
    merged.extend_from_slice(&right[j..]);
    merged
}

/// Resolve the default event file path for a demo path.
///
/// The game-side logger writes its event file next to the demo with
/// the extension swapped to `.json`.
pub fn default_event_file_path(demo_path: &Path) -> PathBuf {
    demo_path.with_extension("json")
}
