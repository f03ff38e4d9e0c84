//! Demo file discovery
//!
//! Builds [`DemoFileInfo`] work items from demo paths before the
//! recorder starts. A demo may carry a sibling JSON event file
//! (same path, `.json` extension) written by the game-side logger.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::EventFileError;
use crate::models::{default_event_file_path, DemoEvent, DemoEventKind, DemoFileInfo};

/// On-disk shape of a game-side event file.
///
/// Accepts both the lowercase keys this tool writes and the PascalCase
/// keys the original game-side logger produced.
#[derive(Debug, Deserialize)]
struct RawEventFile {
    #[serde(alias = "Events")]
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(alias = "Name")]
    name: String,
    #[serde(alias = "Value")]
    value: String,
    #[serde(alias = "Tick")]
    tick: u32,
}

/// List all files with the given extension in a directory.
///
/// `ext` is matched without its leading dot (`"dem"`, not `".dem"`).
pub fn list_files_with_extension(
    dir: &Path,
    ext: &str,
    recursive: bool,
) -> Result<Vec<PathBuf>, EventFileError> {
    let mut found = Vec::new();
    collect_files(dir, ext, recursive, &mut found)?;
    found.sort();
    Ok(found)
}

fn collect_files(
    dir: &Path,
    ext: &str,
    recursive: bool,
    found: &mut Vec<PathBuf>,
) -> Result<(), EventFileError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                collect_files(&path, ext, recursive, found)?;
            }
        } else if path.extension().and_then(|e| e.to_str()) == Some(ext) {
            found.push(path);
        }
    }
    Ok(())
}

/// Build a work item from a demo path.
///
/// The demo file must exist. The event file path defaults to the demo
/// path with its extension changed to `.json`; a missing event file is
/// not an error, the item simply carries no events.
pub fn demo_file_info_from_path(
    demo_path: &Path,
    event_file_path: Option<&Path>,
) -> Result<DemoFileInfo, EventFileError> {
    if !demo_path.is_file() {
        return Err(EventFileError::DemoNotFound(demo_path.to_path_buf()));
    }

    let event_path = event_file_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_event_file_path(demo_path));

    let mut info = DemoFileInfo::new(demo_path);
    info.event_file_path = Some(event_path.clone());

    if event_path.is_file() {
        let events = parse_event_file(&event_path)?;
        if !events.is_empty() {
            info.demo_events = Some(events);
        }
    } else {
        tracing::debug!("No event file next to {}", demo_path.display());
    }

    Ok(info)
}

/// Build work items for every `.dem` file in a directory
pub fn discover_demos(dir: &Path, recursive: bool) -> Result<Vec<DemoFileInfo>, EventFileError> {
    let mut items = Vec::new();
    for demo_path in list_files_with_extension(dir, "dem", recursive)? {
        items.push(demo_file_info_from_path(&demo_path, None)?);
    }
    Ok(items)
}

fn parse_event_file(path: &Path) -> Result<Vec<DemoEvent>, EventFileError> {
    let contents = std::fs::read_to_string(path)?;
    let raw: RawEventFile =
        serde_json::from_str(&contents).map_err(|source| EventFileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut events = Vec::with_capacity(raw.events.len());
    for raw_event in raw.events {
        let kind: DemoEventKind = raw_event.name.parse()?;
        events.push(DemoEvent::new(raw_event.tick, kind, raw_event.value));
    }
    Ok(events)
}
