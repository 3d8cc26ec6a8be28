use crate::recording::RecordingSession;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A stored recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// File name, unique within the recordings directory.
    pub id: String,
    /// Display name derived from the file name.
    pub name: String,
    /// Absolute path.
    pub path: PathBuf,
    /// Last modification, milliseconds since the Unix epoch.
    pub mtime_ms: i64,
    /// File size.
    pub size_bytes: u64,
}

/// One row of the recordings list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CatalogItem {
    /// A session known to this process and not (yet) on disk.
    Live(RecordingSession),
    /// A file in the recordings directory.
    Persisted(CatalogEntry),
}

impl CatalogItem {
    /// Sort key, milliseconds since the Unix epoch.
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            CatalogItem::Live(session) => session.started_at.timestamp_millis(),
            CatalogItem::Persisted(entry) => entry.mtime_ms,
        }
    }
}

/// Merge in-memory sessions with stored entries, most recent first.
///
/// Sessions whose file already appears in `entries` are listed once, as
/// the stored entry.
pub fn merge_catalog(sessions: &[RecordingSession], entries: &[CatalogEntry]) -> Vec<CatalogItem> {
    let live = sessions.iter().filter(|session| {
        session
            .file_name
            .as_deref()
            .is_none_or(|name| !entries.iter().any(|entry| entry.id == name))
    });

    let mut items: Vec<CatalogItem> = live
        .cloned()
        .map(CatalogItem::Live)
        .chain(entries.iter().cloned().map(CatalogItem::Persisted))
        .collect();

    items.sort_by_key(|item| std::cmp::Reverse(item.timestamp_ms()));
    items
}
