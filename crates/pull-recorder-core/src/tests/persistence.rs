use crate::{
    capture::{CaptureSourceDescriptor, SourceKind},
    persistence::{
        CatalogEntry, CatalogItem, FsRecordingStore, PersistenceService, display_name,
        merge_catalog, recording_file_name, sanitize_name,
    },
    recording::{RecordingSession, SessionStatus, TriggerOrigin},
};

use std::path::PathBuf;

use chrono::{Duration as ChronoDuration, Local, NaiveDate, NaiveDateTime};

#[allow(clippy::unwrap_used)]
fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 5)
        .and_then(|d| d.and_hms_opt(h, m, s))
        .unwrap()
}

/// WHAT: File names follow YYYYMMDD_HHMMSS_<name>.<ext>
/// WHY: Catalog ordering and name derivation depend on the exact format
#[test]
fn given_name_with_punctuation_when_naming_file_then_sanitized_timestamped_name() {
    let name = recording_file_name(at(14, 2, 9), "My Pull!!", "webm");
    assert_eq!(name, "20240305_140209_My Pull.webm");
}

/// WHAT: Sanitizing drops disallowed characters (tabs included), collapses spaces, trims, truncates and defaults
/// WHY: Names come from users and must be safe file names
#[test]
fn given_awkward_names_when_sanitizing_then_safe_names() {
    assert_eq!(sanitize_name("  a   b   c  "), "a b c");
    assert_eq!(sanitize_name("  a\t\tb   c  "), "ab c");
    assert_eq!(sanitize_name("a\tb"), "ab");
    assert_eq!(sanitize_name("Boss\nPull"), "BossPull");
    assert_eq!(sanitize_name("../../etc/passwd"), "....etcpasswd");
    assert_eq!(sanitize_name("!!!"), "Pull");
    assert_eq!(sanitize_name(""), "Pull");
    assert_eq!(sanitize_name(&"x".repeat(200)).len(), 80);
}

/// WHAT: Display name strips the timestamp prefix only when present
/// WHY: Files dropped in by hand keep their own names
#[test]
fn given_file_stems_when_deriving_display_name_then_prefix_removed() {
    assert_eq!(display_name("20240305_140209_My Pull"), "My Pull");
    assert_eq!(display_name("20240305_140209_Pull 14-02-09_1"), "Pull 14-02-09_1");
    assert_eq!(display_name("holiday_clip"), "holiday_clip");
}

/// WHAT: Saved file is listed with matching name, newest first
/// WHY: A completed session must show up in the recordings list
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_saved_recordings_when_listing_then_entries_newest_first() {
    // Given: Two recordings saved a second apart plus a non-video file
    let dir = tempfile::tempdir().unwrap();
    let store = FsRecordingStore::new(dir.path());
    let first = store.save_at(b"first", "Early Pull", "webm", at(14, 0, 0)).await.unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"not a video").unwrap();
    std::thread::sleep(std::time::Duration::from_millis(20));
    let second = store.save_at(b"second!", "Late Pull", "webm", at(14, 5, 0)).await.unwrap();

    // When: Listing
    let entries = store.list().await.unwrap();

    // Then: Only videos, newest first, names derived from the stem
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].id, second.filename);
    assert_eq!(entries[0].name, "Late Pull");
    assert_eq!(entries[0].size_bytes, 7);
    assert_eq!(entries[1].id, first.filename);
    assert_eq!(entries[1].name, "Early Pull");
    assert!(entries[0].mtime_ms >= entries[1].mtime_ms);
}

/// WHAT: Name collisions get a numeric suffix
/// WHY: Two pulls in the same second must not overwrite each other
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_same_name_and_second_when_saving_twice_then_suffixed() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRecordingStore::new(dir.path());

    let a = store.save_at(b"a", "Pull", "webm", at(9, 0, 0)).await.unwrap();
    let b = store.save_at(b"b", "Pull", "webm", at(9, 0, 0)).await.unwrap();

    assert_eq!(a.filename, "20240305_090000_Pull.webm");
    assert_eq!(b.filename, "20240305_090000_Pull_1.webm");
    assert_eq!(std::fs::read(&b.path).unwrap(), b"b");
}

/// WHAT: Missing directory lists as empty and is created on save
/// WHY: First launch has no recordings directory yet
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_missing_directory_when_listing_then_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRecordingStore::new(dir.path().join("recordings"));

    assert!(store.list().await.unwrap().is_empty());
    store.save(b"data", "Pull", "webm").await.unwrap();
    assert_eq!(store.list().await.unwrap().len(), 1);
}

/// WHAT: Portable URI embeds the file as base64
/// WHY: Players that block file URLs can still play the recording
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_saved_file_when_reading_portable_uri_then_base64_data_uri() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRecordingStore::new(dir.path());
    let saved = store.save_at(b"hello", "Pull", "webm", at(9, 0, 0)).await.unwrap();

    let uri = store.read_as_portable_uri(&saved.path).await.unwrap();

    assert_eq!(uri, "data:video/webm;base64,aGVsbG8=");
}

/// WHAT: Catalog ids cannot escape the recordings directory
/// WHY: Ids arrive from HTTP requests
#[test]
fn given_traversal_ids_when_resolving_then_rejected() {
    let store = FsRecordingStore::new("/recordings");
    assert_eq!(
        store.path_for_id("20240305_090000_Pull.webm"),
        Some(PathBuf::from("/recordings/20240305_090000_Pull.webm"))
    );
    assert_eq!(store.path_for_id("../secret.webm"), None);
    assert_eq!(store.path_for_id(".hidden.tmp"), None);
    assert_eq!(store.path_for_id(""), None);
}

fn session(file_name: Option<&str>, minutes_ago: i64) -> RecordingSession {
    let mut session = RecordingSession::begin(
        CaptureSourceDescriptor::new("w1", SourceKind::Window, "Game"),
        TriggerOrigin::Automatic,
    );
    session.started_at = Local::now() - ChronoDuration::minutes(minutes_ago);
    session.status = SessionStatus::Completed;
    session.file_name = file_name.map(str::to_string);
    session
}

fn entry(id: &str, minutes_ago: i64) -> CatalogEntry {
    CatalogEntry {
        id: id.to_string(),
        name: display_name(id.trim_end_matches(".webm")),
        path: PathBuf::from("/recordings").join(id),
        mtime_ms: (Local::now() - ChronoDuration::minutes(minutes_ago)).timestamp_millis(),
        size_bytes: 1,
    }
}

/// WHAT: Merge dedups persisted sessions and sorts newest first
/// WHY: A session saved to disk must be listed once
#[test]
fn given_sessions_and_entries_when_merging_then_deduplicated_newest_first() {
    // Given: One persisted session, one in-memory only, two files
    let persisted = session(Some("20240305_140000_A.webm"), 5);
    let ephemeral = session(None, 1);
    let entries = vec![entry("20240305_140000_A.webm", 4), entry("20240305_130000_B.webm", 60)];

    // When: Merging
    let items = merge_catalog(&[persisted, ephemeral.clone()], &entries);

    // Then: Three rows, in-memory session first, file A once
    assert_eq!(items.len(), 3);
    assert_eq!(items[0], CatalogItem::Live(ephemeral));
    assert!(matches!(&items[1], CatalogItem::Persisted(e) if e.id == "20240305_140000_A.webm"));
    assert!(matches!(&items[2], CatalogItem::Persisted(e) if e.id == "20240305_130000_B.webm"));
}
