//! Integration tests for recording enumeration and search.
//!
//! These tests require the `mock` feature, which the dev-dependencies enable.

#![cfg(feature = "mock")]

use tlog_replay::{
    CatalogFilter, JournalEntry, LogsWindow, MemorySource, RecordingCatalog, ReplayError,
    search_positions,
};

fn message(id: u64, pos: u64, out_txt: &str) -> String {
    serde_json::json!({
        "ver": "2.3", "host": "h", "rec": "r", "user": "u", "term": "xterm", "session": 1,
        "id": id, "pos": pos, "timing": format!(">{}", out_txt.chars().count()),
        "in_txt": "", "out_txt": out_txt,
    })
    .to_string()
}

fn entry(cursor: &str, rec: &str, user: &str, ts_ms: u64, body: String) -> JournalEntry {
    JournalEntry::new(cursor, body)
        .with_field("_COMM", "tlog-rec-sessio")
        .with_field("TLOG_REC", rec)
        .with_field("TLOG_USER", user)
        .with_field("TLOG_SESSION", "7")
        .with_field("_HOSTNAME", "build01")
        .with_field("_BOOT_ID", "b00t")
        .with_field("__REALTIME_TIMESTAMP", (ts_ms * 1000).to_string())
}

fn journal() -> MemorySource {
    MemorySource::with_entries([
        entry("c1", "rec-b", "bob", 50_000, message(1, 0, "make")),
        entry("c2", "rec-a", "alice", 10_000, message(1, 0, "ls")),
        entry("c3", "rec-a", "alice", 70_000, message(2, 60_000, "rm -rf build")),
        entry("c4", "rec-b", "bob", 52_000, message(2, 2_000, "build ok")),
        JournalEntry::new("c5", "unrelated").with_field("_COMM", "sshd"),
    ])
}

#[tokio::test]
async fn lists_recordings_by_start() {
    let catalog = RecordingCatalog::load(&journal(), &CatalogFilter::new()).await.unwrap();

    let ids: Vec<_> = catalog.recordings().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["rec-a", "rec-b"]);

    let alice = catalog.get("rec-a").unwrap();
    assert_eq!(alice.user.as_deref(), Some("alice"));
    assert_eq!(alice.session_id, Some(7));
    assert_eq!(alice.boot_id.as_deref(), Some("b00t"));
    assert_eq!(alice.duration(), 60_000);
    assert_eq!(alice.matches, ["TLOG_REC=rec-a"]);
    assert!(!catalog.has_multiple_hosts());
}

#[tokio::test]
async fn filters_by_user_and_text() {
    let source = journal();
    let catalog = RecordingCatalog::load(&source, &CatalogFilter::new().user("bob")).await.unwrap();
    assert_eq!(catalog.len(), 1);
    assert!(catalog.get("rec-b").is_some());

    let catalog = RecordingCatalog::load(&source, &CatalogFilter::new().search("rm -rf"))
        .await
        .unwrap();
    assert_eq!(catalog.len(), 1);
    assert!(catalog.get("rec-a").is_some());
}

#[tokio::test]
async fn filters_by_time_window() {
    let filter = CatalogFilter::new().since(40_000).until(60_000);
    let catalog = RecordingCatalog::load(&journal(), &filter).await.unwrap();
    assert_eq!(catalog.len(), 1);
    let bob = catalog.get("rec-b").unwrap();
    assert_eq!((bob.start, bob.end), (50_000, 52_000));
}

#[tokio::test]
async fn logs_window_reads_host_journal() {
    let source = journal();
    let host_log = |cursor: &str, ts_ms: u64| {
        JournalEntry::new(cursor, "sshd: session opened")
            .with_field("_HOSTNAME", "build01")
            .with_field("__REALTIME_TIMESTAMP", (ts_ms * 1000).to_string())
    };
    source.push(host_log("l1", 20_000));
    source.push(host_log("l2", 5_000_000));

    let catalog = RecordingCatalog::load(&source, &CatalogFilter::new()).await.unwrap();
    let mut window = LogsWindow::for_recording(catalog.get("rec-a").unwrap());

    let entries = window.load(&source).await.unwrap();
    let cursors: Vec<_> = entries.iter().filter_map(|e| e.cursor.as_deref()).collect();
    assert_eq!(cursors, ["c1", "c2", "c3", "c4", "l1"]);

    window.load_later(entries.last().and_then(|e| e.cursor.clone()));
    let later = window.load(&source).await.unwrap();
    assert_eq!(later.len(), 1);
    assert_eq!(later[0].cursor.as_deref(), Some("l2"));
}

#[tokio::test]
async fn load_fails_with_transport() {
    let source = journal();
    source.fail(ReplayError::stream("journal rotated away"));
    let err = RecordingCatalog::load(&source, &CatalogFilter::new()).await.unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn search_finds_positions() {
    let source = journal();
    let matches = vec!["TLOG_REC=rec-b".to_string()];
    let hits = search_positions(&source, &matches, "build").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!((hits[0].id, hits[0].pos), (2, 2_000));

    let all = vec!["_COMM=tlog-rec-sessio".to_string()];
    let hits = search_positions(&source, &all, "build").await.unwrap();
    let positions: Vec<_> = hits.iter().map(|h| h.pos).collect();
    assert_eq!(positions, [60_000, 2_000]);
}

#[tokio::test]
async fn search_skips_unparsable_entries() {
    let source = journal();
    source.push(
        JournalEntry::new("c6", "build log, not json")
            .with_field("TLOG_REC", "rec-b"),
    );
    let matches = vec!["TLOG_REC=rec-b".to_string()];
    let hits = search_positions(&source, &matches, "build").await.unwrap();
    assert_eq!(hits.len(), 1);
}
