//! Enumerating recordings found in a journal.
//!
//! Every tlog message entry carries the ID of its recording in `TLOG_REC`.
//! The catalog folds entries into one [`Recording`] per ID, tracking the
//! time span covered, and keeps the list ordered by start time.

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;

use crate::error::Result;
use crate::journal::{JournalEntry, JournalQuery, JournalSource};

/// Process names tlog records under. The kernel truncates names to 15
/// characters, so `tlog-rec-session` shows up as `tlog-rec-sessio`.
pub const RECORDER_COMMANDS: [&str; 2] = ["tlog-rec", "tlog-rec-sessio"];

/// One recorded session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    /// Recording ID.
    pub id: String,
    /// Recorded user.
    pub user: Option<String>,
    /// Boot the recording was made in.
    pub boot_id: Option<String>,
    /// Audit session ID.
    pub session_id: Option<u64>,
    /// PID of the recorder.
    pub pid: Option<u64>,
    /// Host the recording was made on.
    pub hostname: Option<String>,
    /// Wall-clock time of the earliest entry, ms since the epoch.
    pub start: u64,
    /// Wall-clock time of the latest entry, ms since the epoch.
    pub end: u64,
    /// Journal matches selecting this recording's entries.
    pub matches: Vec<String>,
}

impl Recording {
    /// Time between the first and last entry, in milliseconds.
    #[must_use]
    pub const fn duration(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

/// Which recordings to list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    /// Only recordings of this user.
    pub user: Option<String>,
    /// Only recordings made on this host.
    pub hostname: Option<String>,
    /// Only this recording.
    pub recording: Option<String>,
    /// Only recordings whose messages contain this text. Ignored when a
    /// single recording is selected.
    pub search: Option<String>,
    /// Only entries logged at or after this time, ms since the epoch.
    pub since: Option<u64>,
    /// Only entries logged at or before this time, ms since the epoch.
    pub until: Option<u64>,
}

impl CatalogFilter {
    /// Match everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a user.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Restrict to a host.
    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Restrict to one recording.
    #[must_use]
    pub fn recording(mut self, id: impl Into<String>) -> Self {
        self.recording = Some(id.into());
        self
    }

    /// Restrict to recordings containing `text`.
    #[must_use]
    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    /// Restrict to entries logged from `ms` on.
    #[must_use]
    pub const fn since(mut self, ms: u64) -> Self {
        self.since = Some(ms);
        self
    }

    /// Restrict to entries logged up to `ms`.
    #[must_use]
    pub const fn until(mut self, ms: u64) -> Self {
        self.until = Some(ms);
        self
    }

    /// The journal query listing the selected recordings' entries.
    #[must_use]
    pub fn query(&self) -> JournalQuery {
        let mut query = JournalQuery::new(journal_matches(self));
        query.since = self.since;
        query.until = self.until;
        if self.recording.is_none() {
            query.grep = self.search.clone().filter(|s| !s.is_empty());
        }
        query
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

/// Build the journal match list for `filter`.
#[must_use]
pub fn journal_matches(filter: &CatalogFilter) -> Vec<String> {
    let mut matches: Vec<String> = RECORDER_COMMANDS
        .iter()
        .map(|comm| format!("_COMM={comm}"))
        .collect();
    if let Some(user) = non_empty(filter.user.as_ref()) {
        matches.push(format!("TLOG_USER={user}"));
    }
    if let Some(hostname) = non_empty(filter.hostname.as_ref()) {
        matches.push(format!("_HOSTNAME={hostname}"));
    }
    if let Some(id) = non_empty(filter.recording.as_ref()) {
        matches.push(format!("TLOG_REC={id}"));
    }
    matches
}

/// Recordings seen so far, ordered by start time.
#[derive(Debug, Clone, Default)]
pub struct RecordingCatalog {
    recordings: Vec<Recording>,
    /// Recording ID to position in `recordings`.
    index: HashMap<String, usize>,
    first_hostname: Option<Option<String>>,
    diff_hosts: bool,
}

impl RecordingCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every entry `filter` selects from `source` and catalog them.
    pub async fn load(source: &dyn JournalSource, filter: &CatalogFilter) -> Result<Self> {
        let mut catalog = Self::new();
        let mut stream = source.open(&filter.query());
        while let Some(item) = stream.next().await {
            catalog.ingest(std::slice::from_ref(&item?));
        }
        tracing::debug!(recordings = catalog.len(), "Recording list loaded");
        Ok(catalog)
    }

    /// Recordings ordered by start time.
    #[must_use]
    pub fn recordings(&self) -> &[Recording] {
        &self.recordings
    }

    /// Look a recording up by ID.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Recording> {
        self.index.get(id).map(|&i| &self.recordings[i])
    }

    /// Number of recordings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recordings.len()
    }

    /// Check if no recordings were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }

    /// Check if recordings come from more than one host.
    #[must_use]
    pub const fn has_multiple_hosts(&self) -> bool {
        self.diff_hosts
    }

    /// Fold a batch of entries into the catalog.
    pub fn ingest(&mut self, entries: &[JournalEntry]) {
        for entry in entries {
            self.ingest_entry(entry);
        }
    }

    fn ingest_entry(&mut self, entry: &JournalEntry) {
        let Some(id) = entry.field("TLOG_REC") else {
            return;
        };
        let Some(ts) = entry.realtime_ms() else {
            tracing::debug!(%id, "Skipping entry without a timestamp");
            return;
        };

        let Some(at) = self.index.get(&id).copied() else {
            let hostname = entry.field("_HOSTNAME");
            let first = self.first_hostname.get_or_insert_with(|| hostname.clone());
            if *first != hostname {
                self.diff_hosts = true;
            }
            tracing::trace!(%id, "New recording");
            self.insert(Recording {
                matches: vec![format!("TLOG_REC={id}")],
                user: entry.field("TLOG_USER"),
                boot_id: entry.field("_BOOT_ID"),
                session_id: entry.field("TLOG_SESSION").and_then(|s| s.parse().ok()),
                pid: entry.field("_PID").and_then(|s| s.parse().ok()),
                hostname,
                start: ts,
                end: ts,
                id,
            });
            return;
        };

        let recording = &mut self.recordings[at];
        recording.end = recording.end.max(ts);
        if ts < recording.start {
            let mut recording = self.recordings.remove(at);
            recording.start = ts;
            self.insert(recording);
        }
    }

    /// Insert after every recording starting no later than `recording`.
    fn insert(&mut self, recording: Recording) {
        let at = self.recordings.partition_point(|r| r.start <= recording.start);
        self.recordings.insert(at, recording);
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index = self
            .recordings
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
    }
}

/// A slice of the system journal of the host a recording was made on,
/// for reading what else happened around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogsWindow {
    matches: Vec<String>,
    start: u64,
    end: u64,
    after: Option<String>,
}

impl LogsWindow {
    /// Span covered by a new window and added by [`load_later`](Self::load_later).
    pub const SPAN: Duration = Duration::from_secs(3600);

    /// The first [`SPAN`](Self::SPAN) of logs from the start of `recording`.
    #[must_use]
    pub fn for_recording(recording: &Recording) -> Self {
        Self {
            matches: recording
                .hostname
                .iter()
                .map(|host| format!("_HOSTNAME={host}"))
                .collect(),
            start: recording.start,
            end: recording.start.saturating_add(span_ms()),
            after: None,
        }
    }

    /// Window start, ms since the epoch.
    #[must_use]
    pub const fn start(&self) -> u64 {
        self.start
    }

    /// Window end, ms since the epoch.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.end
    }

    /// End the window `pos` ms into the recording, to follow playback.
    pub const fn end_at(&mut self, pos: u64) {
        self.end = self.start.saturating_add(pos);
    }

    /// Move on to the next [`SPAN`](Self::SPAN), continuing after the last
    /// entry already read.
    pub fn load_later(&mut self, last_cursor: Option<String>) {
        self.start = self.end;
        self.end = self.end.saturating_add(span_ms());
        self.after = last_cursor;
    }

    /// The journal query for this window. A continuation starts after the
    /// remembered cursor instead of at the window start.
    #[must_use]
    pub fn query(&self) -> JournalQuery {
        let mut query = JournalQuery::new(self.matches.clone()).until(self.end);
        match &self.after {
            Some(cursor) => query.after = Some(cursor.clone()),
            None => query.since = Some(self.start),
        }
        query
    }

    /// Read every entry in the window.
    pub async fn load(&self, source: &dyn JournalSource) -> Result<Vec<JournalEntry>> {
        let mut stream = source.open(&self.query());
        let mut entries = Vec::new();
        while let Some(item) = stream.next().await {
            entries.push(item?);
        }
        tracing::debug!(
            start = self.start,
            end = self.end,
            entries = entries.len(),
            "Logs loaded"
        );
        Ok(entries)
    }
}

const fn span_ms() -> u64 {
    LogsWindow::SPAN.as_secs() * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(rec: &str, ts_ms: u64, host: &str) -> JournalEntry {
        JournalEntry::new(format!("c-{rec}-{ts_ms}"), "{}")
            .with_field("TLOG_REC", rec)
            .with_field("__REALTIME_TIMESTAMP", (ts_ms * 1000).to_string())
            .with_field("_HOSTNAME", host)
            .with_field("_PID", "42")
            .with_field("TLOG_USER", "alice")
    }

    #[test]
    fn matches_for_filter() {
        let filter = CatalogFilter::new().user("alice").hostname("");
        assert_eq!(
            journal_matches(&filter),
            ["_COMM=tlog-rec", "_COMM=tlog-rec-sessio", "TLOG_USER=alice"]
        );
    }

    #[test]
    fn time_window_reaches_query() {
        let query = CatalogFilter::new().since(1_000).until(9_000).query();
        assert_eq!((query.since, query.until), (Some(1_000), Some(9_000)));
        assert_eq!(CatalogFilter::new().query().since, None);
    }

    #[test]
    fn logs_window_moves_forward() {
        let mut catalog = RecordingCatalog::new();
        catalog.ingest(&[entry("a", 10_000, "h")]);
        let mut window = LogsWindow::for_recording(catalog.get("a").unwrap());

        let query = window.query();
        assert_eq!(query.matches, ["_HOSTNAME=h"]);
        assert_eq!((query.since, query.until), (Some(10_000), Some(3_610_000)));

        window.end_at(90_000);
        assert_eq!(window.end(), 100_000);

        window.load_later(Some("s=9".into()));
        let query = window.query();
        assert_eq!(window.start(), 100_000);
        assert_eq!(query.since, None);
        assert_eq!(query.after.as_deref(), Some("s=9"));
        assert_eq!(query.until, Some(3_700_000));
    }

    #[test]
    fn search_dropped_for_single_recording() {
        let query = CatalogFilter::new().search("rm").recording("r1").query();
        assert_eq!(query.grep, None);
        assert!(query.matches.contains(&"TLOG_REC=r1".to_string()));
        assert_eq!(CatalogFilter::new().search("rm").query().grep.as_deref(), Some("rm"));
    }

    #[test]
    fn folds_entries_per_recording() {
        let mut catalog = RecordingCatalog::new();
        catalog.ingest(&[entry("a", 1_000, "h"), entry("a", 4_000, "h")]);
        catalog.ingest(&[JournalEntry::new("x", "no rec")]);
        let rec = catalog.get("a").unwrap();
        assert_eq!((rec.start, rec.end, rec.duration()), (1_000, 4_000, 3_000));
        assert_eq!(rec.pid, Some(42));
        assert_eq!(rec.user.as_deref(), Some("alice"));
        assert_eq!(rec.matches, ["TLOG_REC=a"]);
        assert_eq!(catalog.len(), 1);
        assert!(!catalog.has_multiple_hosts());
    }

    #[test]
    fn reorders_on_earlier_start() {
        let mut catalog = RecordingCatalog::new();
        catalog.ingest(&[entry("a", 5_000, "h"), entry("b", 3_000, "h")]);
        catalog.ingest(&[entry("a", 1_000, "other")]);
        let ids: Vec<_> = catalog.recordings().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(catalog.get("a").unwrap().end, 5_000);
        assert_eq!(catalog.get("b").unwrap().start, 3_000);
        assert!(!catalog.has_multiple_hosts());

        catalog.ingest(&[entry("c", 9_000, "other")]);
        assert!(catalog.has_multiple_hosts());
    }
}
