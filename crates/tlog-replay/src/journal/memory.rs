//! In-memory journal for tests and demos.

use std::sync::{Arc, Mutex};

use futures::{StreamExt, stream};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{EntryStream, JournalEntry, JournalQuery, JournalSource};
use crate::error::{ReplayError, Result};

#[derive(Debug, Default)]
struct MemoryJournal {
    entries: Vec<JournalEntry>,
    followers: Vec<(JournalQuery, mpsc::UnboundedSender<Result<JournalEntry>>)>,
    failure: Option<ReplayError>,
    queries: Vec<JournalQuery>,
    next_seqnum: u64,
}

/// A journal kept in memory.
///
/// Clones share the same journal, so a test can keep one handle to append
/// entries while a buffer follows another.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    journal: Arc<Mutex<MemoryJournal>>,
}

impl MemorySource {
    /// Create an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a journal holding the given entries.
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = JournalEntry>) -> Self {
        let source = Self::new();
        for entry in entries {
            source.push(entry);
        }
        source
    }

    /// Append an entry and hand it to every matching follower.
    pub fn push(&self, entry: JournalEntry) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.next_seqnum += 1;
            journal
                .followers
                .retain(|(query, tx)| !query.accepts(&entry) || tx.send(Ok(entry.clone())).is_ok());
            journal.entries.push(entry);
        }
    }

    /// Append a tlog message for recording `rec`, assigning the next cursor.
    pub fn push_message(&self, rec: &str, message: impl Into<String>) -> String {
        let seqnum = self
            .journal
            .lock()
            .map(|journal| journal.next_seqnum + 1)
            .unwrap_or_default();
        let cursor = format!("s=mem;i={seqnum}");
        self.push(
            JournalEntry::new(cursor.clone(), message.into()).with_field("TLOG_REC", rec),
        );
        cursor
    }

    /// Make the journal fail: followers get the error now, later queries
    /// get it after their historical entries.
    pub fn fail(&self, error: ReplayError) {
        if let Ok(mut journal) = self.journal.lock() {
            for (_, tx) in journal.followers.drain(..) {
                let _ = tx.send(Err(error.clone()));
            }
            journal.failure = Some(error);
        }
    }

    /// Every query opened so far, oldest first.
    #[must_use]
    pub fn queries(&self) -> Vec<JournalQuery> {
        self.journal
            .lock()
            .map(|journal| journal.queries.clone())
            .unwrap_or_default()
    }

    /// Number of followers still listening.
    #[must_use]
    pub fn follower_count(&self) -> usize {
        self.journal
            .lock()
            .map(|mut journal| {
                journal.followers.retain(|(_, tx)| !tx.is_closed());
                journal.followers.len()
            })
            .unwrap_or_default()
    }
}

impl JournalSource for MemorySource {
    fn open(&self, query: &JournalQuery) -> EntryStream {
        let Ok(mut journal) = self.journal.lock() else {
            let err = ReplayError::stream("memory journal poisoned");
            return stream::iter([Err(err)]).boxed();
        };
        journal.queries.push(query.clone());

        let position = |cursor: &String| {
            journal
                .entries
                .iter()
                .position(|e| e.cursor.as_ref() == Some(cursor))
        };
        let start = match (&query.after, &query.cursor) {
            (Some(after), _) => position(after).map_or(0, |i| i + 1),
            (None, Some(cursor)) => position(cursor).unwrap_or(0),
            (None, None) => 0,
        };

        let mut items: Vec<Result<JournalEntry>> = journal.entries[start..]
            .iter()
            .filter(|e| query.accepts(e))
            .cloned()
            .map(Ok)
            .collect();

        if let Some(error) = &journal.failure {
            items.push(Err(error.clone()));
            return stream::iter(items).boxed();
        }

        let history = stream::iter(items);
        if query.follow {
            let (tx, rx) = mpsc::unbounded_channel();
            journal.followers.push((query.clone(), tx));
            history.chain(UnboundedReceiverStream::new(rx)).boxed()
        } else {
            history.boxed()
        }
    }
}
