//! Journal entries and the sources that stream them.
//!
//! tlog writes each message into the systemd journal as the `MESSAGE` field
//! of an entry. A [`JournalSource`] runs a query against some journal and
//! hands back an ordered stream of entries: a finite one for a historical
//! read, or an endless one when following.

pub mod journalctl;
#[cfg(feature = "mock")]
pub mod memory;

use std::collections::BTreeMap;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use journalctl::JournalctlSource;
#[cfg(feature = "mock")]
pub use memory::MemorySource;

/// Ordered stream of journal entries. An `Err` item is a transport failure.
pub type EntryStream = BoxStream<'static, Result<JournalEntry>>;

/// Contents of a `MESSAGE` field.
///
/// journalctl emits fields with non-printable characters as arrays of raw
/// byte values instead of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageData {
    /// Plain text.
    Text(String),
    /// Raw bytes, expected to hold UTF-8.
    Bytes(Vec<u8>),
}

impl From<&str> for MessageData {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for MessageData {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for MessageData {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// One journal entry as produced by `journalctl --output=json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Opaque position of this entry in the journal.
    #[serde(rename = "__CURSOR", default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    /// The tlog message.
    #[serde(rename = "MESSAGE", default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageData>,
    /// Every other field of the entry.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl JournalEntry {
    /// Create an entry with a cursor and a message.
    #[must_use]
    pub fn new(cursor: impl Into<String>, message: impl Into<MessageData>) -> Self {
        Self {
            cursor: Some(cursor.into()),
            message: Some(message.into()),
            fields: BTreeMap::new(),
        }
    }

    /// Add a field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), Value::String(value.into()));
        self
    }

    /// Get a field as text, decoding byte arrays lossily.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "__CURSOR" => self.cursor.clone(),
            "MESSAGE" => match self.message.as_ref()? {
                MessageData::Text(text) => Some(text.clone()),
                MessageData::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            },
            _ => match self.fields.get(name)? {
                Value::String(text) => Some(text.clone()),
                Value::Array(items) => {
                    let bytes: Option<Vec<u8>> = items
                        .iter()
                        .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                        .collect();
                    bytes.map(|b| String::from_utf8_lossy(&b).into_owned())
                }
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            },
        }
    }

    /// Wall-clock time the entry was logged, in ms since the epoch.
    #[must_use]
    pub fn realtime_ms(&self) -> Option<u64> {
        self.field("__REALTIME_TIMESTAMP")
            .and_then(|t| t.parse::<u64>().ok())
            .map(|us| us / 1000)
    }

    /// Check the entry against `FIELD=value` matches.
    ///
    /// Matches on the same field are alternatives; matches on different
    /// fields must all hold. Malformed matches never hold.
    #[must_use]
    pub fn matches(&self, matches: &[String]) -> bool {
        let mut groups: BTreeMap<&str, bool> = BTreeMap::new();
        for m in matches {
            let Some((name, value)) = m.split_once('=') else {
                return false;
            };
            let hit = self.field(name).is_some_and(|v| v == value);
            *groups.entry(name).or_insert(false) |= hit;
        }
        groups.values().all(|&hit| hit)
    }
}

/// A query against a journal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalQuery {
    /// `FIELD=value` matches.
    pub matches: Vec<String>,
    /// Keep streaming new entries after the existing ones.
    pub follow: bool,
    /// Start at this cursor, inclusive.
    pub cursor: Option<String>,
    /// Start just after this cursor. Takes precedence over `cursor`.
    pub after: Option<String>,
    /// Only entries logged at or after this wall-clock time, ms since the
    /// epoch.
    pub since: Option<u64>,
    /// Only entries logged at or before this wall-clock time, ms since the
    /// epoch.
    pub until: Option<u64>,
    /// Only entries whose message contains this text.
    pub grep: Option<String>,
}

impl JournalQuery {
    /// Create a historical query for the given matches.
    #[must_use]
    pub fn new<I, S>(matches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            matches: matches.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Follow the journal.
    #[must_use]
    pub const fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    /// Start at a cursor.
    #[must_use]
    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Start just after a cursor.
    #[must_use]
    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after = Some(cursor.into());
        self
    }

    /// Skip entries logged before `ms` (since the epoch).
    #[must_use]
    pub const fn since(mut self, ms: u64) -> Self {
        self.since = Some(ms);
        self
    }

    /// Skip entries logged after `ms` (since the epoch).
    #[must_use]
    pub const fn until(mut self, ms: u64) -> Self {
        self.until = Some(ms);
        self
    }

    /// Filter by message text.
    #[must_use]
    pub fn grep(mut self, text: impl Into<String>) -> Self {
        self.grep = Some(text.into());
        self
    }

    /// Check whether an entry satisfies the matches, time window and grep
    /// filter. Entries without a timestamp fail any time bound.
    #[must_use]
    pub fn accepts(&self, entry: &JournalEntry) -> bool {
        if !entry.matches(&self.matches) {
            return false;
        }
        if self.since.is_some() || self.until.is_some() {
            let Some(ts) = entry.realtime_ms() else {
                return false;
            };
            if self.since.is_some_and(|since| ts < since)
                || self.until.is_some_and(|until| ts > until)
            {
                return false;
            }
        }
        match &self.grep {
            Some(text) => entry.field("MESSAGE").is_some_and(|m| m.contains(text)),
            None => true,
        }
    }
}

/// Something that can run journal queries.
pub trait JournalSource: Send + Sync {
    /// Start streaming the entries selected by `query`.
    fn open(&self, query: &JournalQuery) -> EntryStream;
}
