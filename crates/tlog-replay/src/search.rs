//! Finding positions in a recording by text.

use futures::StreamExt;

use crate::error::Result;
use crate::journal::{JournalQuery, JournalSource};
use crate::message::parse_container;

/// A message containing the searched text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchHit {
    /// Message ID.
    pub id: u64,
    /// Recording position of the message, a seek target.
    pub pos: u64,
}

/// Find the messages among `matches` whose text contains `text`.
///
/// Hits come back in journal order. Entries that do not hold a usable
/// message are skipped; a transport failure ends the search with an error.
pub async fn search_positions(
    source: &dyn JournalSource,
    matches: &[String],
    text: &str,
) -> Result<Vec<SearchHit>> {
    let query = JournalQuery::new(matches.iter().cloned()).grep(text);
    let mut stream = source.open(&query);
    let mut hits = Vec::new();

    while let Some(item) = stream.next().await {
        let entry = item?;
        let Some(data) = &entry.message else {
            continue;
        };
        let object = match parse_container(data) {
            Ok(object) => object,
            Err(e) => {
                tracing::warn!(error = %e, cursor = ?entry.cursor, "Skipping search hit");
                continue;
            }
        };
        let id = object.get("id").and_then(serde_json::Value::as_u64);
        let pos = object.get("pos").and_then(serde_json::Value::as_u64);
        if let (Some(id), Some(pos)) = (id, pos) {
            hits.push(SearchHit { id, pos });
        }
    }

    tracing::debug!(%text, hits = hits.len(), "Search finished");
    Ok(hits)
}
