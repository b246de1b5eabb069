//! Collected, deduplicated error messages for display.

use std::fmt::Display;

/// Append-only list of human-readable error messages.
///
/// A message already present is not added twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorSink {
    messages: Vec<String>,
}

impl ErrorSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error. Returns `true` if the message was new.
    pub fn report(&mut self, error: impl Display) -> bool {
        let message = error.to_string();
        if self.messages.contains(&message) {
            return false;
        }
        tracing::warn!(%message, "Replay error reported");
        self.messages.push(message);
        true
    }

    /// Messages in the order first reported.
    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Number of distinct messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if nothing was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReplayError;

    #[test]
    fn deduplicates_by_text() {
        let mut sink = ErrorSink::new();
        assert!(sink.report("boom"));
        assert!(!sink.report("boom"));
        assert!(sink.report(ReplayError::FieldMissing { field: "id" }));
        assert_eq!(sink.messages(), ["boom", "\"id\" field is missing"]);
    }
}
