//! Error types for tlog-replay.
//!
//! Errors fall into two groups. Stream errors mean the journal transport
//! failed or handed over a container that cannot be parsed at all; they end
//! ingestion for good. Everything else describes a single bad record and is
//! only reported, after which ingestion carries on with the next entry.

use thiserror::Error;

use crate::packet::Direction;

/// Errors raised while decoding a timing string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// No timing token matches at the given byte offset.
    #[error("invalid timing string at offset {offset}")]
    InvalidToken {
        /// Byte offset into the timing string.
        offset: usize,
    },

    /// A token asked for more characters than its text pool holds.
    #[error("timing entry out of {direction} bounds: wanted {requested} characters, {available} left")]
    OutOfBounds {
        /// Pool the token consumes from.
        direction: Direction,
        /// Characters requested by the token.
        requested: usize,
        /// Characters still available in the pool.
        available: usize,
    },

    /// Characters were left over after the last token.
    #[error("extra {direction} text present: {remaining} characters unconsumed")]
    ExtraText {
        /// Pool with leftover text.
        direction: Direction,
        /// Number of unconsumed characters.
        remaining: usize,
    },
}

/// Coarse classification of a [`ReplayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport failure or unparsable container.
    Stream,
    /// A required message field is absent.
    FieldMissing,
    /// A message field has the wrong type or an unusable value.
    FieldTypeMismatch,
    /// The timing grammar or text pools are malformed.
    Decode,
    /// `id` or `pos` went backwards.
    OrderingViolation,
    /// Configuration could not be loaded.
    Config,
}

/// The main error type for tlog-replay operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    /// The journal source failed or delivered an unparsable entry.
    #[error("{message}")]
    Stream {
        /// Description of the failure.
        message: String,
    },

    /// A message field is missing.
    #[error("\"{field}\" field is missing")]
    FieldMissing {
        /// Name of the missing field.
        field: &'static str,
    },

    /// A message field has an unexpected JSON type.
    #[error("invalid \"{field}\" field type: {found}")]
    FieldTypeMismatch {
        /// Name of the offending field.
        field: &'static str,
        /// JSON type that was found instead.
        found: &'static str,
    },

    /// The message format version is unknown or too new.
    #[error("\"ver\" field has invalid value: {version}")]
    UnsupportedVersion {
        /// The version string as received.
        version: String,
    },

    /// The timing data could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A field value went backwards.
    #[error("out of order \"{field}\" field value: {value}")]
    OrderingViolation {
        /// Either `id` or `pos`.
        field: &'static str,
        /// The rejected value.
        value: u64,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

/// Result type alias for tlog-replay operations.
pub type Result<T> = std::result::Result<T, ReplayError>;

impl ReplayError {
    /// Create a stream error.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Stream { .. } => ErrorKind::Stream,
            Self::FieldMissing { .. } => ErrorKind::FieldMissing,
            Self::FieldTypeMismatch { .. } | Self::UnsupportedVersion { .. } => {
                ErrorKind::FieldTypeMismatch
            }
            Self::Decode(_) => ErrorKind::Decode,
            Self::OrderingViolation { .. } => ErrorKind::OrderingViolation,
            Self::Config { .. } => ErrorKind::Config,
        }
    }

    /// Check whether this error ends ingestion.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Stream { .. })
    }
}

/// Why a packet wait did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AwaitError {
    /// The buffer was stopped deliberately.
    #[error("packet buffer stopped")]
    Cancelled,

    /// The buffer hit a fatal error.
    #[error(transparent)]
    Failed(#[from] ReplayError),
}

impl AwaitError {
    /// Check if this is the cancellation marker.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_reported_text() {
        let err = ReplayError::FieldMissing { field: "timing" };
        assert_eq!(err.to_string(), "\"timing\" field is missing");

        let err = ReplayError::OrderingViolation {
            field: "id",
            value: 3,
        };
        assert_eq!(err.to_string(), "out of order \"id\" field value: 3");
    }

    #[test]
    fn only_stream_errors_are_fatal() {
        assert!(ReplayError::stream("journal died").is_fatal());
        assert!(!ReplayError::FieldMissing { field: "id" }.is_fatal());
        assert!(!ReplayError::Decode(DecodeError::InvalidToken { offset: 0 }).is_fatal());
    }

    #[test]
    fn version_errors_classify_as_type_mismatch() {
        let err = ReplayError::UnsupportedVersion {
            version: "3.0".into(),
        };
        assert_eq!(err.kind(), ErrorKind::FieldTypeMismatch);
    }

    #[test]
    fn await_error_wraps_replay_error() {
        let err: AwaitError = ReplayError::stream("gone").into();
        assert!(!err.is_cancelled());
        assert_eq!(err.to_string(), "gone");
        assert!(AwaitError::Cancelled.is_cancelled());
    }
}
