//! Convenient re-exports for common tlog-replay usage.
//!
//! ```ignore
//! use tlog_replay::prelude::*;
//! ```

// Error handling
pub use crate::error::{AwaitError, DecodeError, ReplayError, Result};

// Configuration
pub use crate::config::{LogFormat, LoggingConfig, PlayerConfig};
pub use crate::logging::init_logging;

// Data
pub use crate::packet::{Direction, Packet, PacketKind};

// Journal access
pub use crate::journal::{JournalEntry, JournalQuery, JournalSource, JournalctlSource};
#[cfg(feature = "mock")]
pub use crate::journal::MemorySource;

// Buffering and playback
pub use crate::buffer::{BufferState, PacketBuffer, PacketSource};
pub use crate::engine::{PlaybackEngine, Wake};
pub use crate::error_sink::ErrorSink;
pub use crate::player::{Control, Player, PlayerHandle, PlayerStatus};
pub use crate::sink::{CaptureSink, ReplaySink, StdoutSink};
