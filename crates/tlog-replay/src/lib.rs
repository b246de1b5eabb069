//! tlog-replay: streaming playback engine for tlog terminal session recordings
//!
//! tlog records terminal sessions into the systemd journal, one JSON message
//! per entry. Each message carries a compact timing string plus the raw
//! input and output text it describes. This crate turns those messages back
//! into a timed stream of terminal events and plays them.
//!
//! # Features
//!
//! - **Timing decoder** turning timing strings into ordered [`Packet`]s
//! - **Streaming buffer** with index-addressable futures, usable while the
//!   recording is still loading and while it keeps growing
//! - **Playback engine** mapping recording time onto the wall clock under
//!   pause, variable speed, single-step and seek
//! - **Journal sources** for `journalctl`, plus an in-memory journal for
//!   testing (feature: `mock`)
//! - **Recording catalog** and text search over a journal
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tlog_replay::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = PlayerConfig::load("replay.toml")?.with_env_overrides();
//!     init_logging(&config.logging)?;
//!
//!     let source = Arc::new(JournalctlSource::new());
//!     let buffer = PacketBuffer::open(source, ["TLOG_REC=5e8b1c0d-17"]);
//!     let (player, handle) = Player::new(buffer, StdoutSink::stdout(), &config)?;
//!     handle.play();
//!     player.run().await;
//!     Ok(())
//! }
//! ```

// Core types
pub mod error;
pub mod packet;
pub mod prelude;

// Decoding and buffering
pub mod buffer;
pub mod decoder;
pub mod error_sink;
pub mod journal;
pub mod message;

// Playback
pub mod engine;
pub mod player;
pub mod sink;

// Supporting modules
pub mod catalog;
pub mod config;
pub mod display;
pub mod logging;
pub mod search;

pub use buffer::{BufferState, PacketBuffer, PacketSource, PacketWait};
pub use catalog::{CatalogFilter, LogsWindow, Recording, RecordingCatalog, journal_matches};
pub use config::{EnvConfig, LogFormat, LoggingConfig, PlayerConfig};
pub use decoder::{Decoder, decode};
pub use display::{format_duration, normalize_input, progress_label, speed_label};
pub use engine::{Clock, ManualClock, PlaybackEngine, SystemClock, Wake};
pub use error::{AwaitError, DecodeError, ErrorKind, ReplayError, Result};
pub use error_sink::ErrorSink;
pub use journal::{
    EntryStream, JournalEntry, JournalQuery, JournalSource, JournalctlSource, MessageData,
};
#[cfg(feature = "mock")]
pub use journal::MemorySource;
pub use logging::init_logging;
pub use message::Message;
pub use packet::{Direction, Packet, PacketKind};
pub use player::{Control, Player, PlayerHandle, PlayerStatus};
pub use search::{SearchHit, search_positions};
pub use sink::{CaptureSink, ReplaySink, SinkEvent, StdoutSink};
