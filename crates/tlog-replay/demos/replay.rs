//! Replay a tlog recording from the system journal.
//!
//! Without arguments the recordings in the journal are listed. With a
//! recording ID that recording is played on the terminal:
//!
//! - `p` pause / resume, `.` next frame
//! - `}` / `{` faster / slower, Backspace for real time
//! - `g` jump to the end, `r` back to the start
//! - `q` or Ctrl-C to quit
//!
//! Run with: `cargo run --example replay -- [RECORDING-ID]`
//!
//! Configuration comes from `replay.toml` when present, then from
//! `TLOG_REPLAY_*` environment variables.

use std::path::Path;
use std::sync::Arc;

use crossterm::event::{Event, EventStream};
use crossterm::terminal;
use futures::StreamExt;
use tlog_replay::prelude::*;
use tlog_replay::{CatalogFilter, RecordingCatalog, format_duration};

#[tokio::main]
async fn main() -> Result<()> {
    let config = if Path::new("replay.toml").exists() {
        PlayerConfig::load("replay.toml")?
    } else {
        PlayerConfig::default()
    }
    .with_env_overrides();
    config.validate()?;
    init_logging(&config.logging)?;

    let source = Arc::new(JournalctlSource::new());

    let Some(id) = std::env::args().nth(1) else {
        let catalog = RecordingCatalog::load(source.as_ref(), &CatalogFilter::new()).await?;
        for recording in catalog.recordings() {
            println!(
                "{}  {:<12} {:>10}  {}",
                recording.id,
                recording.user.as_deref().unwrap_or("-"),
                format_duration(recording.duration() as i64),
                recording.hostname.as_deref().unwrap_or("-"),
            );
        }
        return Ok(());
    };

    let buffer = PacketBuffer::open(source, [format!("TLOG_REC={id}")]);
    let sink = StdoutSink::stdout().with_resize_terminal(true);
    let (player, handle) = Player::new(buffer, sink, &config)?;
    handle.play();

    terminal::enable_raw_mode()
        .map_err(|e| ReplayError::config(format!("cannot enter raw mode: {e}")))?;

    // Key presses become controls until the player goes away.
    let keys = handle.clone();
    tokio::spawn(async move {
        let mut events = EventStream::new();
        while let Some(Ok(event)) = events.next().await {
            if let Event::Key(key) = event
                && let Some(control) = Control::from_key(&key)
                && !keys.send(control)
            {
                break;
            }
        }
    });

    let player = player.run().await;
    if let Err(e) = terminal::disable_raw_mode() {
        tracing::warn!(error = %e, "Failed to restore terminal mode");
    }

    let status = handle.status();
    eprintln!("\r\n{} {}", status.progress_label(), status.speed_label());
    for message in player.errors().messages() {
        eprintln!("error: {message}");
    }
    Ok(())
}
