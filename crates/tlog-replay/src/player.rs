//! The playback event loop.
//!
//! A [`Player`] owns a [`PacketBuffer`], a [`PlaybackEngine`] and an
//! [`ErrorSink`] and drives all of them from one task. It waits on whatever
//! comes first: the next journal entry, the packet the engine is waiting
//! for, the engine's deadline, the safety tick or a [`Control`] sent through
//! a [`PlayerHandle`]. Every state change is published as a
//! [`PlayerStatus`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tlog_replay::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let source = Arc::new(JournalctlSource::new());
//!     let buffer = PacketBuffer::open(source, ["TLOG_REC=5e8b1c0d-17"]);
//!     let (player, handle) = Player::new(buffer, StdoutSink::stdout(), &PlayerConfig::default())?;
//!     handle.play();
//!     player.run().await;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::buffer::{BufferState, PacketBuffer, PacketSource, PacketWait};
use crate::config::PlayerConfig;
use crate::display::{progress_label, speed_label};
use crate::engine::{Clock, PlaybackEngine, SystemClock, Wake};
use crate::error::Result;
use crate::error_sink::ErrorSink;
use crate::sink::ReplaySink;

/// A user command for a running [`Player`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Control {
    /// Resume playback.
    Play,
    /// Pause playback.
    Pause,
    /// Flip between playing and paused.
    TogglePause,
    /// Set the speed exponent.
    SetSpeedExponent(i32),
    /// Double the speed.
    SpeedUp,
    /// Halve the speed.
    SpeedDown,
    /// Back to real-time speed.
    ResetSpeed,
    /// Play the next packet now.
    SkipFrame,
    /// Seek to a recording position in milliseconds.
    SeekTo(u64),
    /// Seek to a fraction of the loaded recording.
    SeekFraction(f64),
    /// Play everything loaded without delay.
    FastForwardToEnd,
    /// Restart from the beginning.
    RewindToStart,
    /// Lock or unlock the view scale.
    SetScaleLock(bool),
    /// Stop loading and end the loop.
    Stop,
}

impl Control {
    /// Map a key press to a control.
    ///
    /// | Key         | Control             |
    /// |-------------|---------------------|
    /// | `p`         | toggle pause        |
    /// | `}` / `{`   | speed up / down     |
    /// | Backspace   | real-time speed     |
    /// | `.`         | skip frame          |
    /// | `g`         | fast-forward to end |
    /// | `r`         | rewind to start     |
    /// | `q`, Ctrl-C | stop                |
    #[must_use]
    pub fn from_key(key: &KeyEvent) -> Option<Self> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        let control = match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Self::Stop,
            KeyCode::Char('p' | 'P') => Self::TogglePause,
            KeyCode::Char('}') => Self::SpeedUp,
            KeyCode::Char('{') => Self::SpeedDown,
            KeyCode::Backspace => Self::ResetSpeed,
            KeyCode::Char('.') => Self::SkipFrame,
            KeyCode::Char('g' | 'G') => Self::FastForwardToEnd,
            KeyCode::Char('r' | 'R') => Self::RewindToStart,
            KeyCode::Char('q' | 'Q') => Self::Stop,
            _ => return None,
        };
        Some(control)
    }
}

/// Snapshot of a player's state.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStatus {
    /// Recording position reached, in milliseconds.
    pub position: u64,
    /// End position of what is loaded, in milliseconds.
    pub end_pos: u64,
    /// Number of packets loaded.
    pub packets: usize,
    /// Buffer lifecycle state.
    pub state: BufferState,
    /// Whether playback is paused.
    pub paused: bool,
    /// Current speed exponent.
    pub speed_exponent: i32,
    /// Whether the view scale is locked.
    pub scale_locked: bool,
    /// Error messages reported so far.
    pub errors: Vec<String>,
}

impl PlayerStatus {
    /// Progress text, e.g. `00:12 / 03:40`.
    #[must_use]
    pub fn progress_label(&self) -> String {
        progress_label(self.position, self.end_pos)
    }

    /// Speed indicator, e.g. `x4` or `/2`; empty at real-time speed.
    #[must_use]
    pub fn speed_label(&self) -> String {
        speed_label(self.speed_exponent)
    }

    /// Check if everything recorded so far is loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state == BufferState::Tailing
    }
}

/// Remote control for a [`Player`].
///
/// Dropping every handle ends the player loop.
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    controls: mpsc::UnboundedSender<Control>,
    status: watch::Receiver<PlayerStatus>,
}

impl PlayerHandle {
    /// Send a control. Returns `false` if the player has finished.
    pub fn send(&self, control: Control) -> bool {
        self.controls.send(control).is_ok()
    }

    /// Resume playback.
    pub fn play(&self) -> bool {
        self.send(Control::Play)
    }

    /// Pause playback.
    pub fn pause(&self) -> bool {
        self.send(Control::Pause)
    }

    /// Seek to a recording position.
    pub fn seek_to(&self, pos: u64) -> bool {
        self.send(Control::SeekTo(pos))
    }

    /// Stop the player.
    pub fn stop(&self) -> bool {
        self.send(Control::Stop)
    }

    /// The latest status.
    #[must_use]
    pub fn status(&self) -> PlayerStatus {
        self.status.borrow().clone()
    }

    /// A receiver for status updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        self.status.clone()
    }

    /// Wait until the status satisfies `condition`.
    ///
    /// Returns `None` if the player finished first.
    pub async fn wait_for(
        &self,
        condition: impl FnMut(&PlayerStatus) -> bool,
    ) -> Option<PlayerStatus> {
        let mut status = self.status.clone();
        let reached = status.wait_for(condition).await.ok().map(|s| s.clone());
        reached
    }
}

/// The playback event loop.
pub struct Player<S, C = SystemClock> {
    buffer: PacketBuffer,
    engine: PlaybackEngine<S, C>,
    errors: ErrorSink,
    controls: mpsc::UnboundedReceiver<Control>,
    status: watch::Sender<PlayerStatus>,
    tick_interval: Duration,
    wake: Wake,
}

impl<S, C> std::fmt::Debug for Player<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("buffer", &self.buffer)
            .field("errors", &self.errors)
            .field("tick_interval", &self.tick_interval)
            .field("wake", &self.wake)
            .finish_non_exhaustive()
    }
}

impl<S: ReplaySink> Player<S, SystemClock> {
    /// Create a player for `buffer` writing to `sink`.
    ///
    /// Fails if `config` does not pass [`PlayerConfig::validate`].
    pub fn new(
        buffer: PacketBuffer,
        sink: S,
        config: &PlayerConfig,
    ) -> Result<(Self, PlayerHandle)> {
        Self::with_clock(buffer, sink, SystemClock, config)
    }
}

impl<S: ReplaySink, C: Clock> Player<S, C> {
    /// Create a player driven by `clock`.
    pub fn with_clock(
        buffer: PacketBuffer,
        sink: S,
        clock: C,
        config: &PlayerConfig,
    ) -> Result<(Self, PlayerHandle)> {
        config.validate()?;
        let engine = PlaybackEngine::with_clock(sink, clock)
            .with_speed_exponent(config.speed_exponent)
            .with_paused(config.start_paused)
            .with_early_threshold(config.early_threshold)
            .with_scale_lock(config.scale_lock);
        let (controls_tx, controls_rx) = mpsc::unbounded_channel();

        let player = Self {
            buffer,
            engine,
            errors: ErrorSink::new(),
            controls: controls_rx,
            status: watch::Sender::new(PlayerStatus {
                position: 0,
                end_pos: 0,
                packets: 0,
                state: BufferState::Loading,
                paused: config.start_paused,
                speed_exponent: 0,
                scale_locked: config.scale_lock,
                errors: Vec::new(),
            }),
            tick_interval: config.tick_interval,
            wake: Wake::Idle,
        };
        player.publish();

        let handle = PlayerHandle {
            controls: controls_tx,
            status: player.status.subscribe(),
        };
        Ok((player, handle))
    }

    /// The packet buffer.
    pub const fn buffer(&self) -> &PacketBuffer {
        &self.buffer
    }

    /// The playback engine.
    pub const fn engine(&self) -> &PlaybackEngine<S, C> {
        &self.engine
    }

    /// Errors reported so far.
    pub const fn errors(&self) -> &ErrorSink {
        &self.errors
    }

    /// Take the sink back.
    pub fn into_sink(self) -> S {
        self.engine.into_sink()
    }

    /// Run until stopped.
    ///
    /// The loop ends on [`Control::Stop`], when every handle is dropped, or
    /// when a packet wait is cancelled. The buffer is stopped on the way out.
    pub async fn run(mut self) -> Self {
        tracing::debug!(tick = ?self.tick_interval, "Player started");
        let mut tick = tokio::time::interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.wake = self.engine.step(&self.buffer);
        self.publish();

        loop {
            let arrival = match self.wake {
                Wake::WaitForArrival(index) => Some(self.buffer.await_packet(Some(index))),
                _ => None,
            };
            let deadline = match self.wake {
                Wake::WaitUntil(deadline) => Some(deadline),
                _ => None,
            };

            tokio::select! {
                item = self.buffer.next_entry(), if self.buffer.is_subscribed() => {
                    self.buffer.handle_item(item, &mut self.errors);
                }
                signal = wait_arrival(arrival) => {
                    if let Err(error) = signal {
                        self.engine.handle_rejection(&error, &mut self.errors);
                        if error.is_cancelled() {
                            tracing::debug!("Packet wait cancelled, player exiting");
                            break;
                        }
                    }
                }
                () = wait_deadline(deadline) => {}
                _ = tick.tick() => {}
                control = self.controls.recv() => match control {
                    Some(Control::Stop) | None => break,
                    Some(control) => {
                        self.wake = self.apply(control);
                        self.publish();
                        continue;
                    }
                },
            }

            self.wake = self.engine.step(&self.buffer);
            self.publish();
        }

        self.buffer.stop();
        self.publish();
        tracing::debug!(
            packets = self.buffer.len(),
            errors = self.errors.len(),
            "Player stopped"
        );
        self
    }

    /// Apply one control to the engine.
    pub fn apply(&mut self, control: Control) -> Wake {
        tracing::debug!(?control, "Applying control");
        let packets = &self.buffer;
        let engine = &mut self.engine;
        match control {
            Control::Play => engine.play(packets),
            Control::Pause => engine.pause(packets),
            Control::TogglePause => engine.toggle_pause(packets),
            Control::SetSpeedExponent(exponent) => engine.set_speed_exponent(exponent, packets),
            Control::SpeedUp => engine.speed_up(packets),
            Control::SpeedDown => engine.speed_down(packets),
            Control::ResetSpeed => engine.reset_speed(packets),
            Control::SkipFrame => engine.skip_frame(packets),
            Control::SeekTo(pos) => engine.seek_to(pos, packets),
            Control::SeekFraction(fraction) => engine.seek_fraction(fraction, packets),
            Control::FastForwardToEnd => engine.fast_forward_to_end(packets),
            Control::RewindToStart => engine.rewind_to_start(packets),
            Control::SetScaleLock(locked) => {
                engine.set_scale_lock(locked);
                engine.step(packets)
            }
            Control::Stop => {
                self.buffer.stop();
                Wake::Idle
            }
        }
    }

    fn publish(&self) {
        let next = PlayerStatus {
            position: self.engine.virtual_clock().max(0.0) as u64,
            end_pos: self.buffer.end_pos(),
            packets: self.buffer.len(),
            state: self.buffer.state(),
            paused: self.engine.is_paused(),
            speed_exponent: self.engine.speed_exponent(),
            scale_locked: self.engine.is_scale_locked(),
            errors: self.errors.messages().to_vec(),
        };
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

async fn wait_arrival(arrival: Option<PacketWait>) -> std::result::Result<(), crate::error::AwaitError> {
    match arrival {
        Some(wait) => wait.await,
        None => std::future::pending().await,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn keys_map_to_controls() {
        assert_eq!(Control::from_key(&key(KeyCode::Char('P'))), Some(Control::TogglePause));
        assert_eq!(Control::from_key(&key(KeyCode::Char('}'))), Some(Control::SpeedUp));
        assert_eq!(Control::from_key(&key(KeyCode::Char('{'))), Some(Control::SpeedDown));
        assert_eq!(Control::from_key(&key(KeyCode::Backspace)), Some(Control::ResetSpeed));
        assert_eq!(Control::from_key(&key(KeyCode::Char('.'))), Some(Control::SkipFrame));
        assert_eq!(Control::from_key(&key(KeyCode::Char('G'))), Some(Control::FastForwardToEnd));
        assert_eq!(Control::from_key(&key(KeyCode::Char('r'))), Some(Control::RewindToStart));
        assert_eq!(Control::from_key(&key(KeyCode::Char('x'))), None);
    }

    #[test]
    fn ctrl_c_stops_and_releases_are_ignored() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(Control::from_key(&ctrl_c), Some(Control::Stop));
        assert_eq!(Control::from_key(&key(KeyCode::Char('c'))), None);

        let mut release = key(KeyCode::Char('p'));
        release.kind = KeyEventKind::Release;
        assert_eq!(Control::from_key(&release), None);
    }
}
