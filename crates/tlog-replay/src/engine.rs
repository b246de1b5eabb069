//! Playback synchronization.
//!
//! The engine keeps a virtual clock in recording time and maps it onto the
//! wall clock. It never sleeps: [`PlaybackEngine::step`] does all the work
//! that is due right now and then says what should wake it next.

pub mod clock;

use std::time::Duration;

use tokio::time::Instant;

use crate::buffer::PacketSource;
use crate::error::AwaitError;
use crate::error_sink::ErrorSink;
use crate::packet::{Direction, Packet, PacketKind};
use crate::sink::ReplaySink;

pub use clock::{Clock, ManualClock, SystemClock};

/// Slowest speed exponent (1/16x).
pub const MIN_SPEED_EXPONENT: i32 = -4;

/// Fastest speed exponent (16x).
pub const MAX_SPEED_EXPONENT: i32 = 4;

/// Packets due within this much real time are played immediately.
pub const DEFAULT_EARLY_THRESHOLD: Duration = Duration::from_millis(5);

/// Seek target meaning "the end of the recording".
pub const END_OF_RECORDING: u64 = u64::MAX;

/// What should trigger the next [`PlaybackEngine::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// Nothing to do until a control changes.
    Idle,
    /// Step again once the packet at this index has arrived.
    WaitForArrival(usize),
    /// Step again at this instant.
    WaitUntil(Instant),
}

/// Playback state machine.
#[derive(Debug)]
pub struct PlaybackEngine<S, C = SystemClock> {
    sink: S,
    clock: C,
    /// Recording time reached, in milliseconds.
    virtual_clock: f64,
    /// Wall-clock instant the virtual clock was last synced to.
    anchor: Instant,
    /// Index of the next packet to fetch.
    cursor: usize,
    loaded: Option<Packet>,
    pending_seek: Option<u64>,
    pending_skip: bool,
    paused: bool,
    speed_exponent: i32,
    early_threshold: Duration,
    scale_lock: bool,
    window: Option<(u16, u16)>,
    /// Set when a packet wait was rejected; fetching resumes only after an
    /// explicit rewind, seek or skip.
    fetch_halted: bool,
}

impl<S: ReplaySink> PlaybackEngine<S, SystemClock> {
    /// Create a paused engine driven by the system clock.
    pub fn new(sink: S) -> Self {
        Self::with_clock(sink, SystemClock)
    }
}

impl<S: ReplaySink, C: Clock> PlaybackEngine<S, C> {
    /// Create a paused engine driven by `clock`.
    pub fn with_clock(sink: S, clock: C) -> Self {
        let anchor = clock.now();
        Self {
            sink,
            clock,
            virtual_clock: 0.0,
            anchor,
            cursor: 0,
            loaded: None,
            pending_seek: None,
            pending_skip: false,
            paused: true,
            speed_exponent: 0,
            early_threshold: DEFAULT_EARLY_THRESHOLD,
            scale_lock: false,
            window: None,
            fetch_halted: false,
        }
    }

    /// Set the initial speed exponent.
    #[must_use]
    pub fn with_speed_exponent(mut self, exponent: i32) -> Self {
        self.speed_exponent = exponent.clamp(MIN_SPEED_EXPONENT, MAX_SPEED_EXPONENT);
        self
    }

    /// Start paused or playing.
    #[must_use]
    pub const fn with_paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }

    /// Set how early a packet may be played.
    #[must_use]
    pub const fn with_early_threshold(mut self, threshold: Duration) -> Self {
        self.early_threshold = threshold;
        self
    }

    /// Start with the view scale locked.
    #[must_use]
    pub const fn with_scale_lock(mut self, locked: bool) -> Self {
        self.scale_lock = locked;
        self
    }

    /// The sink.
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// The sink, mutably.
    pub const fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// The clock.
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Take the sink back.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Recording time reached, in milliseconds.
    #[must_use]
    pub const fn virtual_clock(&self) -> f64 {
        self.virtual_clock
    }

    /// Index of the next packet to fetch.
    #[must_use]
    pub const fn cursor_index(&self) -> usize {
        self.cursor
    }

    /// Check if a packet is fetched but not yet played.
    #[must_use]
    pub const fn has_loaded_packet(&self) -> bool {
        self.loaded.is_some()
    }

    /// Pending seek target.
    #[must_use]
    pub const fn pending_seek(&self) -> Option<u64> {
        self.pending_seek
    }

    /// Check if playback is paused.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Current speed exponent.
    #[must_use]
    pub const fn speed_exponent(&self) -> i32 {
        self.speed_exponent
    }

    /// Current speed multiplier, `2^exponent`.
    #[must_use]
    pub fn speed(&self) -> f64 {
        2f64.powi(self.speed_exponent)
    }

    /// Check if the view scale is locked.
    #[must_use]
    pub const fn is_scale_locked(&self) -> bool {
        self.scale_lock
    }

    /// Check if fetching stopped after a rejected packet wait.
    #[must_use]
    pub const fn is_fetch_halted(&self) -> bool {
        self.fetch_halted
    }

    /// Real time needed to cover `virtual_delay` at the current speed.
    #[must_use]
    pub fn real_delay(&self, virtual_delay: Duration) -> Duration {
        from_millis_f64(duration_millis(virtual_delay) / self.speed())
    }

    /// Play as much as is due and report when to step again.
    pub fn step<P: PacketSource + ?Sized>(&mut self, packets: &P) -> Wake {
        loop {
            let pos = match &self.loaded {
                Some(packet) => packet.pos,
                None => match packets.packet(self.cursor) {
                    Some(packet) => {
                        self.loaded = Some(packet.clone());
                        self.cursor += 1;
                        packet.pos
                    }
                    None => {
                        if self.pending_seek.is_some() && packets.is_done() {
                            tracing::debug!("Seek target beyond end of recording");
                            self.pending_seek = None;
                        }
                        if self.fetch_halted {
                            return Wake::Idle;
                        }
                        return Wake::WaitForArrival(self.cursor);
                    }
                },
            };

            let now = self.clock.now();
            let elapsed = if self.paused {
                0.0
            } else {
                duration_millis(now.saturating_duration_since(self.anchor))
            };
            self.anchor = now;

            if self.pending_skip {
                self.pending_skip = false;
                self.virtual_clock = pos as f64;
            } else if let Some(target) = self.pending_seek {
                if pos < target {
                    self.virtual_clock = pos as f64;
                } else {
                    self.virtual_clock = target as f64;
                    self.pending_seek = None;
                    continue;
                }
            } else if self.paused {
                return Wake::Idle;
            } else {
                let speed = self.speed();
                self.virtual_clock += elapsed * speed;
                let real_delay_ms = (pos as f64 - self.virtual_clock) / speed;
                if real_delay_ms > self.early_threshold.as_secs_f64() * 1000.0 {
                    return Wake::WaitUntil(now + from_millis_f64(real_delay_ms));
                }
            }

            if let Some(packet) = self.loaded.take() {
                self.consume(packet);
            }
        }
    }

    fn consume(&mut self, packet: Packet) {
        tracing::trace!(pos = packet.pos, index = self.cursor - 1, "Playing packet");
        self.sink.position(packet.pos);
        match packet.kind {
            PacketKind::Io {
                direction: Direction::Input,
                payload,
            } => self.sink.input(&payload),
            PacketKind::Io {
                direction: Direction::Output,
                payload,
            } => self.sink.output(&payload),
            PacketKind::Resize { width, height } => {
                self.window = Some((width, height));
                self.sink.resize(width, height);
                if !self.scale_lock {
                    self.sink.fit(width, height);
                }
            }
        }
    }

    /// Restart from the first packet without stepping.
    fn reset(&mut self) {
        tracing::debug!("Resetting playback");
        self.cursor = 0;
        self.loaded = None;
        self.pending_skip = false;
        self.pending_seek = None;
        self.virtual_clock = 0.0;
        self.anchor = self.clock.now();
        self.window = None;
        self.fetch_halted = false;
        self.sink.reset();
    }

    /// Credit the wall time since the last sample at the current rate, then
    /// resample. Called before pause or speed changes.
    fn settle(&mut self) {
        let now = self.clock.now();
        if !self.paused
            && self.loaded.is_some()
            && self.pending_seek.is_none()
            && !self.pending_skip
        {
            self.virtual_clock +=
                duration_millis(now.saturating_duration_since(self.anchor)) * self.speed();
        }
        self.anchor = now;
    }

    /// Resume playback.
    pub fn play<P: PacketSource + ?Sized>(&mut self, packets: &P) -> Wake {
        self.set_paused(false, packets)
    }

    /// Pause playback.
    pub fn pause<P: PacketSource + ?Sized>(&mut self, packets: &P) -> Wake {
        self.set_paused(true, packets)
    }

    /// Flip between playing and paused.
    pub fn toggle_pause<P: PacketSource + ?Sized>(&mut self, packets: &P) -> Wake {
        self.set_paused(!self.paused, packets)
    }

    fn set_paused<P: PacketSource + ?Sized>(&mut self, paused: bool, packets: &P) -> Wake {
        if self.paused != paused {
            tracing::debug!(paused, "Playback pause changed");
            self.settle();
            self.paused = paused;
        }
        self.step(packets)
    }

    /// Set the speed exponent, clamped to the supported range.
    pub fn set_speed_exponent<P: PacketSource + ?Sized>(
        &mut self,
        exponent: i32,
        packets: &P,
    ) -> Wake {
        let exponent = exponent.clamp(MIN_SPEED_EXPONENT, MAX_SPEED_EXPONENT);
        if exponent != self.speed_exponent {
            tracing::debug!(exponent, "Playback speed changed");
            self.settle();
            self.speed_exponent = exponent;
        }
        self.step(packets)
    }

    /// Double the speed.
    pub fn speed_up<P: PacketSource + ?Sized>(&mut self, packets: &P) -> Wake {
        self.set_speed_exponent(self.speed_exponent + 1, packets)
    }

    /// Halve the speed.
    pub fn speed_down<P: PacketSource + ?Sized>(&mut self, packets: &P) -> Wake {
        self.set_speed_exponent(self.speed_exponent - 1, packets)
    }

    /// Go back to real-time speed.
    pub fn reset_speed<P: PacketSource + ?Sized>(&mut self, packets: &P) -> Wake {
        self.set_speed_exponent(0, packets)
    }

    /// Play the next packet right away, ignoring its timing.
    pub fn skip_frame<P: PacketSource + ?Sized>(&mut self, packets: &P) -> Wake {
        self.pending_skip = true;
        self.fetch_halted = false;
        self.step(packets)
    }

    /// Fast-forward to recording position `target` (ms), restarting from the
    /// beginning first if the target is behind the current position.
    pub fn seek_to<P: PacketSource + ?Sized>(&mut self, target: u64, packets: &P) -> Wake {
        if (target as f64) < self.virtual_clock {
            self.reset();
        }
        tracing::debug!(target, "Seeking");
        self.pending_seek = Some(target);
        self.fetch_halted = false;
        self.step(packets)
    }

    /// Seek to a fraction of the loaded recording, as from a progress bar.
    pub fn seek_fraction<P: PacketSource + ?Sized>(&mut self, fraction: f64, packets: &P) -> Wake {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        let target = (fraction * packets.end_pos() as f64).round() as u64;
        self.seek_to(target, packets)
    }

    /// Play everything loaded so far without delay.
    pub fn fast_forward_to_end<P: PacketSource + ?Sized>(&mut self, packets: &P) -> Wake {
        self.seek_to(END_OF_RECORDING, packets)
    }

    /// Restart playback from the first packet.
    pub fn rewind_to_start<P: PacketSource + ?Sized>(&mut self, packets: &P) -> Wake {
        self.reset();
        self.step(packets)
    }

    /// Lock or unlock the view scale. Unlocking refits to the current size.
    pub fn set_scale_lock(&mut self, locked: bool) {
        self.scale_lock = locked;
        if !locked && let Some((width, height)) = self.window {
            self.sink.fit(width, height);
        }
    }

    /// Handle a rejected packet wait.
    ///
    /// Cancellation is silent; other errors are reported. Either way
    /// fetching stops until the user rewinds, seeks or skips.
    pub fn handle_rejection(&mut self, error: &AwaitError, errors: &mut ErrorSink) {
        if !error.is_cancelled() {
            errors.report(error);
        }
        self.fetch_halted = true;
    }
}

fn duration_millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

fn from_millis_f64(ms: f64) -> Duration {
    Duration::from_nanos((ms * 1_000_000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{CaptureSink, SinkEvent};

    fn engine(clock: &ManualClock) -> PlaybackEngine<CaptureSink, &ManualClock> {
        PlaybackEngine::with_clock(CaptureSink::new(), clock)
    }

    #[test]
    fn starts_paused_and_idle() {
        let clock = ManualClock::new();
        let mut engine = engine(&clock);
        let packets = vec![Packet::output(100, "a")];
        assert_eq!(engine.step(&packets[..]), Wake::Idle);
        assert!(engine.has_loaded_packet());
        assert_eq!(engine.cursor_index(), 1);
    }

    #[test]
    fn waits_for_missing_packet() {
        let clock = ManualClock::new();
        let mut engine = engine(&clock).with_paused(false);
        let packets: Vec<Packet> = Vec::new();
        assert_eq!(engine.step(&packets[..]), Wake::WaitForArrival(0));
    }

    #[test]
    fn skip_frame_ignores_timing() {
        let clock = ManualClock::new();
        let mut engine = engine(&clock);
        let packets = vec![Packet::output(5_000, "late"), Packet::output(9_000, "later")];
        engine.skip_frame(&packets[..]);
        assert_eq!(engine.sink().output, "late");
        assert!((engine.virtual_clock() - 5_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn resize_fits_unless_locked() {
        let clock = ManualClock::new();
        let mut engine = engine(&clock);
        let packets = vec![Packet::resize(0, 80, 25), Packet::resize(0, 100, 30)];
        engine.skip_frame(&packets[..]);
        engine.set_scale_lock(true);
        engine.skip_frame(&packets[..]);
        assert_eq!(
            engine.sink().events,
            vec![
                SinkEvent::Resize(80, 25),
                SinkEvent::Fit(80, 25),
                SinkEvent::Resize(100, 30),
            ]
        );
        engine.set_scale_lock(false);
        assert_eq!(engine.sink().events.last(), Some(&SinkEvent::Fit(100, 30)));
    }

    #[test]
    fn rejection_halts_fetching() {
        let clock = ManualClock::new();
        let mut engine = engine(&clock).with_paused(false);
        let mut errors = ErrorSink::new();
        let packets: Vec<Packet> = Vec::new();
        engine.handle_rejection(&AwaitError::Cancelled, &mut errors);
        assert!(errors.is_empty());
        assert_eq!(engine.step(&packets[..]), Wake::Idle);
        assert_eq!(engine.rewind_to_start(&packets[..]), Wake::WaitForArrival(0));
    }
}
