//! Auto-loading buffer of a recording's packets.
//!
//! The buffer first reads every journal entry logged so far (the loading
//! phase), then follows the journal for new entries (the tailing phase).
//! Consumers ask for packets by index and get a future that completes once
//! the packet has arrived, so playback can start before loading finishes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::StreamExt;
use futures::future::{FutureExt, Shared};
use tokio::sync::oneshot;

use crate::decoder::Decoder;
use crate::error::{AwaitError, ReplayError, Result};
use crate::error_sink::ErrorSink;
use crate::journal::{EntryStream, JournalEntry, JournalQuery, JournalSource};
use crate::message::{Message, parse_container};
use crate::packet::Packet;

/// Read access to an ordered packet sequence.
pub trait PacketSource {
    /// Get the packet at `index`, if it has arrived.
    fn packet(&self, index: usize) -> Option<&Packet>;

    /// Check whether everything recorded so far has been loaded.
    fn is_done(&self) -> bool;

    /// Virtual end position of the loaded part, in milliseconds.
    fn end_pos(&self) -> u64;
}

/// A complete, already decoded recording.
impl PacketSource for [Packet] {
    fn packet(&self, index: usize) -> Option<&Packet> {
        self.get(index)
    }

    fn is_done(&self) -> bool {
        true
    }

    fn end_pos(&self) -> u64 {
        self.last().map_or(0, |p| p.pos)
    }
}

/// Lifecycle of a [`PacketBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Reading the entries logged so far.
    Loading,
    /// Following the journal for new entries.
    Tailing,
    /// Stopped on request.
    Stopped,
    /// Stopped by a fatal error.
    Errored,
}

impl BufferState {
    /// Check if no further packets can arrive.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Errored)
    }
}

type Signal = std::result::Result<(), AwaitError>;
type SharedSignal = Shared<oneshot::Receiver<Signal>>;

/// A registered interest in the packet at `index`.
struct Waiter {
    index: usize,
    tx: oneshot::Sender<Signal>,
    rx: SharedSignal,
}

/// Future returned by [`PacketBuffer::await_packet`].
///
/// Completes with `Ok(())` once the packet is available, or with the
/// reason it never will be.
#[must_use = "futures do nothing unless polled"]
pub struct PacketWait {
    inner: WaitInner,
}

enum WaitInner {
    Ready(Option<Signal>),
    Pending(SharedSignal),
}

impl PacketWait {
    const fn ready(signal: Signal) -> Self {
        Self {
            inner: WaitInner::Ready(Some(signal)),
        }
    }

    const fn pending(rx: SharedSignal) -> Self {
        Self {
            inner: WaitInner::Pending(rx),
        }
    }
}

impl std::fmt::Debug for PacketWait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.inner {
            WaitInner::Ready(_) => "ready",
            WaitInner::Pending(_) => "pending",
        };
        f.debug_struct("PacketWait").field("state", &state).finish()
    }
}

impl Future for PacketWait {
    type Output = Signal;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            WaitInner::Ready(signal) => {
                Poll::Ready(signal.take().unwrap_or(Err(AwaitError::Cancelled)))
            }
            // A dropped sender means the buffer itself went away.
            WaitInner::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(AwaitError::Cancelled))),
        }
    }
}

/// Growing sequence of decoded packets fed from a journal.
pub struct PacketBuffer {
    packets: Vec<Packet>,
    /// Sorted by ascending index, at most one per index.
    waiters: Vec<Waiter>,
    state: BufferState,
    error: Option<ReplayError>,
    decoder: Decoder,
    last_id: Option<u64>,
    source: Option<Arc<dyn JournalSource>>,
    matches: Vec<String>,
    subscription: Option<EntryStream>,
    /// Cursor of the last entry read while loading; taken by the first
    /// entry of the follow run.
    cursor: Option<String>,
}

impl std::fmt::Debug for PacketBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketBuffer")
            .field("packets", &self.packets.len())
            .field("waiters", &self.waiters.len())
            .field("state", &self.state)
            .field("error", &self.error)
            .field("matches", &self.matches)
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketBuffer {
    /// Create a buffer that is not attached to any journal.
    ///
    /// Packets are fed with [`add_packet`](Self::add_packet) or
    /// [`ingest`](Self::ingest).
    #[must_use]
    pub fn new() -> Self {
        Self {
            packets: Vec::new(),
            waiters: Vec::new(),
            state: BufferState::Loading,
            error: None,
            decoder: Decoder::new(),
            last_id: None,
            source: None,
            matches: Vec::new(),
            subscription: None,
            cursor: None,
        }
    }

    /// Create a buffer and start loading the entries selected by `matches`.
    pub fn open<I, S>(source: Arc<dyn JournalSource>, matches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut buffer = Self::new();
        buffer.matches = matches.into_iter().map(Into::into).collect();
        let query = JournalQuery::new(buffer.matches.clone());
        tracing::debug!(matches = ?buffer.matches, "Loading recording");
        buffer.subscription = Some(source.open(&query));
        buffer.source = Some(source);
        buffer
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> BufferState {
        self.state
    }

    /// The error that stopped loading, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&ReplayError> {
        self.error.as_ref()
    }

    /// Number of packets received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Check if no packets were received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// All packets received so far.
    #[must_use]
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// Number of pending waiters.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    /// Check if a journal stream is attached.
    #[must_use]
    pub const fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Wait for the packet at `index`, or the next unseen one for `None`.
    pub fn await_packet(&mut self, index: Option<usize>) -> PacketWait {
        if let Some(error) = &self.error {
            return PacketWait::ready(Err(AwaitError::Failed(error.clone())));
        }
        if self.state == BufferState::Stopped {
            return PacketWait::ready(Err(AwaitError::Cancelled));
        }

        let index = index.unwrap_or(self.packets.len());
        if index < self.packets.len() {
            return PacketWait::ready(Ok(()));
        }

        match self.waiters.binary_search_by_key(&index, |w| w.index) {
            Ok(found) => PacketWait::pending(self.waiters[found].rx.clone()),
            Err(slot) => {
                let (tx, rx) = oneshot::channel();
                let rx = rx.shared();
                self.waiters.insert(
                    slot,
                    Waiter {
                        index,
                        tx,
                        rx: rx.clone(),
                    },
                );
                PacketWait::pending(rx)
            }
        }
    }

    /// Append a packet and wake every waiter it satisfies.
    pub fn add_packet(&mut self, packet: Packet) {
        if self.state.is_terminal() {
            return;
        }
        self.packets.push(packet);

        let len = self.packets.len();
        let ready = self.waiters.partition_point(|w| w.index < len);
        for waiter in self.waiters.drain(..ready) {
            tracing::trace!(index = waiter.index, "Packet arrived");
            let _ = waiter.tx.send(Ok(()));
        }
    }

    fn reject_waiters(&mut self, reason: &AwaitError) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.tx.send(Err(reason.clone()));
        }
    }

    /// Stop loading for good after a fatal error.
    ///
    /// Only the first call has any effect.
    pub fn handle_error(&mut self, error: ReplayError, errors: &mut ErrorSink) {
        if self.state.is_terminal() {
            return;
        }
        tracing::debug!(%error, "Packet buffer failed");
        self.subscription = None;
        self.state = BufferState::Errored;
        self.reject_waiters(&AwaitError::Failed(error.clone()));
        errors.report(&error);
        self.error = Some(error);
    }

    /// Stop receiving entries and cancel every waiter.
    pub fn stop(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        tracing::debug!(packets = self.packets.len(), "Packet buffer stopped");
        self.subscription = None;
        self.state = BufferState::Stopped;
        self.reject_waiters(&AwaitError::Cancelled);
    }

    /// Check if loading finished and the buffer is tailing the journal.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == BufferState::Tailing
    }

    /// Finish the loading phase and start following the journal from the
    /// last entry seen.
    pub fn handle_done(&mut self) {
        if self.state != BufferState::Loading {
            return;
        }
        self.state = BufferState::Tailing;
        self.subscription = None;
        tracing::debug!(
            packets = self.packets.len(),
            cursor = ?self.cursor,
            "Recording loaded, following journal"
        );

        if let Some(source) = &self.source {
            let mut query = JournalQuery::new(self.matches.clone()).follow(true);
            query.cursor.clone_from(&self.cursor);
            self.subscription = Some(source.open(&query));
        }
    }

    /// Wait for the next item from the journal.
    ///
    /// Cancel safe. Never completes when no journal is attached.
    pub async fn next_entry(&mut self) -> Option<Result<JournalEntry>> {
        match self.subscription.as_mut() {
            Some(stream) => stream.next().await,
            None => futures::future::pending().await,
        }
    }

    /// Process one item obtained from [`next_entry`](Self::next_entry).
    pub fn handle_item(&mut self, item: Option<Result<JournalEntry>>, errors: &mut ErrorSink) {
        match item {
            Some(Ok(entry)) => self.ingest(entry, errors),
            Some(Err(error)) => self.handle_error(error, errors),
            None if self.state == BufferState::Loading => self.handle_done(),
            None => {
                tracing::debug!("Journal follow stream ended");
                self.subscription = None;
            }
        }
    }

    /// Receive and process one journal item. Returns `false` once no
    /// journal is attached any more.
    pub async fn pump(&mut self, errors: &mut ErrorSink) -> bool {
        if self.subscription.is_none() {
            return false;
        }
        let item = self.next_entry().await;
        self.handle_item(item, errors);
        self.subscription.is_some()
    }

    /// Pump until the loading phase is over.
    pub async fn load(&mut self, errors: &mut ErrorSink) {
        while self.state == BufferState::Loading && self.pump(errors).await {}
    }

    /// Parse one journal entry and add its packets.
    pub fn ingest(&mut self, entry: JournalEntry, errors: &mut ErrorSink) {
        if self.state.is_terminal() {
            return;
        }

        if self.state == BufferState::Tailing {
            // The follow run starts at the last loaded entry, inclusive.
            if let Some(cursor) = self.cursor.take()
                && entry.cursor.as_ref() == Some(&cursor)
            {
                tracing::trace!(%cursor, "Skipping redelivered entry");
                return;
            }
        } else {
            match &entry.cursor {
                Some(cursor) => self.cursor = Some(cursor.clone()),
                None => {
                    self.handle_error(ReplayError::stream("no cursor in a journal entry"), errors);
                    return;
                }
            }
        }

        let Some(data) = &entry.message else {
            self.handle_error(ReplayError::stream("no message in journal entry"), errors);
            return;
        };
        let object = match parse_container(data) {
            Ok(object) => object,
            Err(error) => {
                self.handle_error(error, errors);
                return;
            }
        };

        match self.decode_message(&object) {
            Ok(packets) => {
                for packet in packets {
                    self.add_packet(packet);
                }
            }
            Err(error) => {
                errors.report(&error);
            }
        }
    }

    fn decode_message(
        &mut self,
        object: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Vec<Packet>> {
        let message = Message::from_object(object)?;

        if self.last_id.is_some_and(|last| message.id <= last) {
            return Err(ReplayError::OrderingViolation {
                field: "id",
                value: message.id,
            });
        }
        if message.pos < self.decoder.pos() {
            return Err(ReplayError::OrderingViolation {
                field: "pos",
                value: message.pos,
            });
        }

        self.last_id = Some(message.id);
        self.decoder.seek(message.pos);
        let packets = self
            .decoder
            .decode(&message.timing, &message.in_txt, &message.out_txt)?;
        tracing::trace!(id = message.id, packets = packets.len(), "Decoded message");
        Ok(packets)
    }
}

impl PacketSource for PacketBuffer {
    fn packet(&self, index: usize) -> Option<&Packet> {
        self.packets.get(index)
    }

    fn is_done(&self) -> bool {
        Self::is_done(self)
    }

    fn end_pos(&self) -> u64 {
        self.decoder.pos()
    }
}
