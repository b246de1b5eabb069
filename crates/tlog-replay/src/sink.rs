//! Destinations for replayed packets.

use std::io::Write;

use crossterm::cursor::MoveTo;
use crossterm::terminal::{Clear, ClearType, SetSize};
use crossterm::{execute, queue};

use crate::display::normalize_input;

/// Receives packets as playback consumes them.
pub trait ReplaySink {
    /// Text the user typed.
    fn input(&mut self, text: &str);

    /// Text the terminal program wrote.
    fn output(&mut self, text: &str);

    /// The terminal changed size.
    fn resize(&mut self, width: u16, height: u16);

    /// Recompute automatic view scaling for a new size.
    fn fit(&mut self, _width: u16, _height: u16) {}

    /// Recording position of the packet just consumed, in milliseconds.
    fn position(&mut self, _pos: u64) {}

    /// Playback restarted from the beginning.
    fn reset(&mut self) {}
}

impl<T: ReplaySink + ?Sized> ReplaySink for &mut T {
    fn input(&mut self, text: &str) {
        (**self).input(text);
    }

    fn output(&mut self, text: &str) {
        (**self).output(text);
    }

    fn resize(&mut self, width: u16, height: u16) {
        (**self).resize(width, height);
    }

    fn fit(&mut self, width: u16, height: u16) {
        (**self).fit(width, height);
    }

    fn position(&mut self, pos: u64) {
        (**self).position(pos);
    }

    fn reset(&mut self) {
        (**self).reset();
    }
}

impl<T: ReplaySink + ?Sized> ReplaySink for Box<T> {
    fn input(&mut self, text: &str) {
        (**self).input(text);
    }

    fn output(&mut self, text: &str) {
        (**self).output(text);
    }

    fn resize(&mut self, width: u16, height: u16) {
        (**self).resize(width, height);
    }

    fn fit(&mut self, width: u16, height: u16) {
        (**self).fit(width, height);
    }

    fn position(&mut self, pos: u64) {
        (**self).position(pos);
    }

    fn reset(&mut self) {
        (**self).reset();
    }
}

/// Something a [`CaptureSink`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// Input text.
    Input(String),
    /// Output text.
    Output(String),
    /// Terminal resize.
    Resize(u16, u16),
    /// View refit.
    Fit(u16, u16),
    /// Playback reset.
    Reset,
}

/// Sink that keeps everything it receives.
#[derive(Debug, Clone, Default)]
pub struct CaptureSink {
    /// Events in arrival order. Positions are tracked separately.
    pub events: Vec<SinkEvent>,
    /// Input typed since the last reset.
    pub input: String,
    /// Output written since the last reset.
    pub output: String,
    /// Current terminal size.
    pub size: Option<(u16, u16)>,
    /// Position of the last consumed packet.
    pub position: u64,
}

impl CaptureSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplaySink for CaptureSink {
    fn input(&mut self, text: &str) {
        self.input.push_str(text);
        self.events.push(SinkEvent::Input(text.to_string()));
    }

    fn output(&mut self, text: &str) {
        self.output.push_str(text);
        self.events.push(SinkEvent::Output(text.to_string()));
    }

    fn resize(&mut self, width: u16, height: u16) {
        self.size = Some((width, height));
        self.events.push(SinkEvent::Resize(width, height));
    }

    fn fit(&mut self, width: u16, height: u16) {
        self.events.push(SinkEvent::Fit(width, height));
    }

    fn position(&mut self, pos: u64) {
        self.position = pos;
    }

    fn reset(&mut self) {
        self.input.clear();
        self.output.clear();
        self.position = 0;
        self.events.push(SinkEvent::Reset);
    }
}

/// Sink that replays output onto a real terminal.
#[derive(Debug)]
pub struct StdoutSink<W: Write> {
    writer: W,
    show_input: bool,
    resize_terminal: bool,
}

impl StdoutSink<std::io::Stdout> {
    /// Write to the process's standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> StdoutSink<W> {
    /// Write to `writer`.
    pub const fn new(writer: W) -> Self {
        Self {
            writer,
            show_input: false,
            resize_terminal: false,
        }
    }

    /// Echo input text as well, with line breaks flattened to spaces.
    #[must_use]
    pub const fn with_show_input(mut self, show: bool) -> Self {
        self.show_input = show;
        self
    }

    /// Ask the terminal emulator to match recorded window sizes.
    #[must_use]
    pub const fn with_resize_terminal(mut self, resize: bool) -> Self {
        self.resize_terminal = resize;
        self
    }

    /// Get the writer back.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write(&mut self, text: &str) {
        let result = self
            .writer
            .write_all(text.as_bytes())
            .and_then(|()| self.writer.flush());
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to write replay output");
        }
    }
}

impl<W: Write> ReplaySink for StdoutSink<W> {
    fn input(&mut self, text: &str) {
        if self.show_input {
            self.write(&normalize_input(text));
        }
    }

    fn output(&mut self, text: &str) {
        self.write(text);
    }

    fn resize(&mut self, width: u16, height: u16) {
        if self.resize_terminal
            && let Err(e) = execute!(self.writer, SetSize(width, height))
        {
            tracing::warn!(error = %e, width, height, "Failed to resize terminal");
        }
    }

    fn reset(&mut self) {
        let result = queue!(self.writer, Clear(ClearType::All), MoveTo(0, 0))
            .and_then(|()| self.writer.flush());
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to clear terminal");
        }
    }
}
