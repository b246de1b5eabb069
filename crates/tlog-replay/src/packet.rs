//! Replay packet definitions.

use std::fmt;

/// Direction of an I/O packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Typed by the user.
    Input,
    /// Written by the terminal program.
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// What a packet carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketKind {
    /// A chunk of terminal I/O.
    Io {
        /// Which way the text went.
        direction: Direction,
        /// The text itself.
        payload: String,
    },
    /// Window size change.
    Resize {
        /// Columns.
        width: u16,
        /// Rows.
        height: u16,
    },
}

/// One discrete replay event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Milliseconds from recording start.
    pub pos: u64,
    /// Packet contents.
    pub kind: PacketKind,
}

impl Packet {
    /// Create an input packet.
    #[must_use]
    pub fn input(pos: u64, payload: impl Into<String>) -> Self {
        Self::io(pos, Direction::Input, payload)
    }

    /// Create an output packet.
    #[must_use]
    pub fn output(pos: u64, payload: impl Into<String>) -> Self {
        Self::io(pos, Direction::Output, payload)
    }

    /// Create an I/O packet.
    #[must_use]
    pub fn io(pos: u64, direction: Direction, payload: impl Into<String>) -> Self {
        Self {
            pos,
            kind: PacketKind::Io {
                direction,
                payload: payload.into(),
            },
        }
    }

    /// Create a resize packet.
    #[must_use]
    pub const fn resize(pos: u64, width: u16, height: u16) -> Self {
        Self {
            pos,
            kind: PacketKind::Resize { width, height },
        }
    }

    /// Check if this is an I/O packet.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self.kind, PacketKind::Io { .. })
    }

    /// Check if this is a resize packet.
    #[must_use]
    pub const fn is_resize(&self) -> bool {
        matches!(self.kind, PacketKind::Resize { .. })
    }

    /// Get the payload of an I/O packet.
    #[must_use]
    pub fn payload(&self) -> Option<&str> {
        match &self.kind {
            PacketKind::Io { payload, .. } => Some(payload),
            PacketKind::Resize { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors() {
        let pkt = Packet::output(100, "hello");
        assert!(pkt.is_io());
        assert_eq!(pkt.payload(), Some("hello"));

        let pkt = Packet::resize(0, 80, 25);
        assert!(pkt.is_resize());
        assert_eq!(pkt.payload(), None);
    }

    #[test]
    fn direction_display() {
        assert_eq!(Direction::Input.to_string(), "input");
        assert_eq!(Direction::Output.to_string(), "output");
    }
}
