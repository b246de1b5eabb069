//! Timing string decoder.
//!
//! A tlog message stores its events as a compact timing string that indexes
//! into two text pools, one for input and one for output:
//!
//! | Token   | Meaning                                    | Pool      |
//! |---------|--------------------------------------------|-----------|
//! | `+N`    | delay of N milliseconds                    | none      |
//! | `<N`    | N characters of text input                 | `in_txt`  |
//! | `[N/M`  | N bytes of binary input stored as M chars  | `in_txt`  |
//! | `>N`    | N characters of text output                | `out_txt` |
//! | `]N/M`  | N bytes of binary output stored as M chars | `out_txt` |
//! | `=WxH`  | window resized to W columns and H rows     | none      |
//!
//! The recorder substitutes one replacement character per binary byte, so a
//! binary token consumes N characters from its pool.

use crate::error::DecodeError;
use crate::packet::{Direction, Packet};

/// One token of the timing grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// Advance the virtual position.
    Delay(u64),
    /// Consume characters from one text pool.
    Io {
        /// Pool to consume from.
        direction: Direction,
        /// Number of characters.
        chars: usize,
    },
    /// Window size change.
    Window {
        /// Columns.
        width: u16,
        /// Rows.
        height: u16,
    },
}

/// Read the token starting at byte offset `cursor`.
///
/// Returns the token and the offset just past it, or `None` at the end of
/// the string.
pub fn next_token(timing: &str, cursor: usize) -> Result<Option<(Token, usize)>, DecodeError> {
    let bytes = timing.as_bytes();
    let Some(&tag) = bytes.get(cursor) else {
        return Ok(None);
    };
    let invalid = DecodeError::InvalidToken { offset: cursor };

    let (first, after_first) = read_number(bytes, cursor + 1).ok_or(invalid.clone())?;
    let token = match tag {
        b'+' => (Token::Delay(first), after_first),
        b'<' | b'>' => {
            let direction = if tag == b'<' {
                Direction::Input
            } else {
                Direction::Output
            };
            let chars = usize::try_from(first).map_err(|_| invalid.clone())?;
            (Token::Io { direction, chars }, after_first)
        }
        b'[' | b']' => {
            if bytes.get(after_first) != Some(&b'/') {
                return Err(invalid);
            }
            let (_, end) = read_number(bytes, after_first + 1).ok_or(invalid.clone())?;
            let direction = if tag == b'[' {
                Direction::Input
            } else {
                Direction::Output
            };
            let chars = usize::try_from(first).map_err(|_| invalid.clone())?;
            (Token::Io { direction, chars }, end)
        }
        b'=' => {
            if bytes.get(after_first) != Some(&b'x') {
                return Err(invalid);
            }
            let (second, end) = read_number(bytes, after_first + 1).ok_or(invalid.clone())?;
            let width = u16::try_from(first).map_err(|_| invalid.clone())?;
            let height = u16::try_from(second).map_err(|_| invalid.clone())?;
            if width == 0 || height == 0 {
                return Err(invalid);
            }
            (Token::Window { width, height }, end)
        }
        _ => return Err(invalid),
    };
    Ok(Some(token))
}

/// Parse a run of ASCII digits starting at `start`.
fn read_number(bytes: &[u8], start: usize) -> Option<(u64, usize)> {
    let mut end = start;
    let mut value: u64 = 0;
    while let Some(&b) = bytes.get(end) {
        if !b.is_ascii_digit() {
            break;
        }
        value = value.checked_mul(10)?.checked_add(u64::from(b - b'0'))?;
        end += 1;
    }
    (end > start).then_some((value, end))
}

/// A text pool consumed character by character.
struct TextPool<'a> {
    text: &'a str,
    offset: usize,
    direction: Direction,
}

impl<'a> TextPool<'a> {
    const fn new(text: &'a str, direction: Direction) -> Self {
        Self {
            text,
            offset: 0,
            direction,
        }
    }

    fn take(&mut self, chars: usize) -> Result<&'a str, DecodeError> {
        let rest = &self.text[self.offset..];
        let mut end = 0;
        let mut taken = 0;
        for (idx, ch) in rest.char_indices() {
            if taken == chars {
                break;
            }
            end = idx + ch.len_utf8();
            taken += 1;
        }
        if taken < chars {
            return Err(DecodeError::OutOfBounds {
                direction: self.direction,
                requested: chars,
                available: taken,
            });
        }
        self.offset += end;
        Ok(&rest[..end])
    }

    fn finish(&self) -> Result<(), DecodeError> {
        let remaining = self.text[self.offset..].chars().count();
        if remaining > 0 {
            return Err(DecodeError::ExtraText {
                direction: self.direction,
                remaining,
            });
        }
        Ok(())
    }
}

/// Incremental decoder carrying position and window size across messages.
///
/// A failed [`decode`](Self::decode) leaves the decoder untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoder {
    pos: u64,
    window: Option<(u16, u16)>,
}

impl Decoder {
    /// Create a decoder at position zero with no known window size.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pos: 0,
            window: None,
        }
    }

    /// Current virtual position, in milliseconds.
    #[must_use]
    pub const fn pos(&self) -> u64 {
        self.pos
    }

    /// Last window size seen, if any.
    #[must_use]
    pub const fn window(&self) -> Option<(u16, u16)> {
        self.window
    }

    /// Move the virtual position, typically to a message's `pos`.
    pub const fn seek(&mut self, pos: u64) {
        self.pos = pos;
    }

    /// Decode one message worth of timing data into packets.
    pub fn decode(
        &mut self,
        timing: &str,
        in_txt: &str,
        out_txt: &str,
    ) -> Result<Vec<Packet>, DecodeError> {
        let mut pos = self.pos;
        let mut window = self.window;
        let mut input = TextPool::new(in_txt, Direction::Input);
        let mut output = TextPool::new(out_txt, Direction::Output);
        let mut pending: Option<(Direction, String)> = None;
        let mut packets = Vec::new();

        let flush = |pending: &mut Option<(Direction, String)>, packets: &mut Vec<Packet>, pos| {
            if let Some((direction, payload)) = pending.take() {
                packets.push(Packet::io(pos, direction, payload));
            }
        };

        let mut cursor = 0;
        while let Some((token, next)) = next_token(timing, cursor)? {
            cursor = next;
            match token {
                Token::Delay(0) | Token::Io { chars: 0, .. } => {}
                Token::Delay(ms) => {
                    flush(&mut pending, &mut packets, pos);
                    pos = pos.saturating_add(ms);
                }
                Token::Io { direction, chars } => {
                    if pending.as_ref().is_some_and(|(d, _)| *d != direction) {
                        flush(&mut pending, &mut packets, pos);
                    }
                    let pool = match direction {
                        Direction::Input => &mut input,
                        Direction::Output => &mut output,
                    };
                    let text = pool.take(chars)?;
                    pending
                        .get_or_insert_with(|| (direction, String::new()))
                        .1
                        .push_str(text);
                }
                Token::Window { width, height } => {
                    if window == Some((width, height)) {
                        continue;
                    }
                    flush(&mut pending, &mut packets, pos);
                    packets.push(Packet::resize(pos, width, height));
                    window = Some((width, height));
                }
            }
        }

        input.finish()?;
        output.finish()?;
        flush(&mut pending, &mut packets, pos);

        self.pos = pos;
        self.window = window;
        Ok(packets)
    }
}

/// Decode a standalone timing string starting at position zero.
pub fn decode(timing: &str, in_txt: &str, out_txt: &str) -> Result<Vec<Packet>, DecodeError> {
    Decoder::new().decode(timing, in_txt, out_txt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_walks_every_token_kind() {
        let timing = "+5<1[2/6>3]4/4=80x25";
        let mut cursor = 0;
        let mut tokens = Vec::new();
        while let Some((token, next)) = next_token(timing, cursor).unwrap() {
            tokens.push(token);
            cursor = next;
        }
        assert_eq!(
            tokens,
            vec![
                Token::Delay(5),
                Token::Io {
                    direction: Direction::Input,
                    chars: 1
                },
                Token::Io {
                    direction: Direction::Input,
                    chars: 2
                },
                Token::Io {
                    direction: Direction::Output,
                    chars: 3
                },
                Token::Io {
                    direction: Direction::Output,
                    chars: 4
                },
                Token::Window {
                    width: 80,
                    height: 25
                },
            ]
        );
    }

    #[test]
    fn tokenizer_reports_offset() {
        assert_eq!(
            next_token("+1x", 2),
            Err(DecodeError::InvalidToken { offset: 2 })
        );
        assert_eq!(
            next_token("=80", 0),
            Err(DecodeError::InvalidToken { offset: 0 })
        );
        assert_eq!(
            next_token("+", 0),
            Err(DecodeError::InvalidToken { offset: 0 })
        );
    }

    #[test]
    fn multibyte_characters_count_once() {
        let packets = decode(">2", "", "é✓").unwrap();
        assert_eq!(packets, vec![Packet::output(0, "é✓")]);
    }

    #[test]
    fn binary_tokens_consume_byte_count() {
        let packets = decode("]2/6", "", "\u{fffd}\u{fffd}").unwrap();
        assert_eq!(packets, vec![Packet::output(0, "\u{fffd}\u{fffd}")]);
    }

    #[test]
    fn failed_decode_keeps_state() {
        let mut decoder = Decoder::new();
        decoder.decode("=80x25+10", "", "").unwrap();
        assert!(decoder.decode("+100=90x30<4", "ab", "").is_err());
        assert_eq!(decoder.pos(), 10);
        assert_eq!(decoder.window(), Some((80, 25)));
    }

    #[test]
    fn window_carries_across_messages() {
        let mut decoder = Decoder::new();
        assert_eq!(decoder.decode("=80x25", "", "").unwrap().len(), 1);
        assert!(decoder.decode("=80x25", "", "").unwrap().is_empty());
    }

    #[test]
    fn direction_change_flushes() {
        let packets = decode("<1>1<1", "ab", "x").unwrap();
        assert_eq!(
            packets,
            vec![
                Packet::input(0, "a"),
                Packet::output(0, "x"),
                Packet::input(0, "b"),
            ]
        );
    }
}
