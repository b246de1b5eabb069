//! Integration tests for timing string decoding.

use proptest::prelude::*;
use tlog_replay::{DecodeError, Decoder, Direction, ErrorSink, JournalEntry, Packet, PacketBuffer, decode};

fn message(id: u64, pos: u64, timing: &str, in_txt: &str, out_txt: &str) -> String {
    serde_json::json!({
        "ver": "2.3", "host": "h", "rec": "r", "user": "u", "term": "xterm", "session": 1,
        "id": id, "pos": pos, "timing": timing, "in_txt": in_txt, "out_txt": out_txt,
    })
    .to_string()
}

#[test]
fn round_trip_decode() {
    let packets = decode("=80x25+100<5>10", "hello", "world!!!!!").unwrap();
    assert_eq!(
        packets,
        vec![
            Packet::resize(0, 80, 25),
            Packet::input(100, "hello"),
            Packet::output(100, "world!!!!!"),
        ]
    );
}

#[test]
fn under_run_fails() {
    let err = decode("<5", "ab", "").unwrap_err();
    assert_eq!(
        err,
        DecodeError::OutOfBounds {
            direction: Direction::Input,
            requested: 5,
            available: 2,
        }
    );
}

#[test]
fn trailing_text_fails() {
    let err = decode("<3", "abcd", "").unwrap_err();
    assert_eq!(
        err,
        DecodeError::ExtraText {
            direction: Direction::Input,
            remaining: 1,
        }
    );
}

#[test]
fn zero_delay_keeps_coalescing() {
    let packets = decode("<2+0<3", "ab123", "").unwrap();
    assert_eq!(packets, vec![Packet::input(0, "ab123")]);
}

#[test]
fn redundant_resize_dropped() {
    let packets = decode("=80x25=80x25", "", "").unwrap();
    assert_eq!(packets, vec![Packet::resize(0, 80, 25)]);
}

#[test]
fn delay_flushes_pending_io() {
    let packets = decode(">2+10>1", "", "abc").unwrap();
    assert_eq!(packets, vec![Packet::output(0, "ab"), Packet::output(10, "c")]);
}

#[test]
fn resize_flushes_pending_io() {
    let packets = decode(">1=100x40>1", "", "ab").unwrap();
    assert_eq!(
        packets,
        vec![
            Packet::output(0, "a"),
            Packet::resize(0, 100, 40),
            Packet::output(0, "b"),
        ]
    );
}

#[test]
fn zero_length_io_is_noop() {
    assert_eq!(decode("<0>0+0", "", "").unwrap(), Vec::new());
}

#[test]
fn malformed_tokens_carry_offset() {
    assert_eq!(decode("+5?", "", ""), Err(DecodeError::InvalidToken { offset: 2 }));
    assert_eq!(decode("=0x25", "", ""), Err(DecodeError::InvalidToken { offset: 0 }));
    assert_eq!(decode("]3", "", "abc"), Err(DecodeError::InvalidToken { offset: 0 }));
}

#[test]
fn empty_timing_with_text_is_extra_text() {
    assert!(matches!(
        decode("", "", "x"),
        Err(DecodeError::ExtraText {
            direction: Direction::Output,
            ..
        })
    ));
}

#[test]
fn decoder_carries_window_and_position() {
    let mut decoder = Decoder::new();
    decoder.decode("=80x25+100", "", "").unwrap();
    assert_eq!(decoder.pos(), 100);
    assert_eq!(decoder.window(), Some((80, 25)));

    let packets = decoder.decode("=80x25>1", "", "a").unwrap();
    assert_eq!(packets, vec![Packet::output(100, "a")]);
}

proptest! {
    #[test]
    fn buffered_packets_never_go_backwards(
        messages in prop::collection::vec(
            (0u64..2_000, prop::collection::vec((0u64..500, 0usize..4, any::<bool>()), 0..8)),
            1..12,
        )
    ) {
        let mut buffer = PacketBuffer::new();
        let mut errors = ErrorSink::new();
        let mut pos: u64 = 0;

        for (i, (gap, tokens)) in messages.iter().enumerate() {
            let mut timing = String::new();
            let mut in_txt = String::new();
            let mut out_txt = String::new();
            for &(delay, chars, input) in tokens {
                timing.push_str(&format!("+{delay}"));
                let (tag, pool) = if input { ('<', &mut in_txt) } else { ('>', &mut out_txt) };
                timing.push_str(&format!("{tag}{chars}"));
                pool.push_str(&"x".repeat(chars));
            }
            // Some positions deliberately jump back and must be rejected.
            pos = if i % 3 == 2 { pos.saturating_sub(*gap) } else { pos + gap };
            let id = i as u64 + 1;
            let entry = JournalEntry::new(format!("c{id}"), message(id, pos, &timing, &in_txt, &out_txt));
            buffer.ingest(entry, &mut errors);
        }

        let positions: Vec<u64> = buffer.packets().iter().map(|p| p.pos).collect();
        prop_assert!(positions.windows(2).all(|w| w[0] <= w[1]), "positions: {:?}", positions);
    }
}
