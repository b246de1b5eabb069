//! Text helpers for presenting playback state.

use std::sync::LazyLock;

use regex::Regex;

/// Any line break, including a CRLF pair.
static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r\n|\r|\n").expect("Invalid line break regex"));

/// Format a millisecond interval as `MM:SS`, `HH:MM:SS` or
/// `N days HH:MM:SS`, with a leading `-` when negative.
#[must_use]
pub fn format_duration(ms: i64) -> String {
    let mut v = ms.unsigned_abs() / 1000;
    let s = v % 60;
    v /= 60;
    let m = v % 60;
    v /= 60;
    let h = v % 24;
    let d = v / 24;

    let sign = if ms < 0 { "-" } else { "" };
    if d > 0 {
        format!("{sign}{d} days {h:02}:{m:02}:{s:02}")
    } else if h > 0 {
        format!("{sign}{h:02}:{m:02}:{s:02}")
    } else {
        format!("{sign}{m:02}:{s:02}")
    }
}

/// Progress text, e.g. `01:05 / 12:00`.
#[must_use]
pub fn progress_label(current: u64, end: u64) -> String {
    let clamp = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);
    format!(
        "{} / {}",
        format_duration(clamp(current)),
        format_duration(clamp(end))
    )
}

/// Speed indicator: `x4` when faster, `/2` when slower, empty at 1x.
#[must_use]
pub fn speed_label(exponent: i32) -> String {
    let factor = 1u64 << exponent.unsigned_abs().min(63);
    match exponent.signum() {
        1 => format!("x{factor}"),
        -1 => format!("/{factor}"),
        _ => String::new(),
    }
}

/// Flatten typed input onto one line for echo display.
#[must_use]
pub fn normalize_input(input: &str) -> String {
    LINE_BREAK.replace_all(input, " ").into_owned()
}
