//! Input encoding
//!
//! Converts key events to the byte sequences written to the shell's input.
//! The table is fixed: shells on the other end of the pipe expect exactly
//! these bytes, so entries must not drift.

use super::keys::{Key, KeyEvent};

/// Map a key plus shift state to bytes for the shell
pub fn encode(key: Key, shift: bool) -> Option<Vec<u8>> {
    let bytes: &[u8] = match key {
        Key::Enter => b"\r\n",
        Key::Backspace => b"\x08",
        Key::Tab => b"\t",
        Key::Escape => b"\x1b",
        Key::Space => b" ",

        // Cursor keys, normal mode
        Key::Up => b"\x1b[A",
        Key::Down => b"\x1b[B",
        Key::Right => b"\x1b[C",
        Key::Left => b"\x1b[D",

        Key::Letter(ch) => return letter(ch, shift),
        Key::Digit(n) | Key::NumPad(n) => return digit(n),

        Key::Decimal => b".",
        Key::Add => b"+",
        Key::Subtract => b"-",
        Key::Multiply => b"*",
        Key::Divide => b"/",

        _ => return punctuation(key, shift).map(|ch| vec![ch]),
    };

    Some(bytes.to_vec())
}

/// Map a full key event, preferring text the platform already composed
pub fn encode_event(event: &KeyEvent) -> Option<Vec<u8>> {
    match event.text.as_deref() {
        Some(text) if !text.is_empty() => Some(text.as_bytes().to_vec()),
        _ => encode(event.key, event.shift()),
    }
}

fn letter(ch: char, shift: bool) -> Option<Vec<u8>> {
    if !ch.is_ascii_alphabetic() {
        return None;
    }
    let ch = if shift {
        ch.to_ascii_uppercase()
    } else {
        ch.to_ascii_lowercase()
    };
    Some(vec![ch as u8])
}

fn digit(n: u8) -> Option<Vec<u8>> {
    (n <= 9).then(|| vec![b'0' + n])
}

/// Unshifted/shifted pairs for the punctuation keys
fn punctuation(key: Key, shift: bool) -> Option<u8> {
    let (plain, shifted) = match key {
        Key::OemComma => (b',', b';'),
        Key::OemPeriod => (b'.', b':'),
        Key::OemMinus => (b'-', b'_'),
        Key::OemPlus => (b'=', b'+'),
        Key::Oem1 => (b';', b':'),
        Key::Oem2 => (b'/', b'?'),
        Key::Oem3 => (b'`', b'~'),
        Key::Oem4 => (b'[', b'{'),
        Key::Oem5 => (b'\\', b'|'),
        Key::Oem6 => (b']', b'}'),
        Key::Oem7 => (b'\'', b'"'),
        _ => return None,
    };
    Some(if shift { shifted } else { plain })
}
