//! Key mapping for console input
//!
//! Converts crossterm key events to bridge key events, and picks out the
//! hotkeys the console handles itself.

use crossterm::event::{
    KeyCode, KeyEvent as ConsoleKeyEvent, KeyEventKind, KeyEventState, KeyModifiers,
};

use crate::core::keys::{Key, KeyEvent, Modifiers};

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        result
    }
}

/// Console-level commands, never forwarded to the shell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hotkey {
    /// Ctrl+Q: stop the shell and quit
    Quit,
    /// Ctrl+R: start a new shell if none is running
    Restart,
}

/// What a console key press turns into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Hotkey(Hotkey),
    Key(KeyEvent),
    Ignored,
}

/// Key mapper for console key events
pub struct KeyMapper;

impl KeyMapper {
    pub fn map(event: &ConsoleKeyEvent) -> Input {
        // Windows reports releases too
        if event.kind == KeyEventKind::Release {
            return Input::Ignored;
        }

        let mods = Modifiers::from(event.modifiers);

        if mods.contains(Modifiers::CTRL) && !mods.contains(Modifiers::ALT) {
            return match event.code {
                KeyCode::Char('q') | KeyCode::Char('Q') => Input::Hotkey(Hotkey::Quit),
                KeyCode::Char('r') | KeyCode::Char('R') => Input::Hotkey(Hotkey::Restart),
                _ => Input::Ignored,
            };
        }

        let key = match event.code {
            KeyCode::Char(ch) => {
                // Ctrl+Alt arrives for AltGr compositions; plain Alt chords are dropped
                let altgr = mods.contains(Modifiers::CTRL | Modifiers::ALT)
                    && !ch.is_ascii_alphanumeric();
                if mods.contains(Modifiers::ALT) && !altgr {
                    return Input::Ignored;
                }
                let key = if event.state.contains(KeyEventState::KEYPAD) {
                    keypad_key_for_char(ch)
                } else {
                    key_for_char(ch)
                };
                return Input::Key(KeyEvent::new(key, mods).with_text(ch));
            }
            _ if mods.contains(Modifiers::ALT) => return Input::Ignored,
            KeyCode::Enter => Key::Enter,
            KeyCode::Backspace => Key::Backspace,
            KeyCode::Tab => Key::Tab,
            KeyCode::BackTab => return Input::Key(KeyEvent::new(Key::Tab, mods | Modifiers::SHIFT)),
            KeyCode::Esc => Key::Escape,
            KeyCode::Up => Key::Up,
            KeyCode::Down => Key::Down,
            KeyCode::Left => Key::Left,
            KeyCode::Right => Key::Right,
            _ => Key::Other,
        };

        Input::Key(KeyEvent::new(key, mods))
    }
}

/// Physical key that produces `ch` on a US layout
fn key_for_char(ch: char) -> Key {
    match ch {
        'a'..='z' | 'A'..='Z' => Key::Letter(ch.to_ascii_uppercase()),
        '0'..='9' => Key::Digit(ch as u8 - b'0'),
        ' ' => Key::Space,
        ',' | '<' => Key::OemComma,
        '.' | '>' => Key::OemPeriod,
        '-' | '_' => Key::OemMinus,
        '=' | '+' => Key::OemPlus,
        ';' | ':' => Key::Oem1,
        '/' | '?' => Key::Oem2,
        '`' | '~' => Key::Oem3,
        '[' | '{' => Key::Oem4,
        '\\' | '|' => Key::Oem5,
        ']' | '}' => Key::Oem6,
        '\'' | '"' => Key::Oem7,
        _ => Key::Other,
    }
}

/// Numeric pad key that produces `ch`
fn keypad_key_for_char(ch: char) -> Key {
    match ch {
        '0'..='9' => Key::NumPad(ch as u8 - b'0'),
        '.' => Key::Decimal,
        '+' => Key::Add,
        '-' => Key::Subtract,
        '*' => Key::Multiply,
        '/' => Key::Divide,
        _ => key_for_char(ch),
    }
}
