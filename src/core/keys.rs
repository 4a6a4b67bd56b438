//! Key event types
//!
//! Logical key identifiers and modifier snapshots handed from the
//! presentation layer to the encoder.

use bitflags::bitflags;

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

/// Logical key identifier
///
/// Named after the physical keys of a US layout. `Oem1`..`Oem7` are the
/// punctuation keys that carry no better name (`;:`, `/?`, `` `~ ``, `[{`,
/// `\|`, `]}`, `'"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Enter,
    Backspace,
    Tab,
    Escape,
    Space,
    Up,
    Down,
    Left,
    Right,
    /// Letter key, `'A'..='Z'`
    Letter(char),
    /// Main row digit, `0..=9`
    Digit(u8),
    /// Numeric pad digit, `0..=9`
    NumPad(u8),
    Decimal,
    Add,
    Subtract,
    Multiply,
    Divide,
    OemComma,
    OemPeriod,
    OemMinus,
    OemPlus,
    Oem1,
    Oem2,
    Oem3,
    Oem4,
    Oem5,
    Oem6,
    Oem7,
    /// Anything the encoder has no mapping for
    Other,
}

impl Key {
    /// Every mapped key, in table order.
    #[allow(dead_code)]
    pub fn all() -> Vec<Key> {
        let mut keys = vec![
            Key::Enter,
            Key::Backspace,
            Key::Tab,
            Key::Escape,
            Key::Space,
            Key::Up,
            Key::Down,
            Key::Left,
            Key::Right,
        ];
        keys.extend(('A'..='Z').map(Key::Letter));
        keys.extend((0..=9).map(Key::Digit));
        keys.extend((0..=9).map(Key::NumPad));
        keys.extend([
            Key::Decimal,
            Key::Add,
            Key::Subtract,
            Key::Multiply,
            Key::Divide,
            Key::OemComma,
            Key::OemPeriod,
            Key::OemMinus,
            Key::OemPlus,
            Key::Oem1,
            Key::Oem2,
            Key::Oem3,
            Key::Oem4,
            Key::Oem5,
            Key::Oem6,
            Key::Oem7,
        ]);
        keys
    }
}

/// A key press as seen by the presentation layer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub modifiers: Modifiers,
    /// Text the platform already composed for this press, if any
    pub text: Option<String>,
}

impl KeyEvent {
    pub fn new(key: Key, modifiers: Modifiers) -> Self {
        Self {
            key,
            modifiers,
            text: None,
        }
    }

    /// Attach composed text to the event
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn shift(&self) -> bool {
        self.modifiers.contains(Modifiers::SHIFT)
    }
}
