//! Input handling for the CPC.
//!
//! `CpcKey` names each position in the 10x8 matrix; `InputQueue` schedules
//! presses and releases against frame numbers for scripted typing.

use std::collections::VecDeque;

use crate::keyboard::KeyboardState;

/// Logical key on the CPC 6128 keyboard (plus joystick 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpcKey {
    // Row 0
    CursorUp,
    CursorRight,
    CursorDown,
    F9,
    F6,
    F3,
    KeypadEnter,
    KeypadDot,
    // Row 1
    CursorLeft,
    Copy,
    F7,
    F8,
    F5,
    F1,
    F2,
    F0,
    // Row 2
    Clr,
    LeftBracket,
    Return,
    RightBracket,
    F4,
    Shift,
    Backslash,
    Control,
    // Row 3
    Caret,
    Minus,
    At,
    P,
    Semicolon,
    Colon,
    Slash,
    Period,
    // Row 4
    N0,
    N9,
    O,
    I,
    L,
    K,
    M,
    Comma,
    // Row 5
    N8,
    N7,
    U,
    Y,
    H,
    J,
    N,
    Space,
    // Row 6
    N6,
    N5,
    R,
    T,
    G,
    F,
    B,
    V,
    // Row 7
    N4,
    N3,
    E,
    W,
    S,
    D,
    C,
    X,
    // Row 8
    N1,
    N2,
    Escape,
    Q,
    Tab,
    A,
    CapsLock,
    Z,
    // Row 9
    JoyUp,
    JoyDown,
    JoyLeft,
    JoyRight,
    Fire1,
    Fire2,
    Fire3,
    Del,
}

impl CpcKey {
    /// Every key in matrix order.
    pub const ALL: [Self; 80] = [
        Self::CursorUp,
        Self::CursorRight,
        Self::CursorDown,
        Self::F9,
        Self::F6,
        Self::F3,
        Self::KeypadEnter,
        Self::KeypadDot,
        Self::CursorLeft,
        Self::Copy,
        Self::F7,
        Self::F8,
        Self::F5,
        Self::F1,
        Self::F2,
        Self::F0,
        Self::Clr,
        Self::LeftBracket,
        Self::Return,
        Self::RightBracket,
        Self::F4,
        Self::Shift,
        Self::Backslash,
        Self::Control,
        Self::Caret,
        Self::Minus,
        Self::At,
        Self::P,
        Self::Semicolon,
        Self::Colon,
        Self::Slash,
        Self::Period,
        Self::N0,
        Self::N9,
        Self::O,
        Self::I,
        Self::L,
        Self::K,
        Self::M,
        Self::Comma,
        Self::N8,
        Self::N7,
        Self::U,
        Self::Y,
        Self::H,
        Self::J,
        Self::N,
        Self::Space,
        Self::N6,
        Self::N5,
        Self::R,
        Self::T,
        Self::G,
        Self::F,
        Self::B,
        Self::V,
        Self::N4,
        Self::N3,
        Self::E,
        Self::W,
        Self::S,
        Self::D,
        Self::C,
        Self::X,
        Self::N1,
        Self::N2,
        Self::Escape,
        Self::Q,
        Self::Tab,
        Self::A,
        Self::CapsLock,
        Self::Z,
        Self::JoyUp,
        Self::JoyDown,
        Self::JoyLeft,
        Self::JoyRight,
        Self::Fire1,
        Self::Fire2,
        Self::Fire3,
        Self::Del,
    ];

    /// (row, bit) in the keyboard matrix.
    #[must_use]
    pub fn matrix(self) -> (usize, u8) {
        // Variants are declared in matrix order.
        let index = self as usize;
        (index / 8, (index % 8) as u8)
    }
}

/// A timed keyboard event.
#[derive(Debug, Clone)]
pub struct InputEvent {
    /// Frame number at which this event fires.
    pub frame: u64,
    pub key: CpcKey,
    /// True = press, false = release.
    pub pressed: bool,
}

/// Timed input queue for scripted key sequences.
///
/// Events are kept sorted by frame and applied at the start of each frame.
#[derive(Debug, Default)]
pub struct InputQueue {
    events: VecDeque<InputEvent>,
}

impl InputQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: InputEvent) {
        let pos = self
            .events
            .iter()
            .position(|e| e.frame > event.frame)
            .unwrap_or(self.events.len());
        self.events.insert(pos, event);
    }

    /// Press `key` at `at_frame` and release it `hold_frames` later.
    pub fn enqueue_key(&mut self, key: CpcKey, at_frame: u64, hold_frames: u64) {
        self.push(InputEvent {
            frame: at_frame,
            key,
            pressed: true,
        });
        self.push(InputEvent {
            frame: at_frame + hold_frames,
            key,
            pressed: false,
        });
    }

    /// Enqueue typing a string.
    ///
    /// Each character is held for 3 frames with a 3-frame gap. Returns the
    /// next free frame.
    pub fn enqueue_text(&mut self, text: &str, start_frame: u64) -> u64 {
        let hold = 3u64;
        let gap = 3u64;
        let mut frame = start_frame;

        for ch in text.chars() {
            let keys = char_to_keys(ch);
            if keys.is_empty() {
                log::debug!("No CPC key for {ch:?}");
                continue;
            }
            for &key in &keys {
                self.enqueue_key(key, frame, hold);
            }
            frame += hold + gap;
        }

        frame
    }

    /// Apply every event due at or before `frame`.
    pub fn process(&mut self, frame: u64, keyboard: &mut KeyboardState) {
        while self.events.front().is_some_and(|e| e.frame <= frame) {
            let Some(event) = self.events.pop_front() else {
                break;
            };
            let (row, bit) = event.key.matrix();
            keyboard.set_key(row, bit, event.pressed);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Keys needed to type `ch` on a UK CPC keyboard.
fn char_to_keys(ch: char) -> Vec<CpcKey> {
    use CpcKey as K;
    let plain = |k| vec![k];
    let shifted = |k| vec![K::Shift, k];
    match ch.to_ascii_uppercase() {
        'A' => plain(K::A),
        'B' => plain(K::B),
        'C' => plain(K::C),
        'D' => plain(K::D),
        'E' => plain(K::E),
        'F' => plain(K::F),
        'G' => plain(K::G),
        'H' => plain(K::H),
        'I' => plain(K::I),
        'J' => plain(K::J),
        'K' => plain(K::K),
        'L' => plain(K::L),
        'M' => plain(K::M),
        'N' => plain(K::N),
        'O' => plain(K::O),
        'P' => plain(K::P),
        'Q' => plain(K::Q),
        'R' => plain(K::R),
        'S' => plain(K::S),
        'T' => plain(K::T),
        'U' => plain(K::U),
        'V' => plain(K::V),
        'W' => plain(K::W),
        'X' => plain(K::X),
        'Y' => plain(K::Y),
        'Z' => plain(K::Z),
        '0' => plain(K::N0),
        '1' => plain(K::N1),
        '2' => plain(K::N2),
        '3' => plain(K::N3),
        '4' => plain(K::N4),
        '5' => plain(K::N5),
        '6' => plain(K::N6),
        '7' => plain(K::N7),
        '8' => plain(K::N8),
        '9' => plain(K::N9),
        ' ' => plain(K::Space),
        '\n' => plain(K::Return),
        '-' => plain(K::Minus),
        '^' => plain(K::Caret),
        '@' => plain(K::At),
        '[' => plain(K::LeftBracket),
        ']' => plain(K::RightBracket),
        ';' => plain(K::Semicolon),
        ':' => plain(K::Colon),
        ',' => plain(K::Comma),
        '.' => plain(K::Period),
        '/' => plain(K::Slash),
        '\\' => plain(K::Backslash),
        '!' => shifted(K::N1),
        '"' => shifted(K::N2),
        '#' => shifted(K::N3),
        '$' => shifted(K::N4),
        '%' => shifted(K::N5),
        '&' => shifted(K::N6),
        '\'' => shifted(K::N7),
        '(' => shifted(K::N8),
        ')' => shifted(K::N9),
        '_' => shifted(K::N0),
        '=' => shifted(K::Minus),
        '|' => shifted(K::At),
        '+' => shifted(K::Semicolon),
        '*' => shifted(K::Colon),
        '<' => shifted(K::Comma),
        '>' => shifted(K::Period),
        '?' => shifted(K::Slash),
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_matrix_positions() {
        assert_eq!(CpcKey::CursorUp.matrix(), (0, 0));
        assert_eq!(CpcKey::Return.matrix(), (2, 2));
        assert_eq!(CpcKey::Shift.matrix(), (2, 5));
        assert_eq!(CpcKey::Space.matrix(), (5, 7));
        assert_eq!(CpcKey::A.matrix(), (8, 5));
        assert_eq!(CpcKey::Del.matrix(), (9, 7));
    }

    #[test]
    fn all_keys_in_matrix_order() {
        for (i, key) in CpcKey::ALL.iter().enumerate() {
            assert_eq!(key.matrix(), (i / 8, (i % 8) as u8), "{key:?}");
        }
    }

    #[test]
    fn process_applies_events() {
        let mut queue = InputQueue::new();
        let mut kbd = KeyboardState::new();
        queue.enqueue_key(CpcKey::A, 5, 3);

        queue.process(4, &mut kbd);
        assert_eq!(kbd.read(8), 0xFF);

        queue.process(5, &mut kbd);
        assert_eq!(kbd.read(8) & 0x20, 0);

        queue.process(8, &mut kbd);
        assert_eq!(kbd.read(8), 0xFF);
        assert!(queue.is_empty());
    }

    #[test]
    fn enqueue_text_spacing() {
        let mut queue = InputQueue::new();
        let next = queue.enqueue_text("run\"", 0);
        // Four characters, six frames each; the quote is shifted
        assert_eq!(next, 24);
        assert_eq!(queue.len(), 10);
    }

    #[test]
    fn unsupported_characters_skipped() {
        let mut queue = InputQueue::new();
        assert_eq!(queue.enqueue_text("\u{00A3}", 7), 7);
        assert!(queue.is_empty());
    }

    #[test]
    fn shifted_characters() {
        assert_eq!(char_to_keys('"'), vec![CpcKey::Shift, CpcKey::N2]);
        assert_eq!(char_to_keys('='), vec![CpcKey::Shift, CpcKey::Minus]);
        assert_eq!(char_to_keys('\n'), vec![CpcKey::Return]);
    }
}
