//! CPC keyboard matrix.
//!
//! Ten rows of eight keys, scanned through the PPI: port C bits 0-3 select
//! the row and the AY's port A (register 14) returns it. A pressed key reads
//! as 0. Row 9 carries the first joystick and DEL.
//!
//! | Row | Bits 0-7                                                     |
//! |-----|--------------------------------------------------------------|
//! | 0   | Up, Right, Down, F9, F6, F3, Enter (keypad), F.             |
//! | 1   | Left, Copy, F7, F8, F5, F1, F2, F0                           |
//! | 2   | Clr, [, Return, ], F4, Shift, \, Control                     |
//! | 3   | ^, -, @, P, ;, :, /, .                                       |
//! | 4   | 0, 9, O, I, L, K, M, ,                                       |
//! | 5   | 8, 7, U, Y, H, J, N, Space                                   |
//! | 6   | 6, 5, R, T, G, F, B, V                                       |
//! | 7   | 4, 3, E, W, S, D, C, X                                       |
//! | 8   | 1, 2, Esc, Q, Tab, A, Caps Lock, Z                           |
//! | 9   | Joy up, down, left, right, fire 1, fire 2, fire 3, Del       |

/// Number of matrix rows.
pub const ROWS: usize = 10;

/// Pressed keys, one bit per key (1 = pressed).
#[derive(Debug, Clone, Default)]
pub struct KeyboardState {
    rows: [u8; ROWS],
}

impl KeyboardState {
    #[must_use]
    pub fn new() -> Self {
        Self { rows: [0; ROWS] }
    }

    /// Set or clear a key. `row` is 0-9, `bit` is 0-7.
    pub fn set_key(&mut self, row: usize, bit: u8, pressed: bool) {
        if row < ROWS && bit < 8 {
            if pressed {
                self.rows[row] |= 1 << bit;
            } else {
                self.rows[row] &= !(1 << bit);
            }
        }
    }

    /// Active-low state of one row. Rows 10-15 have no keys and read as
    /// all released.
    #[must_use]
    pub fn read(&self, row: u8) -> u8 {
        self.rows
            .get(usize::from(row))
            .map_or(0xFF, |&pressed| !pressed)
    }

    pub fn release_all(&mut self) {
        self.rows = [0; ROWS];
    }
}
