//! Gate array: pens, inks, screen mode and the ROM/RAM configuration
//! registers.
//!
//! Writes to &7Fxx are decoded by the top two data bits:
//!
//! | Bits 7-6 | Register | Effect                                          |
//! |----------|----------|-------------------------------------------------|
//! | 00       | PENR     | Select pen 0-15, or the border when bit 4 set   |
//! | 01       | INKR     | Hardware colour for the selected pen            |
//! | 10       | RMR      | Mode (bits 0-1), ROM disables (2-3), R52 reset  |
//! | 11       | MMR      | RAM configuration (bits 0-2), 64K block (3-5)   |
//!
//! The renderer wants four framebuffer pixels per screen byte, so the gate
//! array keeps a 256-entry table of pre-inked pixels for the current mode
//! and rebuilds it lazily after an ink or mode change.

use serde::{Deserialize, Serialize};

use crate::palette;

/// Index of the border in the ink table.
pub const BORDER: usize = 16;

/// Framebuffer pixels produced by one screen byte.
pub type BytePixels = [u32; 4];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateArray {
    pen: u8,
    /// Hardware colour numbers for pens 0-15 and the border.
    inks: [u8; 17],
    rmr: u8,
    mmr: u8,
    #[serde(skip)]
    pixels: Vec<BytePixels>,
    #[serde(skip)]
    table_mode: Option<u8>,
}

impl Default for GateArray {
    fn default() -> Self {
        Self::new()
    }
}

impl GateArray {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pen: 0,
            inks: [0; 17],
            rmr: 0,
            mmr: 0,
            pixels: vec![[0; 4]; 256],
            table_mode: None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// PENR write.
    pub fn select_pen(&mut self, value: u8) {
        self.pen = value & 0x1F;
    }

    #[must_use]
    pub fn pen(&self) -> u8 {
        self.pen
    }

    /// INKR write: colour the selected pen.
    pub fn set_ink(&mut self, value: u8) {
        let index = if self.pen & 0x10 != 0 {
            BORDER
        } else {
            usize::from(self.pen & 0x0F)
        };
        let colour = value & 0x1F;
        if self.inks[index] != colour {
            self.inks[index] = colour;
            if index != BORDER {
                self.table_mode = None;
            }
        }
    }

    /// Hardware colour number of pen `index` (16 = border).
    #[must_use]
    pub fn ink(&self, index: usize) -> u8 {
        self.inks[index.min(BORDER)]
    }

    #[must_use]
    pub fn inks(&self) -> [u8; 17] {
        self.inks
    }

    /// RMR write. Returns true when bit 4 asks for the raster interrupt
    /// counter to be cleared.
    pub fn set_rmr(&mut self, value: u8) -> bool {
        self.rmr = value & 0x1F;
        value & 0x10 != 0
    }

    #[must_use]
    pub fn rmr(&self) -> u8 {
        self.rmr
    }

    /// MMR write.
    pub fn set_mmr(&mut self, value: u8) {
        self.mmr = value & 0x3F;
    }

    #[must_use]
    pub fn mmr(&self) -> u8 {
        self.mmr
    }

    /// Screen mode (0-3).
    #[must_use]
    pub fn mode(&self) -> u8 {
        self.rmr & 3
    }

    /// Load pens, inks and configuration registers in one go (snapshot
    /// restore).
    pub fn load(&mut self, pen: u8, inks: &[u8; 17], rmr: u8, mmr: u8) {
        self.pen = pen & 0x1F;
        for (slot, &ink) in self.inks.iter_mut().zip(inks) {
            *slot = ink & 0x1F;
        }
        self.rmr = rmr & 0x1F;
        self.mmr = mmr & 0x3F;
        self.table_mode = None;
    }

    /// Force the pixel table to be rebuilt on next use.
    pub fn invalidate(&mut self) {
        self.table_mode = None;
    }

    /// Border colour as ARGB32.
    #[must_use]
    pub fn border_argb(&self) -> u32 {
        palette::argb(self.inks[BORDER])
    }

    /// Framebuffer pixels for one screen byte in the current mode.
    pub fn byte_pixels(&mut self, byte: u8) -> BytePixels {
        let mode = self.mode();
        if self.table_mode != Some(mode) {
            self.build_table(mode);
        }
        self.pixels[usize::from(byte)]
    }

    fn build_table(&mut self, mode: u8) {
        let colours: Vec<u32> = self.inks.iter().map(|&hw| palette::argb(hw)).collect();
        let ink = |pen: u8| colours[usize::from(pen)];
        self.pixels.resize(256, [0; 4]);
        for (byte, entry) in self.pixels.iter_mut().enumerate() {
            let b = byte as u8;
            *entry = match mode {
                0 | 3 => {
                    let (left, right) = mode0_pens(b);
                    let (left, right) = if mode == 3 {
                        (left & 3, right & 3)
                    } else {
                        (left, right)
                    };
                    [ink(left), ink(left), ink(right), ink(right)]
                }
                1 => mode1_pens(b).map(ink),
                // Mode 2 has eight pixels per byte; every other one is kept.
                _ => [7, 5, 3, 1].map(|bit| ink((b >> bit) & 1)),
            };
        }
        self.table_mode = Some(mode);
    }
}

/// Two 4-bit pens per byte, bits interleaved.
fn mode0_pens(b: u8) -> (u8, u8) {
    let left = ((b & 0x80) >> 7) | ((b & 0x20) >> 3) | ((b & 0x08) >> 2) | ((b & 0x02) << 2);
    let right = ((b & 0x40) >> 6) | ((b & 0x10) >> 2) | ((b & 0x04) >> 1) | ((b & 0x01) << 3);
    (left, right)
}

/// Four 2-bit pens per byte.
fn mode1_pens(b: u8) -> [u8; 4] {
    [
        ((b & 0x80) >> 7) | ((b & 0x08) >> 2),
        ((b & 0x40) >> 6) | ((b & 0x04) >> 1),
        ((b & 0x20) >> 5) | (b & 0x02),
        ((b & 0x10) >> 4) | ((b & 0x01) << 1),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: u32 = 0xFF00_0000;
    const BRIGHT_WHITE: u32 = 0xFFFF_FFFF;
    const BRIGHT_RED: u32 = 0xFFFF_0000;
    const BLUE: u32 = 0xFF00_0080;

    fn inked() -> GateArray {
        let mut ga = GateArray::new();
        for (pen, colour) in [(0, 0x14), (1, 0x0B), (2, 0x0C), (3, 0x04), (15, 0x0C)] {
            ga.select_pen(pen);
            ga.set_ink(0x40 | colour);
        }
        ga
    }

    #[test]
    fn border_selected_by_pen_bit_4() {
        let mut ga = GateArray::new();
        ga.select_pen(0x10);
        ga.set_ink(0x4C);
        assert_eq!(ga.ink(BORDER), 0x0C);
        assert_eq!(ga.ink(0), 0);
        assert_eq!(ga.border_argb(), BRIGHT_RED);
    }

    #[test]
    fn mode1_decodes_four_pixels() {
        let mut ga = inked();
        ga.set_rmr(0x01);
        // Pixels: pen 1, pen 0, pen 2, pen 3
        assert_eq!(
            ga.byte_pixels(0b1001_0011),
            [BRIGHT_WHITE, BLACK, BRIGHT_RED, BLUE]
        );
    }

    #[test]
    fn mode0_doubles_pixels() {
        let mut ga = inked();
        ga.set_rmr(0x00);
        // Left pixel pen 15, right pixel pen 0
        assert_eq!(
            ga.byte_pixels(0b1010_1010),
            [BRIGHT_RED, BRIGHT_RED, BLACK, BLACK]
        );
        // Left pen 1, right pen 2
        assert_eq!(
            ga.byte_pixels(0b1000_0100),
            [BRIGHT_WHITE, BRIGHT_WHITE, BRIGHT_RED, BRIGHT_RED]
        );
    }

    #[test]
    fn mode2_samples_alternate_pixels() {
        let mut ga = inked();
        ga.set_rmr(0x02);
        assert_eq!(
            ga.byte_pixels(0b1000_1000),
            [BRIGHT_WHITE, BLACK, BRIGHT_WHITE, BLACK]
        );
    }

    #[test]
    fn mode3_limits_to_four_pens() {
        let mut ga = inked();
        ga.set_rmr(0x03);
        // Pen 15 folds onto pen 3
        assert_eq!(ga.byte_pixels(0b1010_1010)[0], BLUE);
    }

    #[test]
    fn ink_change_rebuilds_table() {
        let mut ga = inked();
        ga.set_rmr(0x01);
        assert_eq!(ga.byte_pixels(0)[0], BLACK);
        ga.select_pen(0);
        ga.set_ink(0x4B);
        assert_eq!(ga.byte_pixels(0)[0], BRIGHT_WHITE);
    }

    #[test]
    fn rmr_bit4_requests_counter_reset() {
        let mut ga = GateArray::new();
        assert!(ga.set_rmr(0x9C));
        assert_eq!(ga.rmr(), 0x1C);
        assert!(!ga.set_rmr(0x8D));
        assert_eq!(ga.mode(), 1);
    }
}
