//! Scanline renderer.
//!
//! The CRTC decides which bytes make up a displayed line; the gate array
//! turns each byte into pixels. This module only places the result in a
//! 384x272 ARGB framebuffer: 48 characters across (four pixels per byte)
//! and the lines from 36 above the display area down to the bottom border.

use motorola_6845::LineFetch;

use crate::gate_array::GateArray;
use crate::memory::Memory;

pub const FB_WIDTH: usize = 384;
pub const FB_HEIGHT: usize = 272;

/// Scanlines in a standard 50 Hz frame.
pub const FRAME_LINES: u32 = 312;

/// Framebuffer row of the first display line.
pub const TOP_BORDER: u32 = 36;

/// Widest display, in CRTC characters, that fits the framebuffer.
const MAX_CHARS: usize = FB_WIDTH / 8;

pub struct Video {
    framebuffer: Vec<u32>,
    line: u32,
}

impl Default for Video {
    fn default() -> Self {
        Self::new()
    }
}

impl Video {
    #[must_use]
    pub fn new() -> Self {
        Self {
            framebuffer: vec![0xFF00_0000; FB_WIDTH * FB_HEIGHT],
            line: TOP_BORDER,
        }
    }

    /// The CRTC reached the top of the display area.
    pub fn frame_top(&mut self) {
        self.line = TOP_BORDER;
    }

    /// Framebuffer row the next scanline lands on (may be off screen).
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Draw one scanline and advance.
    pub fn render_line(&mut self, fetch: Option<&LineFetch>, memory: &Memory, ga: &mut GateArray) {
        let y = (self.line % FRAME_LINES) as usize;
        self.line = self.line.wrapping_add(1);
        if y >= FB_HEIGHT {
            return;
        }

        let row = &mut self.framebuffer[y * FB_WIDTH..(y + 1) * FB_WIDTH];
        row.fill(ga.border_argb());

        let Some(fetch) = fetch else {
            return;
        };
        let chars = usize::from(fetch.chars).min(MAX_CHARS);
        let mut x = (MAX_CHARS - chars) * 8 / 2;
        if fetch.shifted {
            x += 4;
        }
        for addr in fetch.addresses().take(chars * 2) {
            if x + 4 > FB_WIDTH {
                break;
            }
            let pixels = ga.byte_pixels(memory.screen_byte(addr));
            row[x..x + 4].copy_from_slice(&pixels);
            x += 4;
        }
    }

    #[must_use]
    pub fn framebuffer(&self) -> &[u32] {
        &self.framebuffer
    }
}
