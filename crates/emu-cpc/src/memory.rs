//! CPC memory banking.
//!
//! The Z80 sees four 16K windows. Each window has a read source and a
//! write source; writes always land in RAM, even when a ROM is visible for
//! reads at the same address.
//!
//! RAM is one arena: the base 64K followed by the expansion blocks. The MMR
//! picks one expansion block (bits 3-5, plus the 512K half from the port
//! address) and one of eight arrangements (bits 0-2):
//!
//! | MMR | Windows   |
//! |-----|-----------|
//! | 0   | 0 1 2 3   |
//! | 1   | 0 1 2 7   |
//! | 2   | 4 5 6 7   |
//! | 3   | 0 3 2 7   |
//! | 4-7 | 0 n 2 3   |
//!
//! Pages 4-7 are the four 16K pages of the selected expansion block.

#![allow(clippy::cast_possible_truncation)] // Block numbers fit in a byte.

use crate::config::{ROM_SIZE, RamSize};
use crate::dandanator::Dandanator;

const PAGE: usize = 0x4000;
const BLOCK: usize = 0x1_0000;

/// Where a window's bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Ram,
    /// Lower ROM (the OS).
    Os,
    Basic,
    Amsdos,
    /// Cartridge banks, 16K each.
    Cart,
    /// Dandanator flash slots, 16K each.
    Flash,
}

/// One 16K window: a source and the offset of its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub source: Source,
    pub base: usize,
}

impl Window {
    const fn ram(base: usize) -> Self {
        Self {
            source: Source::Ram,
            base,
        }
    }
}

/// Read and write tables for the four windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMap {
    pub read: [Window; 4],
    pub write: [Window; 4],
}

impl Default for MemoryMap {
    fn default() -> Self {
        let flat = [0, 1, 2, 3].map(|n| Window::ram(n * PAGE));
        Self {
            read: flat,
            write: flat,
        }
    }
}

/// Inputs to the banking decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySelect {
    pub mmr: u8,
    pub rmr: u8,
    pub urom: u8,
    /// 0 or 8: which half of a 1 MB expansion the MMR block number picks.
    pub bank_512k: u8,
    /// A CPR cartridge supplies the ROMs.
    pub cart_mode: bool,
}

/// RAM arena, ROM images and the current window tables.
pub struct Memory {
    ram: Vec<u8>,
    extra_blocks: usize,
    os: Vec<u8>,
    basic: Vec<u8>,
    amsdos: Vec<u8>,
    cart: Vec<u8>,
    flash: Vec<u8>,
    map: MemoryMap,
    high_water: u8,
}

impl Memory {
    /// ROM images must already be validated as 16K. Without AMSDOS, upper
    /// ROM 7 shows BASIC.
    #[must_use]
    pub fn new(os: Vec<u8>, basic: Vec<u8>, amsdos: Vec<u8>, ram: RamSize) -> Self {
        Self {
            ram: vec![0; ram.bytes()],
            extra_blocks: ram.extra_blocks(),
            os,
            basic,
            amsdos,
            cart: Vec::new(),
            flash: Vec::new(),
            map: MemoryMap::default(),
            high_water: 0,
        }
    }

    /// Recompute the window tables.
    pub fn configure(&mut self, select: &MemorySelect, dandanator: Option<&Dandanator>) {
        let bank = select.bank_512k | ((select.mmr >> 3) & 7);
        self.high_water = self.high_water.max(bank);
        let upper = BLOCK + (usize::from(bank) % self.extra_blocks.max(1)) * BLOCK;

        let base = |page: usize| Window::ram(page * PAGE);
        let up = |page: usize| Window::ram(upper + page * PAGE);
        let write = match select.mmr & 7 {
            0 => [base(0), base(1), base(2), base(3)],
            1 => [base(0), base(1), base(2), up(3)],
            2 => [up(0), up(1), up(2), up(3)],
            3 => [base(0), base(3), base(2), up(3)],
            n => [base(0), up(usize::from(n) - 4), base(2), base(3)],
        };

        let mut read = write;
        if select.rmr & 0x04 == 0 {
            read[0] = Self::lower_rom(select);
        }
        if select.rmr & 0x08 == 0 {
            read[3] = self.upper_rom(select);
        }
        if let Some(dan) = dandanator {
            dan.overlay(&mut read, select.rmr);
        }

        let map = MemoryMap { read, write };
        if map != self.map {
            log::trace!(
                "Memory: MMR={:02X} RMR={:02X} UROM={:02X} block={bank}",
                select.mmr,
                select.rmr,
                select.urom
            );
        }
        self.map = map;
    }

    fn lower_rom(select: &MemorySelect) -> Window {
        let source = if select.cart_mode {
            Source::Cart
        } else {
            Source::Os
        };
        Window { source, base: 0 }
    }

    fn upper_rom(&self, select: &MemorySelect) -> Window {
        let source = if select.cart_mode {
            if select.urom & 0x80 != 0 {
                return Window {
                    source: Source::Cart,
                    base: usize::from(select.urom & 0x1F) * PAGE,
                };
            }
            if select.urom == 3 {
                Source::Amsdos
            } else {
                Source::Basic
            }
        } else if select.urom == 7 && !self.amsdos.is_empty() {
            Source::Amsdos
        } else {
            Source::Basic
        };
        Window { source, base: 0 }
    }

    fn bytes(&self, source: Source) -> &[u8] {
        match source {
            Source::Ram => &self.ram,
            Source::Os => &self.os,
            Source::Basic => &self.basic,
            Source::Amsdos => &self.amsdos,
            Source::Cart => &self.cart,
            Source::Flash => &self.flash,
        }
    }

    #[must_use]
    pub fn read(&self, addr: u16) -> u8 {
        let window = self.map.read[usize::from(addr >> 14)];
        self.bytes(window.source)
            .get(window.base + usize::from(addr & 0x3FFF))
            .copied()
            .unwrap_or(0xFF)
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        let window = self.map.write[usize::from(addr >> 14)];
        if let Some(slot) = self.ram.get_mut(window.base + usize::from(addr & 0x3FFF)) {
            *slot = value;
        }
    }

    /// Base 64K as the video hardware sees it.
    #[must_use]
    pub fn screen_byte(&self, addr: u16) -> u8 {
        self.ram[usize::from(addr)]
    }

    #[must_use]
    pub fn map(&self) -> &MemoryMap {
        &self.map
    }

    /// Whole RAM arena.
    #[must_use]
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    pub fn clear_ram(&mut self) {
        self.ram.fill(0);
        self.high_water = 0;
    }

    /// Number of 64K expansion blocks.
    #[must_use]
    pub fn extra_blocks(&self) -> usize {
        self.extra_blocks
    }

    /// Highest expansion block ever selected.
    #[must_use]
    pub fn high_water(&self) -> u8 {
        self.high_water
    }

    pub fn set_high_water(&mut self, block: u8) {
        self.high_water = block;
    }

    /// Install cartridge banks (lower ROM = bank 0).
    pub fn set_cartridge(&mut self, banks: &[[u8; ROM_SIZE]]) {
        self.cart = banks.concat();
    }

    pub fn clear_cartridge(&mut self) {
        self.cart.clear();
    }

    /// Install a Dandanator flash image, padded with 0xFF to whole slots.
    pub fn set_flash(&mut self, mut image: Vec<u8>) {
        let slots = image.len().div_ceil(PAGE);
        image.resize(slots * PAGE, 0xFF);
        self.flash = image;
    }

    pub fn clear_flash(&mut self) {
        self.flash.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_memory(ram: RamSize) -> Memory {
        Memory::new(
            vec![0x0A; ROM_SIZE],
            vec![0x0B; ROM_SIZE],
            vec![0x07; ROM_SIZE],
            ram,
        )
    }

    fn select(mmr: u8, rmr: u8) -> MemorySelect {
        MemorySelect {
            mmr,
            rmr,
            ..MemorySelect::default()
        }
    }

    #[test]
    fn roms_visible_at_reset() {
        let mut mem = make_memory(RamSize::Kb128);
        mem.configure(&select(0, 0), None);
        assert_eq!(mem.read(0x0000), 0x0A);
        assert_eq!(mem.read(0xC000), 0x0B);
        assert_eq!(mem.read(0x4000), 0x00);
    }

    #[test]
    fn writes_go_under_rom() {
        let mut mem = make_memory(RamSize::Kb128);
        mem.configure(&select(0, 0), None);
        mem.write(0x0010, 0x55);
        assert_eq!(mem.read(0x0010), 0x0A);
        mem.configure(&select(0, 0x04), None);
        assert_eq!(mem.read(0x0010), 0x55);
    }

    #[test]
    fn upper_rom_select() {
        let mut mem = make_memory(RamSize::Kb128);
        let mut sel = select(0, 0);
        sel.urom = 7;
        mem.configure(&sel, None);
        assert_eq!(mem.read(0xC000), 0x07);
        sel.urom = 3;
        mem.configure(&sel, None);
        assert_eq!(mem.read(0xC000), 0x0B);
    }

    #[test]
    fn missing_amsdos_falls_back_to_basic() {
        let mut mem = Memory::new(
            vec![0; ROM_SIZE],
            vec![0x0B; ROM_SIZE],
            Vec::new(),
            RamSize::Kb128,
        );
        let sel = MemorySelect {
            urom: 7,
            ..MemorySelect::default()
        };
        mem.configure(&sel, None);
        assert_eq!(mem.read(0xC000), 0x0B);
    }

    #[test]
    fn mmr_arrangements() {
        let mut mem = make_memory(RamSize::Kb128);
        let ram_off = 0x0C;
        let windows = |mem: &Memory| mem.map().write.map(|w| w.base);

        mem.configure(&select(0xC1, ram_off), None);
        assert_eq!(windows(&mem), [0x0000, 0x4000, 0x8000, 0x1C000]);
        mem.configure(&select(0xC2, ram_off), None);
        assert_eq!(windows(&mem), [0x10000, 0x14000, 0x18000, 0x1C000]);
        mem.configure(&select(0xC3, ram_off), None);
        assert_eq!(windows(&mem), [0x0000, 0xC000, 0x8000, 0x1C000]);
        for n in 4..8 {
            mem.configure(&select(0xC0 | n, ram_off), None);
            assert_eq!(
                windows(&mem),
                [0x0000, 0x10000 + usize::from(n - 4) * PAGE, 0x8000, 0xC000]
            );
        }
    }

    #[test]
    fn config3_aliases_page3_into_window1() {
        let mut mem = make_memory(RamSize::Kb128);
        mem.configure(&select(0, 0x0C), None);
        mem.write(0xC123, 0x99);
        mem.configure(&select(3, 0x0C), None);
        assert_eq!(mem.read(0x4123), 0x99);
    }

    #[test]
    fn expansion_block_selection() {
        let mut mem = make_memory(RamSize::Kb576);
        // Block 5 (MMR bits 3-5), page 0 in window 1
        mem.configure(&select(0x2C, 0x0C), None);
        mem.write(0x4000, 0x42);
        assert_eq!(mem.ram()[0x10000 + 5 * BLOCK], 0x42);
        assert_eq!(mem.high_water(), 5);
    }

    #[test]
    fn block_wraps_to_installed_ram() {
        let mut mem = make_memory(RamSize::Kb128);
        mem.configure(&select(0x3C, 0x0C), None);
        assert_eq!(mem.map().write[1].base, 0x10000);
    }

    #[test]
    fn cartridge_mode_roms() {
        let mut mem = make_memory(RamSize::Kb128);
        let mut banks = vec![[0u8; ROM_SIZE]; 32];
        banks[0][0] = 0xC0;
        banks[5][0] = 0xC5;
        mem.set_cartridge(&banks);

        let mut sel = MemorySelect {
            cart_mode: true,
            urom: 0x85,
            ..MemorySelect::default()
        };
        mem.configure(&sel, None);
        assert_eq!(mem.read(0x0000), 0xC0);
        assert_eq!(mem.read(0xC000), 0xC5);

        sel.urom = 3;
        mem.configure(&sel, None);
        assert_eq!(mem.read(0xC000), 0x07);
        sel.urom = 0;
        mem.configure(&sel, None);
        assert_eq!(mem.read(0xC000), 0x0B);
    }

    #[test]
    fn dandanator_overlays_reads_only() {
        let mut mem = make_memory(RamSize::Kb128);
        let mut flash = vec![0u8; 2 * PAGE];
        flash[PAGE] = 0xD1;
        mem.set_flash(flash);
        let dan = Dandanator {
            zone0: 0x01,
            ..Dandanator::default()
        };
        mem.configure(&select(0, 0x0C), Some(&dan));
        assert_eq!(mem.read(0x0000), 0xD1);
        mem.write(0x0000, 0x33);
        assert_eq!(mem.read(0x0000), 0xD1);
        assert_eq!(mem.ram()[0], 0x33);
    }

    #[test]
    fn flash_padded_to_slots() {
        let mut mem = make_memory(RamSize::Kb128);
        mem.set_flash(vec![0x11; 100]);
        let dan = Dandanator::default();
        mem.configure(&select(0, 0), Some(&dan));
        assert_eq!(mem.read(0x0000), 0x11);
        assert_eq!(mem.read(0x0064), 0xFF);
    }
}
