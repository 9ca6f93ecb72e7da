//! The bus as the Z80 sees it.

use emu_core::Bus;

use crate::Registers;

/// A [`Bus`] with the extra hooks the Z80 core calls out on.
///
/// Every hook has a default, so a plain memory/IO bus only needs an empty
/// `impl Z80Bus for MyBus {}`.
pub trait Z80Bus: Bus {
    /// A maskable interrupt was accepted. The CPC gate array uses this to
    /// clear bit 5 of its scanline counter.
    fn interrupt_acknowledged(&mut self) {}

    /// The CPU fetched an opcode with no defined behaviour. `prefix` is 0
    /// for the unprefixed page, otherwise the prefix byte (0xED for the
    /// extended page). Execution continues as a NOP.
    fn illegal_opcode(&mut self, prefix: u8, opcode: u8, pc: u16) {
        log::warn!("illegal opcode {prefix:02X} {opcode:02X} at {pc:04X}");
    }

    /// Two FD prefixes in a row. `next` is the byte after the second FD.
    /// Cartridge hardware that snoops the bus (the Dandanator) latches
    /// register values on this sequence.
    fn fd_prefix_repeat(&mut self, next: u8, regs: &Registers) {
        let _ = (next, regs);
    }
}
