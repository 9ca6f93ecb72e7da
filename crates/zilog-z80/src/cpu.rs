//! Z80 CPU state, instruction stepping and interrupt delivery.

#![allow(clippy::cast_possible_truncation)]

mod execute;
mod prefixed;

use emu_core::{Cpu, Observable, Value};

use crate::Z80Bus;
use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
use crate::registers::Registers;

/// Stack pointer after a power-on reset.
const RESET_SP: u16 = 0xF000;

/// The Z80 CPU.
///
/// Instruction-stepped: `step()` fetches, decodes and executes one whole
/// instruction, then adds its CPC cost to `t_states`. The machine runs the
/// CPU in slices with [`Cpu::run_until`] and delivers interrupts between
/// slices.
pub struct Z80 {
    pub(crate) regs: Registers,

    /// T-states executed since the counter was last rebased.
    t_states: u32,

    /// EI was executed; interrupts open after the next instruction.
    ei_pending: bool,

    /// Interrupt line held by the gate array until it can be accepted.
    int_pending: bool,

    /// Data bus byte supplied with the pending interrupt.
    int_vector: u8,
}

/// Complete CPU state for save states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Z80State {
    pub regs: Registers,
    pub t_states: u32,
    pub ei_pending: bool,
    pub int_pending: bool,
    pub int_vector: u8,
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

impl Z80 {
    /// Create a new Z80 in the power-on state.
    #[must_use]
    pub fn new() -> Self {
        let mut cpu = Self {
            regs: Registers::default(),
            t_states: 0,
            ei_pending: false,
            int_pending: false,
            int_vector: 0xFF,
        };
        cpu.reset();
        cpu
    }

    /// Capture the complete CPU state.
    #[must_use]
    pub fn state(&self) -> Z80State {
        Z80State {
            regs: self.regs,
            t_states: self.t_states,
            ei_pending: self.ei_pending,
            int_pending: self.int_pending,
            int_vector: self.int_vector,
        }
    }

    /// Restore a state captured with [`Z80::state`].
    pub fn restore(&mut self, state: &Z80State) {
        self.regs = state.regs;
        self.t_states = state.t_states;
        self.ei_pending = state.ei_pending;
        self.int_pending = state.int_pending;
        self.int_vector = state.int_vector;
    }

    /// Mutable access to the register file, for snapshot loaders.
    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    /// Subtract `amount` from the T-state counter so it never overflows.
    pub fn rebase(&mut self, amount: u32) {
        self.t_states = self.t_states.saturating_sub(amount);
    }

    /// True while an interrupt is held waiting for IFF1.
    #[must_use]
    pub fn interrupt_pending(&self) -> bool {
        self.int_pending
    }

    /// True between EI and the end of the instruction that follows it.
    #[must_use]
    pub fn ei_pending(&self) -> bool {
        self.ei_pending
    }

    /// Get the program counter.
    #[must_use]
    pub fn pc(&self) -> u16 {
        self.regs.pc
    }

    /// T-states executed since the last rebase.
    #[must_use]
    pub fn t_states(&self) -> u32 {
        self.t_states
    }

    /// Copy of the register file.
    #[must_use]
    pub fn registers(&self) -> Registers {
        self.regs
    }

    /// True while the CPU is spinning on a HALT.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.regs.halted
    }

    /// Power-on state: registers cleared, SP at the top of memory.
    pub fn reset(&mut self) {
        self.regs = Registers {
            sp: RESET_SP,
            ..Registers::default()
        };
        self.t_states = 0;
        self.ei_pending = false;
        self.int_pending = false;
        self.int_vector = 0xFF;
    }

    // Test helpers
    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_pc(&mut self, value: u16) {
        self.regs.pc = value;
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_sp(&mut self, value: u16) {
        self.regs.sp = value;
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_a(&mut self, value: u8) {
        self.regs.a = value;
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_f(&mut self, value: u8) {
        self.regs.f = value;
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_bc(&mut self, value: u16) {
        self.regs.set_bc(value);
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_de(&mut self, value: u16) {
        self.regs.set_de(value);
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_hl(&mut self, value: u16) {
        self.regs.set_hl(value);
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_ix(&mut self, value: u16) {
        self.regs.ix = value;
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_iy(&mut self, value: u16) {
        self.regs.iy = value;
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_i(&mut self, value: u8) {
        self.regs.i = value;
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_im(&mut self, value: u8) {
        self.regs.im = value;
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_iff(&mut self, enabled: bool) {
        self.regs.iff1 = enabled;
        self.regs.iff2 = enabled;
    }

    // =========================================================================
    // Fetch and memory helpers
    // =========================================================================

    /// Opcode fetch (M1): reads at PC and advances the refresh counter.
    pub(crate) fn fetch_opcode<B: Z80Bus>(&mut self, bus: &mut B) -> u8 {
        let op = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.regs.inc_r();
        op
    }

    pub(crate) fn fetch8<B: Z80Bus>(&mut self, bus: &mut B) -> u8 {
        let v = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        v
    }

    pub(crate) fn fetch16<B: Z80Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch8(bus);
        let hi = self.fetch8(bus);
        u16::from_le_bytes([lo, hi])
    }

    /// Fetch a displacement and add it to `base`.
    pub(crate) fn fetch_displaced<B: Z80Bus>(&mut self, bus: &mut B, base: u16) -> u16 {
        let d = self.fetch8(bus) as i8;
        base.wrapping_add(d as u16)
    }

    pub(crate) fn read16<B: Z80Bus>(bus: &mut B, addr: u16) -> u16 {
        let lo = bus.read(addr);
        let hi = bus.read(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    pub(crate) fn write16<B: Z80Bus>(bus: &mut B, addr: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        bus.write(addr, lo);
        bus.write(addr.wrapping_add(1), hi);
    }

    pub(crate) fn push<B: Z80Bus>(&mut self, bus: &mut B, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(self.regs.sp, hi);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(self.regs.sp, lo);
    }

    pub(crate) fn pop<B: Z80Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = bus.read(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let hi = bus.read(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        u16::from_le_bytes([lo, hi])
    }

    // =========================================================================
    // Register decoding
    // =========================================================================

    /// 8-bit register by the 3-bit opcode field (6 = (HL) is handled by callers).
    pub(crate) fn get_reg8(&self, r: u8) -> u8 {
        match r & 7 {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => self.regs.h,
            5 => self.regs.l,
            7 => self.regs.a,
            _ => 0xFF,
        }
    }

    pub(crate) fn set_reg8(&mut self, r: u8, value: u8) {
        match r & 7 {
            0 => self.regs.b = value,
            1 => self.regs.c = value,
            2 => self.regs.d = value,
            3 => self.regs.e = value,
            4 => self.regs.h = value,
            5 => self.regs.l = value,
            7 => self.regs.a = value,
            _ => {}
        }
    }

    /// Register pair by the 2-bit field: BC, DE, HL, SP.
    pub(crate) fn get_rp(&self, rp: u8) -> u16 {
        match rp & 3 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            _ => self.regs.sp,
        }
    }

    pub(crate) fn set_rp(&mut self, rp: u8, value: u16) {
        match rp & 3 {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.regs.set_hl(value),
            _ => self.regs.sp = value,
        }
    }

    /// Register pair for PUSH/POP: BC, DE, HL, AF.
    pub(crate) fn get_rp2(&self, rp: u8) -> u16 {
        match rp & 3 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            _ => self.regs.af(),
        }
    }

    pub(crate) fn set_rp2(&mut self, rp: u8, value: u16) {
        match rp & 3 {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.regs.set_hl(value),
            _ => self.regs.set_af(value),
        }
    }

    /// Condition by the 3-bit field: NZ, Z, NC, C, PO, PE, P, M.
    pub(crate) fn condition(&self, cc: u8) -> bool {
        let f = self.regs.f;
        match cc & 7 {
            0 => f & ZF == 0,
            1 => f & ZF != 0,
            2 => f & CF == 0,
            3 => f & CF != 0,
            4 => f & PF == 0,
            5 => f & PF != 0,
            6 => f & SF == 0,
            _ => f & SF != 0,
        }
    }

    // =========================================================================
    // Interrupts
    // =========================================================================

    /// Accept a maskable interrupt. Returns the T-states charged.
    fn accept_interrupt<B: Z80Bus>(&mut self, bus: &mut B) -> u32 {
        if self.regs.halted {
            self.regs.halted = false;
            self.regs.pc = self.regs.pc.wrapping_add(1);
        }
        let cost = if self.regs.im == 2 { 20 } else { 8 };
        self.t_states = self.t_states.wrapping_add(cost);

        let pc = self.regs.pc;
        self.push(bus, pc);
        self.int_pending = false;
        self.ei_pending = false;
        self.regs.iff1 = false;
        self.regs.iff2 = false;

        self.regs.pc = match self.regs.im {
            2 => {
                let vector = (u16::from(self.regs.i) << 8) | u16::from(self.int_vector);
                Self::read16(bus, vector)
            }
            1 => 0x0038,
            // IM 0: the data bus byte is executed; on the CPC it is an RST.
            _ => u16::from(self.int_vector & 0x38),
        };
        bus.interrupt_acknowledged();
        cost
    }

    fn accept_nmi<B: Z80Bus>(&mut self, bus: &mut B) {
        if self.regs.halted {
            self.regs.halted = false;
            self.regs.pc = self.regs.pc.wrapping_add(1);
        }
        let cost = if self.regs.im == 2 { 20 } else { 8 };
        self.t_states = self.t_states.wrapping_add(cost);
        let pc = self.regs.pc;
        self.push(bus, pc);
        self.regs.iff1 = false;
        self.ei_pending = false;
        self.regs.pc = 0x0066;
    }

    pub(crate) fn report_illegal<B: Z80Bus>(&self, bus: &mut B, prefix: u8, opcode: u8) {
        let len = if prefix == 0 { 1 } else { 2 };
        bus.illegal_opcode(prefix, opcode, self.regs.pc.wrapping_sub(len));
    }

    /// Flags shared by LDI/LDD: Y and X come from A + the byte moved.
    pub(crate) fn block_load_flags(&mut self, value: u8) {
        let n = value.wrapping_add(self.regs.a);
        let mut f = (self.regs.f & (SF | ZF | CF)) | (n & XF) | ((n << 4) & YF);
        if self.regs.bc() != 0 {
            f |= PF;
        }
        self.regs.f = f;
    }

    /// Flags shared by INI/IND/OUTI/OUTD.
    pub(crate) fn block_io_flags(&mut self, value: u8, k: u16) {
        let b = self.regs.b;
        let mut f = crate::flags::SZ53[b as usize];
        if value & 0x80 != 0 {
            f |= NF;
        }
        if k > 0xFF {
            f |= HF | CF;
        }
        if crate::flags::parity(((k as u8) & 7) ^ b) {
            f |= PF;
        }
        self.regs.f = f;
    }
}

impl<B: Z80Bus> Cpu<B> for Z80 {
    type Registers = Registers;

    fn step(&mut self, bus: &mut B) -> u32 {
        let enabling = self.ei_pending;

        let op = self.fetch_opcode(bus);
        let mut cycles = self.execute_unprefixed(bus, op);
        self.t_states = self.t_states.wrapping_add(cycles);

        // EI takes effect one instruction late; a request held by the gate
        // array is taken as soon as it does.
        if enabling && self.ei_pending {
            self.ei_pending = false;
            self.regs.iff1 = true;
            self.regs.iff2 = true;
            if self.int_pending {
                cycles += self.accept_interrupt(bus);
            }
        }
        cycles
    }

    fn t_states(&self) -> u32 {
        Z80::t_states(self)
    }

    fn pc(&self) -> u32 {
        u32::from(self.regs.pc)
    }

    fn registers(&self) -> Self::Registers {
        Z80::registers(self)
    }

    fn is_halted(&self) -> bool {
        Z80::is_halted(self)
    }

    fn interrupt(&mut self, bus: &mut B, vector: u8) -> bool {
        self.int_vector = vector;
        if self.regs.iff1 && !self.ei_pending {
            self.accept_interrupt(bus);
            true
        } else {
            self.int_pending = true;
            false
        }
    }

    fn nmi(&mut self, bus: &mut B) {
        self.accept_nmi(bus);
    }

    fn reset(&mut self) {
        Z80::reset(self);
    }
}

/// All query paths supported by the Z80.
const Z80_QUERY_PATHS: &[&str] = &[
    // Main registers
    "a", "f", "b", "c", "d", "e", "h", "l",
    // Register pairs
    "af", "bc", "de", "hl",
    // Alternate pairs
    "af'", "bc'", "de'", "hl'",
    // Index registers
    "ix", "iy",
    // Other registers
    "sp", "pc", "i", "r",
    // Individual flags
    "flags.s", "flags.z", "flags.h", "flags.p", "flags.n", "flags.c",
    // Interrupt state
    "iff1", "iff2", "im", "ei_pending", "int_pending",
    // CPU state
    "halted", "t_states",
];

impl Observable for Z80 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "a" => Some(self.regs.a.into()),
            "f" => Some(self.regs.f.into()),
            "b" => Some(self.regs.b.into()),
            "c" => Some(self.regs.c.into()),
            "d" => Some(self.regs.d.into()),
            "e" => Some(self.regs.e.into()),
            "h" => Some(self.regs.h.into()),
            "l" => Some(self.regs.l.into()),

            "af" => Some(self.regs.af().into()),
            "bc" => Some(self.regs.bc().into()),
            "de" => Some(self.regs.de().into()),
            "hl" => Some(self.regs.hl().into()),

            "af'" => Some(self.regs.af_alt().into()),
            "bc'" => Some(self.regs.bc_alt().into()),
            "de'" => Some(self.regs.de_alt().into()),
            "hl'" => Some(self.regs.hl_alt().into()),

            "ix" => Some(self.regs.ix.into()),
            "iy" => Some(self.regs.iy.into()),

            "sp" => Some(self.regs.sp.into()),
            "pc" => Some(self.regs.pc.into()),
            "i" => Some(self.regs.i.into()),
            "r" => Some(self.regs.r_value().into()),

            "flags.s" => Some((self.regs.f & SF != 0).into()),
            "flags.z" => Some((self.regs.f & ZF != 0).into()),
            "flags.h" => Some((self.regs.f & HF != 0).into()),
            "flags.p" => Some((self.regs.f & PF != 0).into()),
            "flags.n" => Some((self.regs.f & NF != 0).into()),
            "flags.c" => Some((self.regs.f & CF != 0).into()),

            "iff1" => Some(self.regs.iff1.into()),
            "iff2" => Some(self.regs.iff2.into()),
            "im" => Some(self.regs.im.into()),
            "ei_pending" => Some(self.ei_pending.into()),
            "int_pending" => Some(self.int_pending.into()),

            "halted" => Some(self.regs.halted.into()),
            "t_states" => Some(self.t_states.into()),

            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        Z80_QUERY_PATHS
    }
}
