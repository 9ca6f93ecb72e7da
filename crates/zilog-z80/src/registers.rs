//! Z80 register set.

#![allow(clippy::cast_possible_truncation)] // Intentional truncation for low byte extraction.

/// Z80 registers.
///
/// `r` holds the refresh counter; only its low seven bits count. Bit 7 is
/// whatever was last loaded with `LD R,A` and lives in `r7` so the counter
/// can never carry into it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Registers {
    // Main registers
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,

    // Alternate registers
    pub a_alt: u8,
    pub f_alt: u8,
    pub b_alt: u8,
    pub c_alt: u8,
    pub d_alt: u8,
    pub e_alt: u8,
    pub h_alt: u8,
    pub l_alt: u8,

    // Index registers
    pub ix: u16,
    pub iy: u16,

    // Other registers
    pub sp: u16,
    pub pc: u16,
    pub i: u8,
    pub r: u8,
    pub r7: u8,

    // Interrupt state
    pub iff1: bool,
    pub iff2: bool,
    pub im: u8,

    // Halt state
    pub halted: bool,
}

impl Registers {
    /// Get AF register pair.
    #[must_use]
    pub const fn af(&self) -> u16 {
        (self.a as u16) << 8 | self.f as u16
    }

    /// Get BC register pair.
    #[must_use]
    pub const fn bc(&self) -> u16 {
        (self.b as u16) << 8 | self.c as u16
    }

    /// Get DE register pair.
    #[must_use]
    pub const fn de(&self) -> u16 {
        (self.d as u16) << 8 | self.e as u16
    }

    /// Get HL register pair.
    #[must_use]
    pub const fn hl(&self) -> u16 {
        (self.h as u16) << 8 | self.l as u16
    }

    /// Refresh register as the CPU reports it (`LD A,R`).
    #[must_use]
    pub const fn r_value(&self) -> u8 {
        (self.r & 0x7F) | (self.r7 & 0x80)
    }

    /// Load the refresh register, splitting off the fixed top bit.
    pub fn set_r_value(&mut self, value: u8) {
        self.r = value & 0x7F;
        self.r7 = value & 0x80;
    }

    /// Advance the refresh counter by one M1 cycle.
    pub fn inc_r(&mut self) {
        self.r = self.r.wrapping_add(1) & 0x7F;
    }

    /// Set AF register pair.
    pub fn set_af(&mut self, value: u16) {
        self.a = (value >> 8) as u8;
        self.f = value as u8;
    }

    /// Set BC register pair.
    pub fn set_bc(&mut self, value: u16) {
        self.b = (value >> 8) as u8;
        self.c = value as u8;
    }

    /// Set DE register pair.
    pub fn set_de(&mut self, value: u16) {
        self.d = (value >> 8) as u8;
        self.e = value as u8;
    }

    /// Set HL register pair.
    pub fn set_hl(&mut self, value: u16) {
        self.h = (value >> 8) as u8;
        self.l = value as u8;
    }

    /// Alternate AF pair.
    #[must_use]
    pub const fn af_alt(&self) -> u16 {
        (self.a_alt as u16) << 8 | self.f_alt as u16
    }

    /// Alternate BC pair.
    #[must_use]
    pub const fn bc_alt(&self) -> u16 {
        (self.b_alt as u16) << 8 | self.c_alt as u16
    }

    /// Alternate DE pair.
    #[must_use]
    pub const fn de_alt(&self) -> u16 {
        (self.d_alt as u16) << 8 | self.e_alt as u16
    }

    /// Alternate HL pair.
    #[must_use]
    pub const fn hl_alt(&self) -> u16 {
        (self.h_alt as u16) << 8 | self.l_alt as u16
    }

    /// Set the alternate AF pair.
    pub fn set_af_alt(&mut self, value: u16) {
        self.a_alt = (value >> 8) as u8;
        self.f_alt = value as u8;
    }

    /// Set the alternate BC pair.
    pub fn set_bc_alt(&mut self, value: u16) {
        self.b_alt = (value >> 8) as u8;
        self.c_alt = value as u8;
    }

    /// Set the alternate DE pair.
    pub fn set_de_alt(&mut self, value: u16) {
        self.d_alt = (value >> 8) as u8;
        self.e_alt = value as u8;
    }

    /// Set the alternate HL pair.
    pub fn set_hl_alt(&mut self, value: u16) {
        self.h_alt = (value >> 8) as u8;
        self.l_alt = value as u8;
    }

    /// EXX: swap BC, DE, HL with their alternates.
    pub fn exx(&mut self) {
        std::mem::swap(&mut self.b, &mut self.b_alt);
        std::mem::swap(&mut self.c, &mut self.c_alt);
        std::mem::swap(&mut self.d, &mut self.d_alt);
        std::mem::swap(&mut self.e, &mut self.e_alt);
        std::mem::swap(&mut self.h, &mut self.h_alt);
        std::mem::swap(&mut self.l, &mut self.l_alt);
    }

    /// EX AF,AF'.
    pub fn ex_af(&mut self) {
        std::mem::swap(&mut self.a, &mut self.a_alt);
        std::mem::swap(&mut self.f, &mut self.f_alt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_counter_never_touches_bit_7() {
        let mut regs = Registers::default();
        regs.set_r_value(0xFF);
        regs.inc_r();
        assert_eq!(regs.r_value(), 0x80, "counter wraps inside 7 bits");
        regs.set_r_value(0x7F);
        regs.inc_r();
        assert_eq!(regs.r_value(), 0x00);
    }

    #[test]
    fn exx_leaves_af_alone() {
        let mut regs = Registers::default();
        regs.set_af(0x1234);
        regs.set_bc(0x5678);
        regs.set_bc_alt(0x9ABC);
        regs.exx();
        assert_eq!(regs.af(), 0x1234);
        assert_eq!(regs.bc(), 0x9ABC);
        assert_eq!(regs.bc_alt(), 0x5678);
    }
}
