//! CB, ED and index (DD/FD) pages.

#![allow(clippy::cast_possible_truncation)]

use crate::Z80Bus;
use crate::alu;
use crate::flags::{CF, DEC_FLAGS, HF, INC_FLAGS, NF, PF, SF, SZ53, SZ53P, XF, YF, ZF};
use crate::tables::{CYCLES, CYCLES_CB, CYCLES_ED, CYCLES_XX, CYCLES_XXCB};

use super::Z80;

impl Z80 {
    // =========================================================================
    // CB page
    // =========================================================================

    pub(super) fn execute_cb<B: Z80Bus>(&mut self, bus: &mut B) -> u32 {
        let op = self.fetch_opcode(bus);
        let r = op & 7;
        let hl = self.regs.hl();
        let v = if r == 6 { bus.read(hl) } else { self.get_reg8(r) };

        let result = match op >> 6 {
            // RLC RRC RL RR SLA SRA SLL SRL
            0 => {
                let res = alu::rotate_shift(op >> 3, v, self.regs.f & CF != 0);
                self.regs.f = res.flags;
                Some(res.value)
            }
            // BIT b, r
            1 => {
                let xy = if r == 6 { (hl >> 8) as u8 } else { v };
                self.bit_flags((op >> 3) & 7, v, xy);
                None
            }
            // RES b, r
            2 => Some(v & !(1 << ((op >> 3) & 7))),
            // SET b, r
            _ => Some(v | (1 << ((op >> 3) & 7))),
        };

        if let Some(value) = result {
            if r == 6 {
                bus.write(hl, value);
            } else {
                self.set_reg8(r, value);
            }
        }
        u32::from(CYCLES_CB[op as usize])
    }

    fn bit_flags(&mut self, bit: u8, v: u8, xy: u8) {
        let set = v & (1 << bit) != 0;
        let mut f = (self.regs.f & CF) | HF | (xy & (YF | XF));
        if !set {
            f |= ZF | PF;
        }
        if bit == 7 && set {
            f |= SF;
        }
        self.regs.f = f;
    }

    // =========================================================================
    // ED page
    // =========================================================================

    pub(super) fn execute_ed<B: Z80Bus>(&mut self, bus: &mut B) -> u32 {
        let op = self.fetch_opcode(bus);
        let mut cycles = u32::from(CYCLES_ED[op as usize]);

        match op {
            // IN r, (C) (70 = IN (C): flags only)
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
                let v = bus.io_read(self.regs.bc());
                self.regs.f = (self.regs.f & CF) | SZ53P[v as usize];
                if op != 0x70 {
                    self.set_reg8(op >> 3, v);
                }
            }

            // OUT (C), r (71 = OUT (C),0)
            0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x71 | 0x79 => {
                let v = if op == 0x71 { 0 } else { self.get_reg8(op >> 3) };
                bus.io_write(self.regs.bc(), v);
            }

            // SBC HL, rr
            0x42 | 0x52 | 0x62 | 0x72 => {
                let carry = self.regs.f & CF != 0;
                let (v, f) = alu::sbc16(self.regs.hl(), self.get_rp(op >> 4), carry);
                self.regs.set_hl(v);
                self.regs.f = f;
            }

            // ADC HL, rr
            0x4A | 0x5A | 0x6A | 0x7A => {
                let carry = self.regs.f & CF != 0;
                let (v, f) = alu::adc16(self.regs.hl(), self.get_rp(op >> 4), carry);
                self.regs.set_hl(v);
                self.regs.f = f;
            }

            // LD (nn), rr
            0x43 | 0x53 | 0x63 | 0x73 => {
                let nn = self.fetch16(bus);
                Self::write16(bus, nn, self.get_rp(op >> 4));
            }

            // LD rr, (nn)
            0x4B | 0x5B | 0x6B | 0x7B => {
                let nn = self.fetch16(bus);
                let v = Self::read16(bus, nn);
                self.set_rp(op >> 4, v);
            }

            // NEG (and mirrors)
            0x44 | 0x4C | 0x54 | 0x5C | 0x64 | 0x6C | 0x74 | 0x7C => {
                let res = alu::sub8(0, self.regs.a, false);
                self.regs.a = res.value;
                self.regs.f = res.flags;
            }

            // RETN / RETI (and mirrors)
            0x45 | 0x4D | 0x55 | 0x5D | 0x65 | 0x6D | 0x75 | 0x7D => {
                self.regs.pc = self.pop(bus);
                self.regs.iff1 = self.regs.iff2;
            }

            // IM 0 / IM 1 / IM 2
            0x46 | 0x4E | 0x66 | 0x6E => self.regs.im = 0,
            0x56 | 0x76 => self.regs.im = 1,
            0x5E | 0x7E => self.regs.im = 2,

            // LD I, A / LD R, A
            0x47 => self.regs.i = self.regs.a,
            0x4F => self.regs.set_r_value(self.regs.a),

            // LD A, I / LD A, R: P/V reports IFF2
            0x57 | 0x5F => {
                let v = if op == 0x57 {
                    self.regs.i
                } else {
                    self.regs.r_value()
                };
                self.regs.a = v;
                self.regs.f =
                    (self.regs.f & CF) | SZ53[v as usize] | if self.regs.iff2 { PF } else { 0 };
            }

            // RRD
            0x67 => {
                let hl = self.regs.hl();
                let m = bus.read(hl);
                let a = self.regs.a;
                bus.write(hl, (a << 4) | (m >> 4));
                self.regs.a = (a & 0xF0) | (m & 0x0F);
                self.regs.f = (self.regs.f & CF) | SZ53P[self.regs.a as usize];
            }

            // RLD
            0x6F => {
                let hl = self.regs.hl();
                let m = bus.read(hl);
                let a = self.regs.a;
                bus.write(hl, (m << 4) | (a & 0x0F));
                self.regs.a = (a & 0xF0) | (m >> 4);
                self.regs.f = (self.regs.f & CF) | SZ53P[self.regs.a as usize];
            }

            // LDI / LDD / LDIR / LDDR
            0xA0 | 0xA8 | 0xB0 | 0xB8 => {
                let step = if op & 0x08 == 0 { 1u16 } else { 0xFFFF };
                let v = bus.read(self.regs.hl());
                bus.write(self.regs.de(), v);
                self.regs.set_hl(self.regs.hl().wrapping_add(step));
                self.regs.set_de(self.regs.de().wrapping_add(step));
                self.regs.set_bc(self.regs.bc().wrapping_sub(1));
                self.block_load_flags(v);
                if op & 0x10 != 0 {
                    if self.regs.bc() == 0 {
                        cycles -= 4;
                    } else {
                        self.regs.pc = self.regs.pc.wrapping_sub(2);
                    }
                }
            }

            // CPI / CPD / CPIR / CPDR
            0xA1 | 0xA9 | 0xB1 | 0xB9 => {
                let step = if op & 0x08 == 0 { 1u16 } else { 0xFFFF };
                let v = bus.read(self.regs.hl());
                let a = self.regs.a;
                let res = a.wrapping_sub(v);
                self.regs.set_hl(self.regs.hl().wrapping_add(step));
                self.regs.set_bc(self.regs.bc().wrapping_sub(1));

                let half = (a & 0x0F) < (v & 0x0F);
                let n = res.wrapping_sub(u8::from(half));
                let mut f = (self.regs.f & CF) | NF | (SZ53[res as usize] & (SF | ZF));
                f |= (n & XF) | ((n << 4) & YF);
                if half {
                    f |= HF;
                }
                if self.regs.bc() != 0 {
                    f |= PF;
                }
                self.regs.f = f;

                if op & 0x10 != 0 {
                    if self.regs.bc() != 0 && res != 0 {
                        self.regs.pc = self.regs.pc.wrapping_sub(2);
                    } else {
                        cycles -= 4;
                    }
                }
            }

            // INI / IND / INIR / INDR
            0xA2 | 0xAA | 0xB2 | 0xBA => {
                let step = if op & 0x08 == 0 { 1u16 } else { 0xFFFF };
                let v = bus.io_read(self.regs.bc());
                bus.write(self.regs.hl(), v);
                self.regs.set_hl(self.regs.hl().wrapping_add(step));
                self.regs.b = self.regs.b.wrapping_sub(1);
                let c = self.regs.c.wrapping_add(step as u8);
                self.block_io_flags(v, u16::from(v) + u16::from(c));
                self.repeat_while_b(op, &mut cycles);
            }

            // OUTI / OUTD / OTIR / OTDR: B is decremented before the write
            0xA3 | 0xAB | 0xB3 | 0xBB => {
                let step = if op & 0x08 == 0 { 1u16 } else { 0xFFFF };
                let v = bus.read(self.regs.hl());
                self.regs.b = self.regs.b.wrapping_sub(1);
                bus.io_write(self.regs.bc(), v);
                self.regs.set_hl(self.regs.hl().wrapping_add(step));
                self.block_io_flags(v, u16::from(v) + u16::from(self.regs.l));
                self.repeat_while_b(op, &mut cycles);
            }

            _ => self.report_illegal(bus, 0xED, op),
        }

        cycles
    }

    fn repeat_while_b(&mut self, op: u8, cycles: &mut u32) {
        if op & 0x10 != 0 {
            if self.regs.b == 0 {
                *cycles -= 4;
            } else {
                self.regs.pc = self.regs.pc.wrapping_sub(2);
            }
        }
    }

    // =========================================================================
    // DD / FD pages
    // =========================================================================

    fn index_reg(&self, prefix: u8) -> u16 {
        if prefix == 0xDD {
            self.regs.ix
        } else {
            self.regs.iy
        }
    }

    fn set_index_reg(&mut self, prefix: u8, value: u16) {
        if prefix == 0xDD {
            self.regs.ix = value;
        } else {
            self.regs.iy = value;
        }
    }

    /// 8-bit register with H and L replaced by the index register halves.
    fn get_reg8_indexed(&self, r: u8, prefix: u8) -> u8 {
        let xy = self.index_reg(prefix);
        match r & 7 {
            4 => (xy >> 8) as u8,
            5 => xy as u8,
            _ => self.get_reg8(r),
        }
    }

    fn set_reg8_indexed(&mut self, r: u8, prefix: u8, value: u8) {
        let xy = self.index_reg(prefix);
        match r & 7 {
            4 => self.set_index_reg(prefix, (xy & 0x00FF) | (u16::from(value) << 8)),
            5 => self.set_index_reg(prefix, (xy & 0xFF00) | u16::from(value)),
            _ => self.set_reg8(r, value),
        }
    }

    pub(super) fn execute_index<B: Z80Bus>(&mut self, bus: &mut B, prefix: u8) -> u32 {
        let op = self.fetch_opcode(bus);
        let table = u32::from(CYCLES_XX[op as usize]);

        match op {
            // Another index prefix: this one costs a NOP and the next is
            // decoded afresh on the following step.
            0xDD | 0xFD => {
                if prefix == 0xFD && op == 0xFD {
                    let next = bus.read(self.regs.pc);
                    bus.fd_prefix_repeat(next, &self.regs);
                }
                self.regs.pc = self.regs.pc.wrapping_sub(1);
                self.regs.r = self.regs.r.wrapping_sub(1) & 0x7F;
                return 4;
            }

            0xCB => return self.execute_index_cb(bus, prefix),

            // ADD IX, rr (09=BC, 19=DE, 29=IX, 39=SP)
            0x09 | 0x19 | 0x29 | 0x39 => {
                let xy = self.index_reg(prefix);
                let rr = if op == 0x29 { xy } else { self.get_rp(op >> 4) };
                let (result, flags) = alu::add16(xy, rr);
                self.set_index_reg(prefix, result);
                self.regs.f = (self.regs.f & (SF | ZF | PF)) | flags;
            }

            // LD IX, nn
            0x21 => {
                let nn = self.fetch16(bus);
                self.set_index_reg(prefix, nn);
            }

            // LD (nn), IX
            0x22 => {
                let nn = self.fetch16(bus);
                Self::write16(bus, nn, self.index_reg(prefix));
            }

            // LD IX, (nn)
            0x2A => {
                let nn = self.fetch16(bus);
                let v = Self::read16(bus, nn);
                self.set_index_reg(prefix, v);
            }

            // INC IX / DEC IX
            0x23 => self.set_index_reg(prefix, self.index_reg(prefix).wrapping_add(1)),
            0x2B => self.set_index_reg(prefix, self.index_reg(prefix).wrapping_sub(1)),

            // INC IXH / INC IXL
            0x24 | 0x2C => {
                let v = self.get_reg8_indexed(op >> 3, prefix).wrapping_add(1);
                self.set_reg8_indexed(op >> 3, prefix, v);
                self.regs.f = (self.regs.f & CF) | INC_FLAGS[v as usize];
            }

            // DEC IXH / DEC IXL
            0x25 | 0x2D => {
                let v = self.get_reg8_indexed(op >> 3, prefix).wrapping_sub(1);
                self.set_reg8_indexed(op >> 3, prefix, v);
                self.regs.f = (self.regs.f & CF) | DEC_FLAGS[v as usize];
            }

            // LD IXH, n / LD IXL, n
            0x26 | 0x2E => {
                let n = self.fetch8(bus);
                self.set_reg8_indexed(op >> 3, prefix, n);
            }

            // INC (IX+d) / DEC (IX+d)
            0x34 | 0x35 => {
                let addr = self.fetch_displaced(bus, self.index_reg(prefix));
                let m = bus.read(addr);
                let (v, f) = if op == 0x34 {
                    let v = m.wrapping_add(1);
                    (v, INC_FLAGS[v as usize])
                } else {
                    let v = m.wrapping_sub(1);
                    (v, DEC_FLAGS[v as usize])
                };
                bus.write(addr, v);
                self.regs.f = (self.regs.f & CF) | f;
            }

            // LD (IX+d), n
            0x36 => {
                let addr = self.fetch_displaced(bus, self.index_reg(prefix));
                let n = self.fetch8(bus);
                bus.write(addr, n);
            }

            // LD r, (IX+d): the destination is the real H/L
            0x46 | 0x4E | 0x56 | 0x5E | 0x66 | 0x6E | 0x7E => {
                let addr = self.fetch_displaced(bus, self.index_reg(prefix));
                let v = bus.read(addr);
                self.set_reg8(op >> 3, v);
            }

            // LD (IX+d), r: the source is the real H/L
            0x70..=0x75 | 0x77 => {
                let addr = self.fetch_displaced(bus, self.index_reg(prefix));
                bus.write(addr, self.get_reg8(op));
            }

            // LD r, r' with IXH/IXL standing in for H/L
            0x40..=0x7F if op != 0x76 => {
                let v = self.get_reg8_indexed(op, prefix);
                self.set_reg8_indexed(op >> 3, prefix, v);
            }

            // ALU A, (IX+d)
            0x86 | 0x8E | 0x96 | 0x9E | 0xA6 | 0xAE | 0xB6 | 0xBE => {
                let addr = self.fetch_displaced(bus, self.index_reg(prefix));
                let v = bus.read(addr);
                self.alu_a(op >> 3, v);
            }

            // ALU A, IXH/IXL
            0x80..=0xBF => {
                let v = self.get_reg8_indexed(op, prefix);
                self.alu_a(op >> 3, v);
            }

            // POP IX
            0xE1 => {
                let v = self.pop(bus);
                self.set_index_reg(prefix, v);
            }

            // EX (SP), IX
            0xE3 => {
                let sp = self.regs.sp;
                let v = Self::read16(bus, sp);
                Self::write16(bus, sp, self.index_reg(prefix));
                self.set_index_reg(prefix, v);
            }

            // PUSH IX
            0xE5 => {
                let v = self.index_reg(prefix);
                self.push(bus, v);
            }

            // JP (IX)
            0xE9 => self.regs.pc = self.index_reg(prefix),

            // LD SP, IX
            0xF9 => self.regs.sp = self.index_reg(prefix),

            // The prefix does not apply: run the opcode as if unprefixed
            _ => return 4 + self.execute_unprefixed(bus, op),
        }

        if table == 0 {
            4 + u32::from(CYCLES[op as usize])
        } else {
            table
        }
    }

    /// DD CB d op / FD CB d op. Neither the displacement nor the final
    /// opcode is an M1 fetch, so R is not advanced for them.
    fn execute_index_cb<B: Z80Bus>(&mut self, bus: &mut B, prefix: u8) -> u32 {
        let addr = self.fetch_displaced(bus, self.index_reg(prefix));
        let op = self.fetch8(bus);
        let v = bus.read(addr);
        let r = op & 7;

        let result = match op >> 6 {
            0 => {
                let res = alu::rotate_shift(op >> 3, v, self.regs.f & CF != 0);
                self.regs.f = res.flags;
                Some(res.value)
            }
            1 => {
                self.bit_flags((op >> 3) & 7, v, (addr >> 8) as u8);
                None
            }
            2 => Some(v & !(1 << ((op >> 3) & 7))),
            _ => Some(v | (1 << ((op >> 3) & 7))),
        };

        if let Some(value) = result {
            bus.write(addr, value);
            // Undocumented: the result is also copied to a register
            if r != 6 {
                self.set_reg8(r, value);
            }
        }
        u32::from(CYCLES_XXCB[op as usize])
    }
}
