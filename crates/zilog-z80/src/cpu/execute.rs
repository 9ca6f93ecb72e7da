//! Unprefixed instruction execution.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

use crate::Z80Bus;
use crate::alu;
use crate::flags::{CF, DAA, DEC_FLAGS, HF, INC_FLAGS, NF, PF, SF, XF, YF, ZF};
use crate::tables::CYCLES;

use super::Z80;

impl Z80 {
    /// Execute an unprefixed opcode (already fetched). Returns its cost,
    /// including any prefixed page it leads into.
    pub(super) fn execute_unprefixed<B: Z80Bus>(&mut self, bus: &mut B, op: u8) -> u32 {
        let mut cycles = u32::from(CYCLES[op as usize]);

        match op {
            // NOP
            0x00 => {}

            // LD rr, nn (01=BC, 11=DE, 21=HL, 31=SP)
            0x01 | 0x11 | 0x21 | 0x31 => {
                let nn = self.fetch16(bus);
                self.set_rp(op >> 4, nn);
            }

            // LD (BC), A / LD (DE), A
            0x02 => bus.write(self.regs.bc(), self.regs.a),
            0x12 => bus.write(self.regs.de(), self.regs.a),

            // INC rr (03=BC, 13=DE, 23=HL, 33=SP)
            0x03 | 0x13 | 0x23 | 0x33 => {
                let rp = op >> 4;
                self.set_rp(rp, self.get_rp(rp).wrapping_add(1));
            }

            // DEC rr (0B=BC, 1B=DE, 2B=HL, 3B=SP)
            0x0B | 0x1B | 0x2B | 0x3B => {
                let rp = op >> 4;
                self.set_rp(rp, self.get_rp(rp).wrapping_sub(1));
            }

            // INC (HL)
            0x34 => {
                let hl = self.regs.hl();
                let v = bus.read(hl).wrapping_add(1);
                bus.write(hl, v);
                self.regs.f = (self.regs.f & CF) | INC_FLAGS[v as usize];
            }

            // DEC (HL)
            0x35 => {
                let hl = self.regs.hl();
                let v = bus.read(hl).wrapping_sub(1);
                bus.write(hl, v);
                self.regs.f = (self.regs.f & CF) | DEC_FLAGS[v as usize];
            }

            // INC r (04=B, 0C=C, 14=D, 1C=E, 24=H, 2C=L, 3C=A)
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x3C => {
                let r = op >> 3;
                let v = self.get_reg8(r).wrapping_add(1);
                self.set_reg8(r, v);
                self.regs.f = (self.regs.f & CF) | INC_FLAGS[v as usize];
            }

            // DEC r (05=B, 0D=C, 15=D, 1D=E, 25=H, 2D=L, 3D=A)
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x3D => {
                let r = op >> 3;
                let v = self.get_reg8(r).wrapping_sub(1);
                self.set_reg8(r, v);
                self.regs.f = (self.regs.f & CF) | DEC_FLAGS[v as usize];
            }

            // LD (HL), n
            0x36 => {
                let n = self.fetch8(bus);
                bus.write(self.regs.hl(), n);
            }

            // LD r, n (06=B, 0E=C, 16=D, 1E=E, 26=H, 2E=L, 3E=A)
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x3E => {
                let n = self.fetch8(bus);
                self.set_reg8(op >> 3, n);
            }

            // RLCA / RRCA / RLA / RRA
            0x07 | 0x0F | 0x17 | 0x1F => {
                let a = self.regs.a;
                let carry_in = self.regs.f & CF != 0;
                let (value, carry) = match op {
                    0x07 => (a.rotate_left(1), a & 0x80 != 0),
                    0x0F => (a.rotate_right(1), a & 1 != 0),
                    0x17 => ((a << 1) | u8::from(carry_in), a & 0x80 != 0),
                    _ => ((a >> 1) | (u8::from(carry_in) << 7), a & 1 != 0),
                };
                self.regs.a = value;
                self.regs.f = (self.regs.f & (SF | ZF | PF))
                    | (value & (YF | XF))
                    | if carry { CF } else { 0 };
            }

            // EX AF, AF'
            0x08 => self.regs.ex_af(),

            // ADD HL, rr (09=BC, 19=DE, 29=HL, 39=SP)
            0x09 | 0x19 | 0x29 | 0x39 => {
                let (result, flags) = alu::add16(self.regs.hl(), self.get_rp(op >> 4));
                self.regs.set_hl(result);
                self.regs.f = (self.regs.f & (SF | ZF | PF)) | flags;
            }

            // LD A, (BC) / LD A, (DE)
            0x0A => self.regs.a = bus.read(self.regs.bc()),
            0x1A => self.regs.a = bus.read(self.regs.de()),

            // DJNZ e (table assumes the branch)
            0x10 => {
                let target = self.fetch_displaced(bus, self.regs.pc.wrapping_add(1));
                self.regs.b = self.regs.b.wrapping_sub(1);
                if self.regs.b == 0 {
                    cycles -= 4;
                } else {
                    self.regs.pc = target;
                }
            }

            // JR e
            0x18 => {
                let target = self.fetch_displaced(bus, self.regs.pc.wrapping_add(1));
                self.regs.pc = target;
            }

            // JR cc, e (20=NZ, 28=Z, 30=NC, 38=C; table assumes the branch)
            0x20 | 0x28 | 0x30 | 0x38 => {
                let target = self.fetch_displaced(bus, self.regs.pc.wrapping_add(1));
                if self.condition((op >> 3) & 3) {
                    self.regs.pc = target;
                } else {
                    cycles -= 4;
                }
            }

            // LD (nn), HL
            0x22 => {
                let nn = self.fetch16(bus);
                Self::write16(bus, nn, self.regs.hl());
            }

            // LD HL, (nn)
            0x2A => {
                let nn = self.fetch16(bus);
                let v = Self::read16(bus, nn);
                self.regs.set_hl(v);
            }

            // LD (nn), A
            0x32 => {
                let nn = self.fetch16(bus);
                bus.write(nn, self.regs.a);
            }

            // LD A, (nn)
            0x3A => {
                let nn = self.fetch16(bus);
                self.regs.a = bus.read(nn);
            }

            // DAA
            0x27 => {
                let index = usize::from(self.regs.a)
                    | (usize::from(self.regs.f & CF) << 8)
                    | (usize::from((self.regs.f & HF) >> 4) << 9)
                    | (usize::from((self.regs.f & NF) >> 1) << 10);
                self.regs.set_af(DAA[index]);
            }

            // CPL
            0x2F => {
                self.regs.a = !self.regs.a;
                self.regs.f = (self.regs.f & (SF | ZF | PF | CF))
                    | HF
                    | NF
                    | (self.regs.a & (YF | XF));
            }

            // SCF
            0x37 => {
                self.regs.f = (self.regs.f & (SF | ZF | PF)) | (self.regs.a & (YF | XF)) | CF;
            }

            // CCF (old carry moves to H)
            0x3F => {
                let carry = self.regs.f & CF != 0;
                self.regs.f = (self.regs.f & (SF | ZF | PF))
                    | (self.regs.a & (YF | XF))
                    | if carry { HF } else { CF };
            }

            // HALT: PC stays on the HALT until an interrupt moves it on
            0x76 => {
                self.regs.halted = true;
                self.regs.pc = self.regs.pc.wrapping_sub(1);
            }

            // LD r, (HL)
            0x46 | 0x4E | 0x56 | 0x5E | 0x66 | 0x6E | 0x7E => {
                let v = bus.read(self.regs.hl());
                self.set_reg8(op >> 3, v);
            }

            // LD (HL), r
            0x70..=0x75 | 0x77 => {
                bus.write(self.regs.hl(), self.get_reg8(op));
            }

            // LD r, r'
            0x40..=0x7F => {
                let v = self.get_reg8(op);
                self.set_reg8(op >> 3, v);
            }

            // ALU A, (HL)
            0x86 | 0x8E | 0x96 | 0x9E | 0xA6 | 0xAE | 0xB6 | 0xBE => {
                let v = bus.read(self.regs.hl());
                self.alu_a(op >> 3, v);
            }

            // ALU A, r (ADD ADC SUB SBC AND XOR OR CP)
            0x80..=0xBF => {
                let v = self.get_reg8(op);
                self.alu_a(op >> 3, v);
            }

            // RET cc (table assumes not taken)
            0xC0 | 0xC8 | 0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 | 0xF8 => {
                if self.condition(op >> 3) {
                    self.regs.pc = self.pop(bus);
                    cycles += 8;
                }
            }

            // POP rr (C1=BC, D1=DE, E1=HL, F1=AF)
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let v = self.pop(bus);
                self.set_rp2(op >> 4, v);
            }

            // JP cc, nn
            0xC2 | 0xCA | 0xD2 | 0xDA | 0xE2 | 0xEA | 0xF2 | 0xFA => {
                let nn = self.fetch16(bus);
                if self.condition(op >> 3) {
                    self.regs.pc = nn;
                }
            }

            // JP nn
            0xC3 => self.regs.pc = self.fetch16(bus),

            // CALL cc, nn (table assumes not taken)
            0xC4 | 0xCC | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC => {
                let nn = self.fetch16(bus);
                if self.condition(op >> 3) {
                    let pc = self.regs.pc;
                    self.push(bus, pc);
                    self.regs.pc = nn;
                    cycles += 8;
                }
            }

            // PUSH rr (C5=BC, D5=DE, E5=HL, F5=AF)
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                let v = self.get_rp2(op >> 4);
                self.push(bus, v);
            }

            // ALU A, n
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let n = self.fetch8(bus);
                self.alu_a(op >> 3, n);
            }

            // RST p
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                let pc = self.regs.pc;
                self.push(bus, pc);
                self.regs.pc = u16::from(op & 0x38);
            }

            // RET
            0xC9 => self.regs.pc = self.pop(bus),

            // CALL nn
            0xCD => {
                let nn = self.fetch16(bus);
                let pc = self.regs.pc;
                self.push(bus, pc);
                self.regs.pc = nn;
            }

            // OUT (n), A: A drives the top half of the port address
            0xD3 => {
                let n = self.fetch8(bus);
                let port = (u16::from(self.regs.a) << 8) | u16::from(n);
                bus.io_write(port, self.regs.a);
            }

            // IN A, (n)
            0xDB => {
                let n = self.fetch8(bus);
                let port = (u16::from(self.regs.a) << 8) | u16::from(n);
                self.regs.a = bus.io_read(port);
            }

            // EXX
            0xD9 => self.regs.exx(),

            // EX (SP), HL
            0xE3 => {
                let sp = self.regs.sp;
                let v = Self::read16(bus, sp);
                Self::write16(bus, sp, self.regs.hl());
                self.regs.set_hl(v);
            }

            // JP (HL)
            0xE9 => self.regs.pc = self.regs.hl(),

            // EX DE, HL
            0xEB => {
                let de = self.regs.de();
                self.regs.set_de(self.regs.hl());
                self.regs.set_hl(de);
            }

            // DI: a request already held by the gate array stays held
            0xF3 => {
                self.regs.iff1 = false;
                self.regs.iff2 = false;
                self.ei_pending = false;
            }

            // EI: opens after the next instruction
            0xFB => {
                if !self.regs.iff1 {
                    self.regs.iff2 = true;
                    self.ei_pending = true;
                }
            }

            // LD SP, HL
            0xF9 => self.regs.sp = self.regs.hl(),

            // Prefixes
            0xCB => cycles += self.execute_cb(bus),
            0xED => cycles += self.execute_ed(bus),
            0xDD | 0xFD => cycles += self.execute_index(bus, op),
        }

        cycles
    }

    /// The eight accumulator operations selected by bits 5-3 of the opcode.
    pub(super) fn alu_a(&mut self, kind: u8, v: u8) {
        let a = self.regs.a;
        let carry = self.regs.f & CF != 0;
        let result = match kind & 7 {
            0 => alu::add8(a, v, false),
            1 => alu::add8(a, v, carry),
            2 => alu::sub8(a, v, false),
            3 => alu::sub8(a, v, carry),
            4 => alu::and8(a, v),
            5 => alu::xor8(a, v),
            6 => alu::or8(a, v),
            _ => {
                // CP: flags only
                self.regs.f = alu::cp8(a, v).flags;
                return;
            }
        };
        self.regs.a = result.value;
        self.regs.f = result.flags;
    }
}
