//! ALU operations for the Z80.

#![allow(clippy::cast_possible_truncation)] // Intentional truncation for low byte extraction.

use crate::flags::{CF, HF, NF, PF, SF, SZ53, SZ53P, XF, YF, ZF};

/// Result of an ALU operation with flags.
#[derive(Debug, Clone, Copy)]
pub struct AluResult {
    pub value: u8,
    pub flags: u8,
}

/// Add two bytes with optional carry, returning result and flags.
#[must_use]
pub fn add8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let result16 = u16::from(a) + u16::from(b) + u16::from(c);
    let result = result16 as u8;

    let mut flags = SZ53[result as usize];
    if (a & 0x0F) + (b & 0x0F) + c > 0x0F {
        flags |= HF;
    }
    // Both operands same sign, result different sign
    if (a ^ b) & 0x80 == 0 && (a ^ result) & 0x80 != 0 {
        flags |= PF;
    }
    if result16 > 0xFF {
        flags |= CF;
    }

    AluResult { value: result, flags }
}

/// Subtract two bytes with optional borrow, returning result and flags.
#[must_use]
pub fn sub8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let result = a.wrapping_sub(b).wrapping_sub(c);

    let mut flags = SZ53[result as usize] | NF;
    if (a & 0x0F) < (b & 0x0F) + c {
        flags |= HF;
    }
    // Operands different sign, result same sign as subtrahend
    if (a ^ b) & 0x80 != 0 && (b ^ result) & 0x80 == 0 {
        flags |= PF;
    }
    if u16::from(a) < u16::from(b) + u16::from(c) {
        flags |= CF;
    }

    AluResult { value: result, flags }
}

/// Compare (subtract without storing result). Y and X come from the operand.
#[must_use]
pub fn cp8(a: u8, b: u8) -> AluResult {
    let mut result = sub8(a, b, false);
    result.flags = (result.flags & !(YF | XF)) | (b & (YF | XF));
    result
}

/// AND operation.
#[must_use]
pub fn and8(a: u8, b: u8) -> AluResult {
    let value = a & b;
    AluResult {
        value,
        flags: SZ53P[value as usize] | HF,
    }
}

/// OR operation.
#[must_use]
pub fn or8(a: u8, b: u8) -> AluResult {
    let value = a | b;
    AluResult {
        value,
        flags: SZ53P[value as usize],
    }
}

/// XOR operation.
#[must_use]
pub fn xor8(a: u8, b: u8) -> AluResult {
    let value = a ^ b;
    AluResult {
        value,
        flags: SZ53P[value as usize],
    }
}

/// One of the eight CB-page rotate/shift operations, selected by bits 5-3
/// of the opcode: RLC, RRC, RL, RR, SLA, SRA, SLL, SRL.
#[must_use]
pub fn rotate_shift(kind: u8, a: u8, carry_in: bool) -> AluResult {
    let (value, carry) = match kind & 7 {
        0 => (a.rotate_left(1), a & 0x80 != 0),
        1 => (a.rotate_right(1), a & 1 != 0),
        2 => ((a << 1) | u8::from(carry_in), a & 0x80 != 0),
        3 => ((a >> 1) | (u8::from(carry_in) << 7), a & 1 != 0),
        4 => (a << 1, a & 0x80 != 0),
        5 => ((a >> 1) | (a & 0x80), a & 1 != 0),
        // SLL: undocumented, shifts a 1 into bit 0
        6 => ((a << 1) | 1, a & 0x80 != 0),
        _ => (a >> 1, a & 1 != 0),
    };
    AluResult {
        value,
        flags: SZ53P[value as usize] | if carry { CF } else { 0 },
    }
}

/// 16-bit add for HL/IX/IY. S, Z and P/V are left to the caller.
#[must_use]
pub fn add16(a: u16, b: u16) -> (u16, u8) {
    let result32 = u32::from(a) + u32::from(b);
    let result = result32 as u16;

    let mut flags = ((result >> 8) as u8) & (YF | XF);
    if (a & 0x0FFF) + (b & 0x0FFF) > 0x0FFF {
        flags |= HF;
    }
    if result32 > 0xFFFF {
        flags |= CF;
    }

    (result, flags)
}

/// 16-bit add with carry for HL.
#[must_use]
pub fn adc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = u16::from(carry);
    let result32 = u32::from(a) + u32::from(b) + u32::from(c);
    let result = result32 as u16;

    let mut flags = ((result >> 8) as u8) & (SF | YF | XF);
    if result == 0 {
        flags |= ZF;
    }
    if (a & 0x0FFF) + (b & 0x0FFF) + c > 0x0FFF {
        flags |= HF;
    }
    if (a ^ b) & 0x8000 == 0 && (a ^ result) & 0x8000 != 0 {
        flags |= PF;
    }
    if result32 > 0xFFFF {
        flags |= CF;
    }

    (result, flags)
}

/// 16-bit subtract with borrow for HL.
#[must_use]
pub fn sbc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = u16::from(carry);
    let result = a.wrapping_sub(b).wrapping_sub(c);

    let mut flags = NF | (((result >> 8) as u8) & (SF | YF | XF));
    if result == 0 {
        flags |= ZF;
    }
    if (a & 0x0FFF) < (b & 0x0FFF) + c {
        flags |= HF;
    }
    if (a ^ b) & 0x8000 != 0 && (b ^ result) & 0x8000 == 0 {
        flags |= PF;
    }
    if u32::from(a) < u32::from(b) + u32::from(c) {
        flags |= CF;
    }

    (result, flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add8_overflow_and_half_carry() {
        let r = add8(0x7F, 0x01, false);
        assert_eq!(r.value, 0x80);
        assert_eq!(r.flags & (SF | PF | HF), SF | PF | HF);
        assert_eq!(r.flags & CF, 0);
    }

    #[test]
    fn sub8_borrow() {
        let r = sub8(0x00, 0x01, false);
        assert_eq!(r.value, 0xFF);
        assert_ne!(r.flags & CF, 0);
        assert_ne!(r.flags & NF, 0);
    }

    #[test]
    fn cp_takes_xy_from_operand() {
        let r = cp8(0x00, 0x28);
        assert_eq!(r.flags & (YF | XF), YF | XF);
    }

    #[test]
    fn rotate_through_carry() {
        let r = rotate_shift(2, 0x80, true);
        assert_eq!(r.value, 0x01);
        assert_ne!(r.flags & CF, 0);
        let r = rotate_shift(7, 0x01, false);
        assert_eq!(r.value, 0x00);
        assert_eq!(r.flags & (ZF | CF), ZF | CF);
    }

    #[test]
    fn sbc16_to_zero() {
        let (v, f) = sbc16(0x1000, 0x0FFF, true);
        assert_eq!(v, 0);
        assert_ne!(f & ZF, 0);
        assert_eq!(f & CF, 0);
    }
}
