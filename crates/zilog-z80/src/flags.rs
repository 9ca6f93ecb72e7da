//! Z80 flag register bits and precomputed flag tables.

/// Sign flag (bit 7) - set if result is negative.
pub const SF: u8 = 0b1000_0000;

/// Zero flag (bit 6) - set if result is zero.
pub const ZF: u8 = 0b0100_0000;

/// Undocumented flag (bit 5) - copy of bit 5 of result.
pub const YF: u8 = 0b0010_0000;

/// Half-carry flag (bit 4) - carry from bit 3 to bit 4.
pub const HF: u8 = 0b0001_0000;

/// Undocumented flag (bit 3) - copy of bit 3 of result.
pub const XF: u8 = 0b0000_1000;

/// Parity/Overflow flag (bit 2) - parity or overflow depending on instruction.
pub const PF: u8 = 0b0000_0100;

/// Add/Subtract flag (bit 1) - set if last operation was subtraction.
pub const NF: u8 = 0b0000_0010;

/// Carry flag (bit 0) - carry out of bit 7.
pub const CF: u8 = 0b0000_0001;

/// Compute parity of a byte (true if even number of 1 bits).
#[must_use]
pub const fn parity(value: u8) -> bool {
    value.count_ones().is_multiple_of(2)
}

const fn sz53_of(value: u8) -> u8 {
    let mut f = value & (SF | YF | XF);
    if value == 0 {
        f |= ZF;
    }
    f
}

const fn build_sz53() -> [u8; 256] {
    let mut t = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        t[i] = sz53_of(i as u8);
        i += 1;
    }
    t
}

const fn build_sz53p() -> [u8; 256] {
    let mut t = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let v = i as u8;
        t[i] = sz53_of(v) | if parity(v) { PF } else { 0 };
        i += 1;
    }
    t
}

// Indexed by the result of the increment.
const fn build_inc() -> [u8; 256] {
    let mut t = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let v = i as u8;
        let mut f = sz53_of(v);
        if v & 0x0F == 0 {
            f |= HF;
        }
        if v == 0x80 {
            f |= PF;
        }
        t[i] = f;
        i += 1;
    }
    t
}

// Indexed by the result of the decrement.
const fn build_dec() -> [u8; 256] {
    let mut t = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let v = i as u8;
        let mut f = sz53_of(v) | NF;
        if v & 0x0F == 0x0F {
            f |= HF;
        }
        if v == 0x7F {
            f |= PF;
        }
        t[i] = f;
        i += 1;
    }
    t
}

// Index: A | C << 8 | H << 9 | N << 10. Entry: corrected A << 8 | F.
const fn build_daa() -> [u16; 2048] {
    let mut t = [0u16; 2048];
    let mut i = 0;
    while i < 2048 {
        let a = (i & 0xFF) as u8;
        let carry = i & 0x100 != 0;
        let half = i & 0x200 != 0;
        let sub = i & 0x400 != 0;

        let mut diff = 0u8;
        let mut c = carry;
        if half || (a & 0x0F) > 9 {
            diff |= 0x06;
        }
        if carry || a > 0x99 {
            diff |= 0x60;
            c = true;
        }
        let result = if sub {
            a.wrapping_sub(diff)
        } else {
            a.wrapping_add(diff)
        };
        let h = if sub {
            half && (a & 0x0F) < 6
        } else {
            (a & 0x0F) > 9
        };

        let mut f = sz53_of(result);
        if parity(result) {
            f |= PF;
        }
        if c {
            f |= CF;
        }
        if h {
            f |= HF;
        }
        if sub {
            f |= NF;
        }
        t[i] = ((result as u16) << 8) | f as u16;
        i += 1;
    }
    t
}

/// S, Z, Y and X for every byte value.
pub static SZ53: [u8; 256] = build_sz53();

/// S, Z, Y, X and parity for every byte value.
pub static SZ53P: [u8; 256] = build_sz53p();

/// Flags after `INC`, indexed by the result (carry is preserved separately).
pub static INC_FLAGS: [u8; 256] = build_inc();

/// Flags after `DEC`, indexed by the result (carry is preserved separately).
pub static DEC_FLAGS: [u8; 256] = build_dec();

/// BCD correction table for `DAA`.
pub static DAA: [u16; 2048] = build_daa();
