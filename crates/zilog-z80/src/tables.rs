//! CPC instruction costs in T-states.
//!
//! The gate array stretches every memory access so each instruction takes
//! a whole number of microseconds (4 T-states, one "NOP"). Conditional
//! entries assume the branch is taken for relative jumps and DJNZ, and not
//! taken for CALL/RET; the executor applies the difference. Block
//! instructions assume another iteration follows.

/// Unprefixed opcodes. Prefix bytes (CB, DD, ED, FD) cost nothing here;
/// their page table carries the full cost.
#[rustfmt::skip]
pub static CYCLES: [u8; 256] = [
//  00  01  02  03  04  05  06  07   08  09  0A  0B  0C  0D  0E  0F
     4, 12,  8,  8,  4,  4,  8,  4,   4, 12,  8,  8,  4,  4,  8,  4, // 0x00
    16, 12,  8,  8,  4,  4,  8,  4,  12, 12,  8,  8,  4,  4,  8,  4, // 0x10
    12, 12, 20,  8,  4,  4,  8,  4,  12, 12, 20,  8,  4,  4,  8,  4, // 0x20
    12, 12, 16,  8, 12, 12, 12,  4,  12, 12, 16,  8,  4,  4,  8,  4, // 0x30
     4,  4,  4,  4,  4,  4,  8,  4,   4,  4,  4,  4,  4,  4,  8,  4, // 0x40
     4,  4,  4,  4,  4,  4,  8,  4,   4,  4,  4,  4,  4,  4,  8,  4, // 0x50
     4,  4,  4,  4,  4,  4,  8,  4,   4,  4,  4,  4,  4,  4,  8,  4, // 0x60
     8,  8,  8,  8,  8,  8,  4,  8,   4,  4,  4,  4,  4,  4,  8,  4, // 0x70
     4,  4,  4,  4,  4,  4,  8,  4,   4,  4,  4,  4,  4,  4,  8,  4, // 0x80
     4,  4,  4,  4,  4,  4,  8,  4,   4,  4,  4,  4,  4,  4,  8,  4, // 0x90
     4,  4,  4,  4,  4,  4,  8,  4,   4,  4,  4,  4,  4,  4,  8,  4, // 0xA0
     4,  4,  4,  4,  4,  4,  8,  4,   4,  4,  4,  4,  4,  4,  8,  4, // 0xB0
     8, 12, 12, 12, 12, 12,  8, 16,   8, 12, 12,  0, 12, 20,  8, 16, // 0xC0
     8, 12, 12, 12, 12, 12,  8, 16,   8,  4, 12, 12, 12,  0,  8, 16, // 0xD0
     8, 12, 12, 24, 12, 12,  8, 16,   8,  4, 12,  4, 12,  0,  8, 16, // 0xE0
     8, 12, 12,  4, 12, 12,  8, 16,   8,  8, 12,  4, 12,  0,  8, 16, // 0xF0
];

/// CB page, including the prefix fetch.
#[rustfmt::skip]
pub static CYCLES_CB: [u8; 256] = {
    let mut t = [8u8; 256];
    let mut i = 0;
    while i < 256 {
        if i & 7 == 6 {
            // BIT n,(HL) only reads
            t[i] = if i >= 0x40 && i < 0x80 { 12 } else { 16 };
        }
        i += 1;
    }
    t
};

/// ED page, including the prefix fetch. Undocumented mirrors cost the same
/// as the opcode they mirror; undefined opcodes execute as an 8 T-state NOP.
#[rustfmt::skip]
pub static CYCLES_ED: [u8; 256] = [
//  00  01  02  03  04  05  06  07   08  09  0A  0B  0C  0D  0E  0F
     8,  8,  8,  8,  8,  8,  8,  8,   8,  8,  8,  8,  8,  8,  8,  8, // 0x00
     8,  8,  8,  8,  8,  8,  8,  8,   8,  8,  8,  8,  8,  8,  8,  8, // 0x10
     8,  8,  8,  8,  8,  8,  8,  8,   8,  8,  8,  8,  8,  8,  8,  8, // 0x20
     8,  8,  8,  8,  8,  8,  8,  8,   8,  8,  8,  8,  8,  8,  8,  8, // 0x30
    16, 16, 20, 24,  8, 16,  8, 12,  16, 16, 16, 24,  8, 16,  8, 12, // 0x40
    16, 16, 20, 24,  8, 16,  8, 12,  16, 16, 16, 24,  8, 16,  8, 12, // 0x50
    16, 16, 20, 24,  8, 16,  8, 20,  16, 16, 16, 24,  8, 16,  8, 20, // 0x60
    16, 16, 20, 24,  8, 16,  8,  8,  16, 16, 16, 24,  8, 16,  8,  8, // 0x70
     8,  8,  8,  8,  8,  8,  8,  8,   8,  8,  8,  8,  8,  8,  8,  8, // 0x80
     8,  8,  8,  8,  8,  8,  8,  8,   8,  8,  8,  8,  8,  8,  8,  8, // 0x90
    20, 20, 20, 20,  8,  8,  8,  8,  20, 20, 20, 20,  8,  8,  8,  8, // 0xA0
    24, 24, 24, 24,  8,  8,  8,  8,  24, 24, 24, 24,  8,  8,  8,  8, // 0xB0
     8,  8,  8,  8,  8,  8,  8,  8,   8,  8,  8,  8,  8,  8,  8,  8, // 0xC0
     8,  8,  8,  8,  8,  8,  8,  8,   8,  8,  8,  8,  8,  8,  8,  8, // 0xD0
     8,  8,  8,  8,  8,  8,  8,  8,   8,  8,  8,  8,  8,  8,  8,  8, // 0xE0
     8,  8,  8,  8,  8,  8,  8,  8,   8,  8,  8,  8,  8,  8,  8,  8, // 0xF0
];

/// DD/FD page, including the prefix fetch. Zero marks opcodes the index
/// prefix does not affect: they cost one NOP plus their unprefixed cost.
#[rustfmt::skip]
pub static CYCLES_XX: [u8; 256] = [
//  00  01  02  03  04  05  06  07   08  09  0A  0B  0C  0D  0E  0F
     0,  0,  0,  0,  8,  8, 12,  0,   0, 16,  0,  0,  8,  8, 12,  0, // 0x00
     0,  0,  0,  0,  8,  8, 12,  0,   0, 16,  0,  0,  8,  8, 12,  0, // 0x10
     0, 16, 24, 12,  8,  8, 12,  0,   0, 16, 24, 12,  8,  8, 12,  0, // 0x20
     0,  0,  0,  0, 24, 24, 24,  0,   0, 16,  0,  0,  8,  8, 12,  0, // 0x30
     8,  8,  8,  8,  8,  8, 20,  8,   8,  8,  8,  8,  8,  8, 20,  8, // 0x40
     8,  8,  8,  8,  8,  8, 20,  8,   8,  8,  8,  8,  8,  8, 20,  8, // 0x50
     8,  8,  8,  8,  8,  8, 20,  8,   8,  8,  8,  8,  8,  8, 20,  8, // 0x60
    20, 20, 20, 20, 20, 20,  8, 20,   8,  8,  8,  8,  8,  8, 20,  8, // 0x70
     8,  8,  8,  8,  8,  8, 20,  8,   8,  8,  8,  8,  8,  8, 20,  8, // 0x80
     8,  8,  8,  8,  8,  8, 20,  8,   8,  8,  8,  8,  8,  8, 20,  8, // 0x90
     8,  8,  8,  8,  8,  8, 20,  8,   8,  8,  8,  8,  8,  8, 20,  8, // 0xA0
     8,  8,  8,  8,  8,  8, 20,  8,   8,  8,  8,  8,  8,  8, 20,  8, // 0xB0
     0,  0,  0,  0,  0,  0,  0,  0,   0,  0,  0,  0,  0,  0,  0,  0, // 0xC0
     0,  0,  0,  0,  0,  0,  0,  0,   0,  0,  0,  0,  0,  4,  0,  0, // 0xD0
     0, 20,  0, 28,  0, 20,  0,  0,   0,  8,  0,  0,  0,  0,  0,  0, // 0xE0
     0,  0,  0,  0,  0,  0,  0,  0,   0, 12,  0,  0,  0,  4,  0,  0, // 0xF0
];

/// DD CB / FD CB page, including both prefixes and the displacement.
/// BIT only reads; everything else is a read-modify-write of (IX+d), and the
/// undocumented register forms cost the same as the memory form.
#[rustfmt::skip]
pub static CYCLES_XXCB: [u8; 256] = {
    let mut t = [28u8; 256];
    let mut i = 0x40;
    while i < 0x80 {
        t[i] = 24;
        i += 1;
    }
    t
};
