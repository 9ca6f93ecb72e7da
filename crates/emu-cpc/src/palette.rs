//! CPC hardware colours.
//!
//! The gate array takes a 5-bit hardware colour number. There are 27 real
//! colours (three levels per RGB gun); the remaining five numbers alias
//! existing colours.

/// ARGB32 for each hardware colour number ($00-$1F).
pub const HARDWARE_PALETTE: [u32; 32] = [
    0xFF80_8080, // $00 White
    0xFF80_8080, // $01 White (alias)
    0xFF00_FF80, // $02 Sea Green
    0xFFFF_FF80, // $03 Pastel Yellow
    0xFF00_0080, // $04 Blue
    0xFFFF_0080, // $05 Purple
    0xFF00_8080, // $06 Cyan
    0xFFFF_8080, // $07 Pink
    0xFFFF_0080, // $08 Purple (alias)
    0xFFFF_FF80, // $09 Pastel Yellow (alias)
    0xFFFF_FF00, // $0A Bright Yellow
    0xFFFF_FFFF, // $0B Bright White
    0xFFFF_0000, // $0C Bright Red
    0xFFFF_00FF, // $0D Bright Magenta
    0xFFFF_8000, // $0E Orange
    0xFFFF_80FF, // $0F Pastel Magenta
    0xFF00_0080, // $10 Blue (alias)
    0xFF00_FF80, // $11 Sea Green (alias)
    0xFF00_FF00, // $12 Bright Green
    0xFF00_FFFF, // $13 Bright Cyan
    0xFF00_0000, // $14 Black
    0xFF00_00FF, // $15 Bright Blue
    0xFF00_8000, // $16 Green
    0xFF00_80FF, // $17 Sky Blue
    0xFF80_0080, // $18 Magenta
    0xFF80_FF80, // $19 Pastel Green
    0xFF80_FF00, // $1A Lime
    0xFF80_FFFF, // $1B Pastel Cyan
    0xFF80_0000, // $1C Red
    0xFF80_00FF, // $1D Mauve
    0xFF80_8000, // $1E Yellow
    0xFF80_80FF, // $1F Pastel Blue
];

/// Hardware colour numbers for firmware inks 0-26.
pub const FIRMWARE_TO_HARDWARE: [u8; 27] = [
    0x14, 0x04, 0x15, 0x1C, 0x18, 0x1D, 0x0C, 0x05, 0x0D, 0x16, 0x06, 0x17, 0x1E, 0x00, 0x1F,
    0x0E, 0x07, 0x0F, 0x12, 0x02, 0x13, 0x1A, 0x19, 0x1B, 0x0A, 0x03, 0x0B,
];

/// ARGB32 for a hardware colour number. Bits 5-7 are ignored.
#[must_use]
pub fn argb(hardware: u8) -> u32 {
    HARDWARE_PALETTE[usize::from(hardware & 0x1F)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firmware_inks_are_distinct() {
        let mut seen: Vec<u32> = FIRMWARE_TO_HARDWARE.iter().map(|&hw| argb(hw)).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 27);
    }

    #[test]
    fn known_colours() {
        assert_eq!(argb(0x14), 0xFF00_0000);
        assert_eq!(argb(0x4B), 0xFFFF_FFFF); // INKR command bits masked
        assert_eq!(argb(FIRMWARE_TO_HARDWARE[1]), 0xFF00_0080);
        assert_eq!(argb(FIRMWARE_TO_HARDWARE[24]), 0xFFFF_FF00);
    }
}
