//! Dandanator Mini cartridge.
//!
//! A flash cartridge of 32 16K slots that snoops the CPU bus. Programs talk
//! to it with `FD FD` followed by an `LD (IY+d),r` opcode: the CPLD latches
//! the source register instead of the memory write.
//!
//! | Sequence   | Register | Latched from                        |
//! |------------|----------|-------------------------------------|
//! | FD FD 70   | Zone 0   | B                                   |
//! | FD FD 71   | Zone 1   | C                                   |
//! | FD FD 77   | Config   | A, only when bit 7 is set           |
//!
//! Zone registers: bits 0-4 slot, bit 5 set = zone disabled.
//!
//! Config: bit 5 maps the cartridge out, bit 4 enables FollowRomEn while
//! mapped out, bits 3-2 move zone 1/zone 0 to the upper half of the address
//! space, bits 1-0 are the chip enables (active low) for zone 1/zone 0 in
//! their lower positions.

use serde::{Deserialize, Serialize};

use crate::memory::{Source, Window};

/// Opcode after `FD FD` that loads zone 0.
pub const CMD_ZONE0: u8 = 0x70;
/// Opcode after `FD FD` that loads zone 1.
pub const CMD_ZONE1: u8 = 0x71;
/// Opcode after `FD FD` that loads the configuration register.
pub const CMD_CONFIG: u8 = 0x77;

/// Flash capacity: 32 slots of 16K.
pub const FLASH_LIMIT: usize = 32 * 0x4000;

const ZONE_DISABLED: u8 = 0x20;
const CFG_MAPPED_OUT: u8 = 0x20;
const CFG_FOLLOW_ROM: u8 = 0x10;
const CFG_ZONE1_HIGH: u8 = 0x08;
const CFG_ZONE0_HIGH: u8 = 0x04;
const CFG_ZONE1_CE: u8 = 0x02;
const CFG_ZONE0_CE: u8 = 0x01;

/// Dandanator paging registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dandanator {
    pub zone0: u8,
    pub zone1: u8,
    pub config: u8,
    /// Slot shown in the lower ROM window in FollowRomEn mode.
    pub follow: u8,
}

impl Default for Dandanator {
    fn default() -> Self {
        Self {
            zone0: 0x00,
            zone1: ZONE_DISABLED,
            config: 0x00,
            follow: 28,
        }
    }
}

impl Dandanator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle an `FD FD <next>` sequence. Returns true if a register
    /// changed and memory needs reconfiguring.
    pub fn command(&mut self, next: u8, a: u8, b: u8, c: u8) -> bool {
        let before = *self;
        match next {
            CMD_ZONE0 => self.zone0 = b,
            CMD_ZONE1 => self.zone1 = c,
            CMD_CONFIG if a & 0x80 != 0 => self.config = a,
            _ => return false,
        }
        log::trace!(
            "Dandanator: zone0={:02X} zone1={:02X} config={:02X}",
            self.zone0,
            self.zone1,
            self.config
        );
        *self != before
    }

    /// Lay the cartridge over the read windows. `rmr` supplies the ROM
    /// disable bits for FollowRomEn.
    pub fn overlay(&self, read: &mut [Window; 4], rmr: u8) {
        let slot = |zone: u8| Window {
            source: Source::Flash,
            base: usize::from(zone & 0x1F) * 0x4000,
        };

        if self.config & CFG_MAPPED_OUT == 0 {
            if self.zone0 & ZONE_DISABLED == 0 {
                if self.config & CFG_ZONE0_HIGH != 0 {
                    read[2] = slot(self.zone0);
                } else if self.config & CFG_ZONE0_CE == 0 {
                    read[0] = slot(self.zone0);
                }
            }
            if self.zone1 & ZONE_DISABLED == 0 {
                if self.config & CFG_ZONE1_HIGH != 0 {
                    read[3] = slot(self.zone1);
                } else if self.config & CFG_ZONE1_CE == 0 {
                    read[1] = slot(self.zone1);
                }
            }
        } else if self.config & CFG_FOLLOW_ROM != 0 {
            if rmr & 0x04 == 0 {
                read[0] = slot(self.follow);
            }
            if rmr & 0x08 == 0 {
                read[3] = slot(self.zone1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ram_windows() -> [Window; 4] {
        [0, 1, 2, 3].map(|n| Window {
            source: Source::Ram,
            base: n * 0x4000,
        })
    }

    #[test]
    fn power_on_maps_slot0_low() {
        let dan = Dandanator::new();
        let mut read = ram_windows();
        dan.overlay(&mut read, 0);
        assert_eq!(read[0].source, Source::Flash);
        assert_eq!(read[0].base, 0);
        // Zone 1 starts disabled
        assert_eq!(read[1].source, Source::Ram);
        assert_eq!(read[3].source, Source::Ram);
    }

    #[test]
    fn commands_latch_registers() {
        let mut dan = Dandanator::new();
        assert!(dan.command(CMD_ZONE1, 0, 0, 0x05));
        assert_eq!(dan.zone1, 0x05);
        assert!(dan.command(CMD_ZONE0, 0, 0x03, 0));
        assert_eq!(dan.zone0, 0x03);
        // Config needs bit 7
        assert!(!dan.command(CMD_CONFIG, 0x0C, 0, 0));
        assert!(dan.command(CMD_CONFIG, 0x8C, 0, 0));
        assert_eq!(dan.config, 0x8C);
        // Unrelated opcode
        assert!(!dan.command(0x36, 0xFF, 0xFF, 0xFF));
        // Same value again is not a change
        assert!(!dan.command(CMD_ZONE0, 0, 0x03, 0));
    }

    #[test]
    fn high_zones_move_up() {
        let dan = Dandanator {
            zone0: 0x02,
            zone1: 0x07,
            config: 0x8C,
            follow: 28,
        };
        let mut read = ram_windows();
        dan.overlay(&mut read, 0);
        assert_eq!(read[0].source, Source::Ram);
        assert_eq!(read[1].source, Source::Ram);
        assert_eq!((read[2].source, read[2].base), (Source::Flash, 0x8000));
        assert_eq!((read[3].source, read[3].base), (Source::Flash, 0x1C000));
    }

    #[test]
    fn chip_enable_blocks_low_zones() {
        let dan = Dandanator {
            zone0: 0x01,
            zone1: 0x02,
            config: 0x83,
            follow: 28,
        };
        let mut read = ram_windows();
        dan.overlay(&mut read, 0);
        assert_eq!(read, ram_windows());
    }

    #[test]
    fn follow_rom_when_mapped_out() {
        let dan = Dandanator {
            zone0: 0x00,
            zone1: 0x1E,
            config: 0xB0,
            follow: 28,
        };
        let mut read = ram_windows();
        dan.overlay(&mut read, 0x08);
        assert_eq!((read[0].source, read[0].base), (Source::Flash, 28 * 0x4000));
        // Upper ROM disabled by RMR bit 3
        assert_eq!(read[3].source, Source::Ram);
    }
}
