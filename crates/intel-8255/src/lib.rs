//! Intel 8255 Programmable Peripheral Interface.
//!
//! Three 8-bit ports and a control register. Only mode 0 (basic I/O) is
//! modelled, which is all the CPC uses: port A talks to the PSG data bus,
//! port B reads machine status lines, port C drives the keyboard row, the
//! cassette motor and the PSG bus control.
//!
//! # Registers
//!
//! | Reg | Name    | Description                                   |
//! |-----|---------|-----------------------------------------------|
//! | 0   | PA      | Port A                                        |
//! | 1   | PB      | Port B                                        |
//! | 2   | PC      | Port C                                        |
//! | 3   | Control | Mode word (bit 7 set) or port C bit set/reset |
//!
//! Mode word bits (bit 7 set): 4 = port A input, 3 = port C upper input,
//! 1 = port B input, 0 = port C lower input.

use emu_core::{Observable, Value};

/// Control word after a hardware reset: every port an input.
pub const RESET_CONTROL: u8 = 0x9B;

const CTRL_MODE_SET: u8 = 0x80;
const CTRL_A_INPUT: u8 = 0x10;
const CTRL_C_UPPER_INPUT: u8 = 0x08;
const CTRL_B_INPUT: u8 = 0x02;
const CTRL_C_LOWER_INPUT: u8 = 0x01;

/// Intel 8255 PPI.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ppi8255 {
    /// Output latches.
    port_a: u8,
    port_b: u8,
    port_c: u8,
    control: u8,
}

impl Default for Ppi8255 {
    fn default() -> Self {
        Self::new()
    }
}

impl Ppi8255 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            port_a: 0,
            port_b: 0,
            port_c: 0,
            control: RESET_CONTROL,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Write register `reg` (0-3).
    pub fn write(&mut self, reg: u8, value: u8) {
        match reg & 3 {
            0 => self.port_a = value,
            1 => self.port_b = value,
            2 => self.port_c = value,
            _ => self.write_control(value),
        }
    }

    fn write_control(&mut self, value: u8) {
        if value & CTRL_MODE_SET == 0 {
            // Bit set/reset on port C
            let bit = (value >> 1) & 7;
            if value & 1 != 0 {
                self.port_c |= 1 << bit;
            } else {
                self.port_c &= !(1 << bit);
            }
            return;
        }
        // Changing port A's direction clears the port C latch
        if (self.control ^ value) & CTRL_A_INPUT != 0 {
            self.port_c = 0;
        }
        if value & 0x64 != 0 {
            log::debug!("PPI: mode word {value:#04X} selects mode 1/2, treated as mode 0");
        }
        self.control = value;
    }

    /// Read register `reg`. Input ports return `external`, the level on the
    /// pins; output ports return their latch. Port C is split in nibbles.
    #[must_use]
    pub fn read(&self, reg: u8, external: u8) -> u8 {
        match reg & 3 {
            0 => {
                if self.port_a_is_input() {
                    external
                } else {
                    self.port_a
                }
            }
            1 => {
                if self.control & CTRL_B_INPUT != 0 {
                    external
                } else {
                    self.port_b
                }
            }
            2 => {
                let upper = if self.control & CTRL_C_UPPER_INPUT != 0 {
                    external & 0xF0
                } else {
                    self.port_c & 0xF0
                };
                let lower = if self.control & CTRL_C_LOWER_INPUT != 0 {
                    external & 0x0F
                } else {
                    self.port_c & 0x0F
                };
                upper | lower
            }
            _ => 0xFF,
        }
    }

    #[must_use]
    pub fn port_a_is_input(&self) -> bool {
        self.control & CTRL_A_INPUT != 0
    }

    /// Port A output latch.
    #[must_use]
    pub fn port_a(&self) -> u8 {
        self.port_a
    }

    /// Port B output latch.
    #[must_use]
    pub fn port_b(&self) -> u8 {
        self.port_b
    }

    /// Port C output latch.
    #[must_use]
    pub fn port_c(&self) -> u8 {
        self.port_c
    }

    #[must_use]
    pub fn control(&self) -> u8 {
        self.control
    }

    /// Load all latches directly (snapshot restore). The control word is
    /// set without side effects.
    pub fn load(&mut self, port_a: u8, port_b: u8, port_c: u8, control: u8) {
        self.port_a = port_a;
        self.port_b = port_b;
        self.port_c = port_c;
        self.control = control | CTRL_MODE_SET;
    }
}

/// All query paths supported by the PPI.
const PPI_QUERY_PATHS: &[&str] = &["a", "b", "c", "control"];

impl Observable for Ppi8255 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "a" => Some(self.port_a.into()),
            "b" => Some(self.port_b.into()),
            "c" => Some(self.port_c.into()),
            "control" => Some(self.control.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        PPI_QUERY_PATHS
    }
}
