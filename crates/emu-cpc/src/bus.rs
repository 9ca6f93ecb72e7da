//! CPC bus: memory and I/O routing.
//!
//! Peripherals are selected by clearing address lines in the port number,
//! so one `OUT` can reach several devices at once. Writes are therefore
//! offered to every decoder that matches; reads return the first match.
//!
//! | Device     | Selected when                 | Register select   |
//! |------------|-------------------------------|-------------------|
//! | Gate array | A15 = 0, A14 = 1              | data bits 7-6     |
//! | CRTC       | A14 = 0                       | A9-A8             |
//! | Upper ROM  | A13 = 0                       |                   |
//! | PPI        | A11 = 0                       | A9-A8             |
//! | FDC        | A10 = 0, A7 = 0               | A8 and A0         |
//!
//! The PSG hangs off the PPI: port A carries its data bus and port C bits
//! 7-6 its BDIR/BC1 control lines.

#![allow(clippy::cast_possible_truncation)]

use emu_core::Bus;
use gi_ay_3_8910::{Ay3_8910, CPC_CLOCK};
use intel_8255::Ppi8255;
use motorola_6845::Crtc;
use nec_upd765::Upd765;
use zilog_z80::{Registers, Z80Bus};

use crate::dandanator::Dandanator;
use crate::gate_array::GateArray;
use crate::keyboard::KeyboardState;
use crate::memory::{Memory, MemorySelect};

/// Host audio sample rate.
pub const SAMPLE_RATE: u32 = 48_000;

/// PSG register that reads the keyboard through its I/O port.
const PSG_KEYBOARD: u8 = 14;

/// PPI port B bits 1-7: Amstrad, 50 Hz, no expansion, printer ready,
/// no tape. Bit 0 is VSYNC.
const PORT_B_IDLE: u8 = 0xFE;

/// Everything the Z80 can reach.
pub struct CpcBus {
    pub memory: Memory,
    pub ga: GateArray,
    pub crtc: Crtc,
    pub ppi: Ppi8255,
    pub ay: Ay3_8910,
    pub fdc: Upd765,
    pub keyboard: KeyboardState,
    /// Upper ROM number last written to &DFxx.
    pub urom: u8,
    /// 0 or 8, from the port address of the last MMR write.
    pub bank_512k: u8,
    /// ROMs come from a CPR cartridge.
    pub cart_mode: bool,
    pub dandanator: Option<Dandanator>,
}

impl CpcBus {
    #[must_use]
    pub fn new(memory: Memory) -> Self {
        let mut bus = Self {
            memory,
            ga: GateArray::new(),
            crtc: Crtc::new(),
            ppi: Ppi8255::new(),
            ay: Ay3_8910::new(CPC_CLOCK, SAMPLE_RATE),
            fdc: Upd765::new(),
            keyboard: KeyboardState::new(),
            urom: 0,
            bank_512k: 0,
            cart_mode: false,
            dandanator: None,
        };
        bus.reconfigure();
        bus
    }

    /// Power-on state for everything except RAM contents, media and the
    /// CRTC configuration.
    pub fn reset(&mut self) {
        self.ga.reset();
        self.crtc.reset();
        self.ppi.reset();
        self.ay.reset();
        self.fdc.reset();
        self.keyboard.release_all();
        self.urom = 0;
        self.bank_512k = 0;
        if let Some(dan) = &mut self.dandanator {
            *dan = Dandanator::new();
        }
        self.reconfigure();
    }

    /// Current banking inputs.
    #[must_use]
    pub fn memory_select(&self) -> MemorySelect {
        MemorySelect {
            mmr: self.ga.mmr(),
            rmr: self.ga.rmr(),
            urom: self.urom,
            bank_512k: self.bank_512k,
            cart_mode: self.cart_mode,
        }
    }

    /// Rebuild the memory map after any banking register changed.
    pub fn reconfigure(&mut self) {
        let select = self.memory_select();
        self.memory.configure(&select, self.dandanator.as_ref());
    }

    /// Run the PSG bus cycle selected by port C bits 7-6.
    fn psg_control(&mut self) {
        let data = self.ppi.port_a();
        match self.ppi.port_c() & 0xC0 {
            0xC0 => {
                if data < 16 {
                    self.ay.select_register(data);
                }
            }
            0x80 => self.ay.write_data(data),
            _ => {}
        }
    }

    fn gate_array_write(&mut self, port: u16, value: u8) {
        match value >> 6 {
            0 => self.ga.select_pen(value),
            1 => self.ga.set_ink(value),
            2 => {
                if self.ga.set_rmr(value) {
                    self.crtc.reset_r52();
                }
                self.reconfigure();
            }
            _ => {
                self.ga.set_mmr(value);
                if self.memory.extra_blocks() > 8 {
                    self.bank_512k = if port & 0x0100 != 0 { 0 } else { 8 };
                }
                self.reconfigure();
            }
        }
    }
}

impl Bus for CpcBus {
    fn read(&mut self, address: u16) -> u8 {
        self.memory.read(address)
    }

    fn write(&mut self, address: u16, value: u8) {
        self.memory.write(address, value);
    }

    fn io_read(&mut self, port: u16) -> u8 {
        if port & 0x0480 == 0 {
            return if port & 1 != 0 {
                self.fdc.read_data()
            } else {
                self.fdc.read_status()
            };
        }

        if port & 0x4200 == 0x0200 {
            return self.crtc.read();
        }

        if port & 0x0800 == 0 {
            return match (port >> 8) & 3 {
                0 => {
                    let external = if self.ay.selected_register() == PSG_KEYBOARD {
                        self.keyboard.read(self.ppi.port_c() & 0x0F)
                    } else {
                        self.ay.read_data()
                    };
                    self.ppi.read(0, external)
                }
                1 => self.ppi.read(1, PORT_B_IDLE | u8::from(self.crtc.vsync())),
                2 => self.ppi.read(2, self.ppi.port_c()),
                _ => 0xFF,
            };
        }

        0xFF
    }

    fn io_write(&mut self, port: u16, value: u8) {
        if port & 0xC000 == 0x4000 {
            self.gate_array_write(port, value);
        }

        if port & 0x4000 == 0 {
            match (port >> 8) & 3 {
                0 => self.crtc.select(value),
                1 => self.crtc.write(value),
                _ => {}
            }
        }

        if port & 0x2000 == 0 {
            self.urom = value;
            self.reconfigure();
        }

        if port & 0x0800 == 0 {
            let reg = ((port >> 8) & 3) as u8;
            self.ppi.write(reg, value);
            if reg == 0 || reg == 2 {
                self.psg_control();
            }
        }

        if port & 0x0480 == 0 {
            match port & 0x0101 {
                0x0101 => self.fdc.write_data(value),
                0x0000 => self.fdc.set_motor(value & 1 != 0),
                _ => {}
            }
        }
    }
}

impl Z80Bus for CpcBus {
    fn interrupt_acknowledged(&mut self) {
        self.crtc.acknowledge_interrupt();
    }

    fn fd_prefix_repeat(&mut self, next: u8, regs: &Registers) {
        let changed = self
            .dandanator
            .as_mut()
            .is_some_and(|dan| dan.command(next, regs.a, regs.b, regs.c));
        if changed {
            self.reconfigure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ROM_SIZE, RamSize};

    fn make_bus() -> CpcBus {
        let memory = Memory::new(
            vec![0x0A; ROM_SIZE],
            vec![0x0B; ROM_SIZE],
            vec![0x07; ROM_SIZE],
            RamSize::Kb128,
        );
        CpcBus::new(memory)
    }

    /// Firmware PPI setup: A output, B input, C output.
    fn firmware_ppi(bus: &mut CpcBus) {
        bus.io_write(0xF782, 0x82);
    }

    fn psg_write(bus: &mut CpcBus, reg: u8, value: u8) {
        bus.io_write(0xF400, reg);
        bus.io_write(0xF600, 0xC0);
        bus.io_write(0xF600, 0x00);
        bus.io_write(0xF400, value);
        bus.io_write(0xF600, 0x80);
        bus.io_write(0xF600, 0x00);
    }

    #[test]
    fn gate_array_rmr_switches_roms() {
        let mut bus = make_bus();
        assert_eq!(bus.read(0x0000), 0x0A);
        bus.io_write(0x7F00, 0x8C); // mode 0, both ROMs off
        assert_eq!(bus.read(0x0000), 0x00);
        assert_eq!(bus.read(0xC000), 0x00);
    }

    #[test]
    fn rmr_bit4_clears_raster_counter() {
        let mut bus = make_bus();
        for _ in 0..10 {
            bus.crtc.step_scanline();
        }
        assert_ne!(bus.crtc.r52(), 0);
        bus.io_write(0x7F00, 0x9C);
        assert_eq!(bus.crtc.r52(), 0);
    }

    #[test]
    fn upper_rom_select_port() {
        let mut bus = make_bus();
        bus.io_write(0xDF00, 7);
        assert_eq!(bus.read(0xC000), 0x07);
        bus.io_write(0xDF00, 0);
        assert_eq!(bus.read(0xC000), 0x0B);
    }

    #[test]
    fn crtc_select_and_write() {
        let mut bus = make_bus();
        bus.io_write(0xBC00, 12);
        bus.io_write(0xBD00, 0x30);
        assert_eq!(bus.crtc.register(12), 0x30);
        // Type 3 read-back: index 4 maps to R12
        bus.io_write(0xBC00, 4);
        assert_eq!(bus.io_read(0xBF00), 0x30);
    }

    #[test]
    fn psg_register_via_ppi() {
        let mut bus = make_bus();
        firmware_ppi(&mut bus);
        psg_write(&mut bus, 7, 0x3F);
        assert_eq!(bus.ay.registers()[7], 0x3F);
    }

    #[test]
    fn keyboard_row_through_psg_port() {
        let mut bus = make_bus();
        firmware_ppi(&mut bus);
        bus.keyboard.set_key(8, 5, true);

        // Select PSG register 14, then row 8 on port C
        bus.io_write(0xF400, 14);
        bus.io_write(0xF600, 0xC0);
        bus.io_write(0xF600, 0x00);
        bus.io_write(0xF792, 0x92); // port A input
        bus.io_write(0xF600, 0x48);
        assert_eq!(bus.io_read(0xF400), 0xDF);

        bus.io_write(0xF600, 0x47);
        assert_eq!(bus.io_read(0xF400), 0xFF);
    }

    #[test]
    fn port_b_reports_vsync() {
        let mut bus = make_bus();
        firmware_ppi(&mut bus);
        let mut seen = false;
        for _ in 0..320 {
            bus.crtc.step_scanline();
            let b = bus.io_read(0xF500);
            assert_eq!(b & 0xFE, PORT_B_IDLE);
            seen |= b & 1 != 0;
        }
        assert!(seen, "no VSYNC in a whole frame");
    }

    #[test]
    fn fdc_ports() {
        let mut bus = make_bus();
        bus.io_write(0xFA7E, 0x01);
        assert!(bus.fdc.motor());
        bus.io_write(0xFA7E, 0x00);
        assert!(!bus.fdc.motor());
        assert_eq!(bus.io_read(0xFB7E) & 0x80, 0x80);
    }

    #[test]
    fn unmapped_read_is_ff() {
        let mut bus = make_bus();
        assert_eq!(bus.io_read(0xFFFF), 0xFF);
    }

    #[test]
    fn second_512k_half_needs_big_expansion() {
        let memory = Memory::new(
            vec![0; ROM_SIZE],
            vec![0; ROM_SIZE],
            Vec::new(),
            RamSize::Kb1088,
        );
        let mut bus = CpcBus::new(memory);
        bus.io_write(0x7E00, 0xC4); // bit 8 clear: upper half
        assert_eq!(bus.bank_512k, 8);
        assert_eq!(bus.memory.map().write[1].base, 0x10000 + 8 * 0x10000);

        let mut small = make_bus();
        small.io_write(0x7E00, 0xC4);
        assert_eq!(small.bank_512k, 0);
    }

    #[test]
    fn dandanator_command_remaps() {
        let mut bus = make_bus();
        bus.memory.set_flash(vec![0x5A; 4 * ROM_SIZE]);
        bus.dandanator = Some(Dandanator::new());
        bus.reconfigure();
        assert_eq!(bus.read(0x0000), 0x5A);

        let regs = Registers {
            a: 0xA0, // mapped out
            ..Registers::default()
        };
        bus.fd_prefix_repeat(0x77, &regs);
        assert_eq!(bus.read(0x0000), 0x0A);
    }
}
