//! SNA snapshot loading and saving.

use format_sna::{SEGMENT_LEN, SnaRegisters, Snapshot};

use crate::cpc::Cpc;
use crate::error::CpcError;

/// Machine type byte for a 6128.
const MACHINE_6128: u8 = 2;

impl Cpc {
    /// Replace the machine state with an SNA snapshot. The file is fully
    /// parsed and checked against the RAM size before anything changes.
    pub fn load_sna(&mut self, data: &[u8]) -> Result<(), CpcError> {
        let sna = Snapshot::parse(data)?;
        let available = self.bus().memory.ram().len();
        if sna.ram.len() > available {
            return Err(CpcError::SnapshotTooLarge {
                needed: sna.ram.len(),
                available,
            });
        }

        self.reset();

        let regs = self.cpu_mut().registers_mut();
        regs.set_af(sna.regs.af);
        regs.set_bc(sna.regs.bc);
        regs.set_de(sna.regs.de);
        regs.set_hl(sna.regs.hl);
        regs.set_af_alt(sna.regs.af_alt);
        regs.set_bc_alt(sna.regs.bc_alt);
        regs.set_de_alt(sna.regs.de_alt);
        regs.set_hl_alt(sna.regs.hl_alt);
        regs.ix = sna.regs.ix;
        regs.iy = sna.regs.iy;
        regs.sp = sna.regs.sp;
        regs.pc = sna.regs.pc;
        regs.i = sna.regs.i;
        regs.set_r_value(sna.regs.r);
        regs.iff1 = sna.regs.iff1;
        regs.iff2 = sna.regs.iff2;
        regs.im = sna.regs.im.min(2);
        regs.halted = false;

        let bus = self.bus_mut();
        bus.ga.load(sna.pen, &sna.inks, sna.rmr, sna.mmr);
        bus.urom = sna.urom;

        for (n, &value) in sna.crtc.iter().enumerate() {
            bus.crtc.set_register(n, value);
        }
        bus.crtc.select(sna.crtc_index);
        bus.crtc.set_counters(sna.vcc, sna.vlc);

        let [a, b, c, control] = sna.ppi;
        bus.ppi.load(a, b, c, control);
        bus.ay.load_registers(&sna.psg);
        bus.ay.select_register(sna.psg_index);

        bus.fdc.set_motor(sna.fdd_motor);

        bus.memory.ram_mut()[..sna.ram.len()].copy_from_slice(&sna.ram);
        bus.reconfigure();
        if sna.rmr & 0x10 != 0 {
            bus.crtc.reset_r52();
        }

        log::info!(
            "Loaded SNA v{}: {}K RAM, PC={:04X}",
            sna.version,
            sna.ram.len() / 1024,
            sna.regs.pc
        );
        Ok(())
    }

    /// Capture the machine as a version 3 SNA. RAM is written up to the
    /// highest expansion block in use.
    #[must_use]
    pub fn save_sna(&self) -> Vec<u8> {
        let cpu = self.cpu().registers();
        let bus = self.bus();

        let blocks = 1 + (usize::from(bus.memory.high_water()) + 1).min(bus.memory.extra_blocks());
        let ram_len = (blocks * SEGMENT_LEN).min(bus.memory.ram().len());

        let mut crtc = [0u8; 18];
        for (n, slot) in crtc.iter_mut().enumerate() {
            *slot = bus.crtc.register(n);
        }

        let sna = Snapshot {
            version: 3,
            regs: SnaRegisters {
                af: cpu.af(),
                bc: cpu.bc(),
                de: cpu.de(),
                hl: cpu.hl(),
                ix: cpu.ix,
                iy: cpu.iy,
                sp: cpu.sp,
                pc: cpu.pc,
                af_alt: cpu.af_alt(),
                bc_alt: cpu.bc_alt(),
                de_alt: cpu.de_alt(),
                hl_alt: cpu.hl_alt(),
                i: cpu.i,
                r: cpu.r_value(),
                iff1: cpu.iff1,
                iff2: cpu.iff2,
                im: cpu.im,
            },
            pen: bus.ga.pen(),
            inks: bus.ga.inks(),
            rmr: bus.ga.rmr(),
            mmr: bus.ga.mmr(),
            crtc_index: bus.crtc.index(),
            crtc,
            urom: bus.urom,
            ppi: [
                bus.ppi.port_a(),
                bus.ppi.port_b(),
                bus.ppi.port_c(),
                bus.ppi.control(),
            ],
            psg_index: bus.ay.selected_register(),
            psg: bus.ay.registers(),
            machine: MACHINE_6128,
            fdd_motor: bus.fdc.motor(),
            fdd_track: bus.fdc.cylinder(),
            vcc: bus.crtc.vcc(),
            vlc: bus.crtc.vlc(),
            ram: bus.memory.ram()[..ram_len].to_vec(),
        };
        sna.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use emu_core::{Bus, Observable};

    use crate::config::{CpcConfig, ROM_SIZE, RamSize, TitleConfig};
    use crate::cpc::Cpc;
    use crate::error::CpcError;

    fn make_cpc(ram: RamSize) -> Cpc {
        Cpc::new(&CpcConfig {
            os_rom: vec![0; ROM_SIZE],
            basic_rom: vec![0; ROM_SIZE],
            amsdos_rom: None,
            ram,
            title: TitleConfig::default(),
        })
        .expect("valid ROMs")
    }

    /// Uncompressed v2 snapshot with 128K RAM.
    fn make_sna(pc: u16, rmr: u8) -> Vec<u8> {
        let mut data = vec![0u8; 0x100];
        data[..8].copy_from_slice(b"MV - SNA");
        data[0x10] = 2;
        data[0x12] = 0x5A; // A
        data[0x19] = 0x85; // R
        data[0x1B] = 1;
        data[0x21..0x23].copy_from_slice(&0xBFF0u16.to_le_bytes());
        data[0x23..0x25].copy_from_slice(&pc.to_le_bytes());
        data[0x25] = 1;
        data[0x2E] = 0x10;
        data[0x2F] = 0x54;
        data[0x3F] = 0x4C; // border
        data[0x40] = rmr;
        data[0x41] = 0xC0;
        data[0x43] = 63;
        data[0x44] = 40;
        data[0x4F] = 0x30; // R12
        data[0x55] = 7;
        data[0x59] = 0x82;
        data[0x5A] = 7;
        data[0x62] = 0x38; // PSG R7
        data[0x6B..0x6D].copy_from_slice(&128u16.to_le_bytes());
        data[0xAB] = 5;
        let mut ram = vec![0u8; 128 * 1024];
        ram[0x4000] = 0xAA;
        ram[0x1_0000] = 0xBB;
        data.extend_from_slice(&ram);
        data
    }

    #[test]
    fn registers_and_chips_restored() {
        let mut cpc = make_cpc(RamSize::Kb128);
        cpc.load_sna(&make_sna(0x4000, 0x8D)).expect("load");

        let regs = cpc.cpu().registers();
        assert_eq!(regs.pc, 0x4000);
        assert_eq!(regs.sp, 0xBFF0);
        assert_eq!(regs.a, 0x5A);
        assert_eq!(regs.r_value(), 0x85);
        assert!(regs.iff1);
        assert_eq!(regs.im, 1);

        let bus = cpc.bus();
        assert_eq!(bus.ga.rmr(), 0x0D);
        assert_eq!(bus.ga.mode(), 1);
        assert_eq!(bus.ga.ink(16), 0x0C);
        assert_eq!(bus.urom, 7);
        assert_eq!(bus.crtc.register(12), 0x30);
        assert_eq!(bus.crtc.vcc(), 5);
        assert_eq!(bus.ay.registers()[7], 0x38);
        assert_eq!(bus.ay.selected_register(), 7);
        assert_eq!(bus.ppi.control(), 0x82);
        assert_eq!(cpc.query("memory.0x4000"), Some(emu_core::Value::U8(0xAA)));
        assert_eq!(bus.memory.ram()[0x1_0000], 0xBB);
    }

    #[test]
    fn rmr_bit4_forces_raster_counter_to_zero() {
        let mut cpc = make_cpc(RamSize::Kb128);
        cpc.load_sna(&make_sna(0x4000, 0x9D)).expect("load");
        assert_eq!(cpc.bus().crtc.r52(), 0);
        assert_eq!(cpc.bus().ga.rmr(), 0x1D);
    }

    #[test]
    fn bad_snapshot_leaves_machine_untouched() {
        let mut cpc = make_cpc(RamSize::Kb128);
        cpc.bus_mut().memory.ram_mut()[0x100] = 0x77;
        let mut data = make_sna(0x4000, 0x8D);
        data.truncate(0x2000);
        assert!(matches!(cpc.load_sna(&data), Err(CpcError::Snapshot(_))));
        assert_eq!(cpc.bus().memory.ram()[0x100], 0x77);
    }

    #[test]
    fn snapshot_larger_than_ram_rejected() {
        let mut big = make_cpc(RamSize::Kb576);
        big.bus_mut().io_write(0x7F00, 0xC4 | (3 << 3));
        big.bus_mut().memory.ram_mut()[0x10000 + 3 * 0x10000] = 0x33;
        let data = big.save_sna();

        let mut small = make_cpc(RamSize::Kb128);
        assert!(matches!(
            small.load_sna(&data),
            Err(CpcError::SnapshotTooLarge { .. })
        ));
    }

    #[test]
    fn saved_snapshot_loads_back() {
        let mut cpc = make_cpc(RamSize::Kb128);
        cpc.load_sna(&make_sna(0x1234, 0x8D)).expect("load");
        let saved = cpc.save_sna();

        let mut other = make_cpc(RamSize::Kb128);
        other.load_sna(&saved).expect("reload");
        assert_eq!(other.cpu().registers(), cpc.cpu().registers());
        assert_eq!(other.bus().memory.ram(), cpc.bus().memory.ram());
        assert_eq!(other.bus().ga.inks(), cpc.bus().ga.inks());
        assert_eq!(other.bus().crtc.register(12), 0x30);
    }
}
