//! Top-level CPC system.
//!
//! # Scanline loop
//!
//! The CPU runs 4 MHz with every instruction rounded to whole microseconds,
//! so one 64 us scanline is 256 T-states. Each scanline is run as:
//!
//! 1. the first half-line of CPU time (128 T-states);
//! 2. one CRTC step, delivering any raster interrupt and drawing the line;
//! 3. the second half-line, nudged by the per-title CPU adjustment;
//! 4. 64 PSG clocks (1 MHz).
//!
//! The T-state counter is rebased every 16 frames so it never wraps.

#![allow(clippy::cast_possible_truncation)]

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use emu_core::{Cpu, Observable, Value};
use format_cpr::Cartridge;
use nec_upd765::{DIRTY_REGION, DiskImage};
use zilog_z80::Z80;

use crate::bus::CpcBus;
use crate::config::{CpcConfig, ROM_SIZE, TitleConfig};
use crate::dandanator::{Dandanator, FLASH_LIMIT};
use crate::error::CpcError;
use crate::input::{CpcKey, InputQueue};
use crate::memory::Memory;
use crate::video::{FB_HEIGHT, FB_WIDTH, Video};

/// T-states in half a scanline.
const HALF_LINE: u32 = 128;

/// PSG clocks per scanline.
const PSG_CLOCKS_PER_LINE: u32 = 64;

/// Frames between T-state counter rebases.
const REBASE_FRAMES: u8 = 16;

/// Fewer scanlines than this over a rebase period means the CRTC has
/// drifted away from the CPU; its counters are forced back to the top.
const MIN_REBASE_SCANLINES: u32 = 250 * REBASE_FRAMES as u32;

/// Upper bound on scanlines per frame. The CRTC watchdog ends a frame well
/// before this.
const MAX_FRAME_LINES: u32 = 1024;

/// Amstrad CPC 6128.
pub struct Cpc {
    cpu: Z80,
    bus: CpcBus,
    video: Video,
    /// T-state count the CPU runs up to in the current half-line.
    target: u32,
    frame_count: u64,
    /// Frames since the last rebase.
    rebase_frames: u8,
    /// Scanlines since the last rebase.
    scanlines: u32,
    title: TitleConfig,
    input_queue: InputQueue,
}

impl Cpc {
    /// Build a machine from its ROMs and configuration. ROM images must be
    /// exactly 16K.
    pub fn new(config: &CpcConfig) -> Result<Self, CpcError> {
        check_rom("OS", &config.os_rom)?;
        check_rom("BASIC", &config.basic_rom)?;
        if let Some(amsdos) = &config.amsdos_rom {
            check_rom("AMSDOS", amsdos)?;
        }

        let memory = Memory::new(
            config.os_rom.clone(),
            config.basic_rom.clone(),
            config.amsdos_rom.clone().unwrap_or_default(),
            config.ram,
        );

        let mut cpc = Self {
            cpu: Z80::new(),
            bus: CpcBus::new(memory),
            video: Video::new(),
            target: 0,
            frame_count: 0,
            rebase_frames: 0,
            scanlines: 0,
            title: TitleConfig::default(),
            input_queue: InputQueue::new(),
        };
        cpc.apply_title_config(config.title);
        Ok(cpc)
    }

    /// Cold reset: CPU, chips and RAM. Inserted media stays.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
        self.bus.memory.clear_ram();
        self.video = Video::new();
        self.target = 0;
        self.rebase_frames = 0;
        self.scanlines = 0;
    }

    /// Install per-title compatibility settings.
    pub fn apply_title_config(&mut self, title: TitleConfig) {
        self.title = title.sanitized();
        self.bus.crtc.set_driver(self.title.crtc_driver);
        self.bus
            .crtc
            .set_vsync_threshold_index(usize::from(self.title.r52_int_on_vsync));
        log::debug!(
            "Title config: {:?}, CPU adjust {}, R52 VSYNC index {}",
            self.title.crtc_driver,
            self.title.adjust(),
            self.title.r52_int_on_vsync
        );
    }

    #[must_use]
    pub fn title(&self) -> TitleConfig {
        self.title
    }

    /// Run one scanline. Returns true at the end of a frame.
    pub fn run_scanline(&mut self) -> bool {
        self.target = self.target.wrapping_add(HALF_LINE);
        self.cpu.run_until(&mut self.bus, self.target);

        let events = self.bus.crtc.step_scanline();
        if events.interrupts > 0 {
            self.cpu.interrupt(&mut self.bus, 0xFF);
        }
        if events.frame_top {
            self.video.frame_top();
        }
        self.video
            .render_line(events.fetch.as_ref(), &self.bus.memory, &mut self.bus.ga);

        let second_half = HALF_LINE as i32 + self.title.adjust();
        self.target = self.target.wrapping_add_signed(second_half);
        self.cpu.run_until(&mut self.bus, self.target);

        self.bus.ay.run(PSG_CLOCKS_PER_LINE);
        self.scanlines += 1;

        if events.frame_end {
            self.end_frame();
        }
        events.frame_end
    }

    fn end_frame(&mut self) {
        self.rebase_frames += 1;
        if self.rebase_frames >= REBASE_FRAMES {
            self.cpu.rebase(self.target);
            self.target = 0;
            if self.scanlines < MIN_REBASE_SCANLINES {
                log::debug!(
                    "Only {} scanlines in {REBASE_FRAMES} frames, resyncing CRTC",
                    self.scanlines
                );
                self.bus.crtc.set_counters(0, 0);
                self.bus.crtc.reset_r52();
            }
            self.rebase_frames = 0;
            self.scanlines = 0;
        }
        self.bus.fdc.frame_tick();
    }

    /// Run one complete frame. Pending input events for this frame are
    /// applied first. Returns the number of scanlines run.
    pub fn run_frame(&mut self) -> u32 {
        self.input_queue
            .process(self.frame_count, &mut self.bus.keyboard);
        self.frame_count += 1;

        let mut lines = 0;
        while lines < MAX_FRAME_LINES {
            lines += 1;
            if self.run_scanline() {
                break;
            }
        }
        lines
    }

    // =========================================================================
    // Media
    // =========================================================================

    pub fn insert_disk(&mut self, image: DiskImage) {
        self.bus.fdc.insert_disk(image);
    }

    pub fn eject_disk(&mut self) -> Option<DiskImage> {
        self.bus.fdc.eject_disk()
    }

    /// Write the 4K regions of the inserted disk changed since the last
    /// flush back to the image file at `path`. Returns the region count.
    pub fn flush_disk(&mut self, path: &Path) -> Result<usize, CpcError> {
        let Some(image) = self.bus.fdc.disk() else {
            return Ok(0);
        };
        let regions: Vec<usize> = self.bus.fdc.dirty_regions().collect();
        if regions.is_empty() {
            return Ok(0);
        }

        let bytes = image.as_bytes();
        let mut file = OpenOptions::new().write(true).open(path)?;
        for &offset in &regions {
            let end = (offset + DIRTY_REGION).min(bytes.len());
            file.seek(SeekFrom::Start(offset as u64))?;
            file.write_all(&bytes[offset..end])?;
        }
        self.bus.fdc.clear_dirty();
        log::info!("Flushed {} disk regions to {}", regions.len(), path.display());
        Ok(regions.len())
    }

    /// Plug in a CPR cartridge and reset. The cartridge replaces the OS and
    /// BASIC ROMs.
    pub fn insert_cartridge(&mut self, cart: Cartridge) {
        log::info!("Cartridge inserted: {} banks", cart.bank_count());
        self.bus.memory.set_cartridge(&cart.into_banks());
        self.bus.memory.clear_flash();
        self.bus.dandanator = None;
        self.bus.cart_mode = true;
        self.reset();
    }

    /// Plug in a Dandanator flash image and reset.
    pub fn insert_dandanator(&mut self, flash: Vec<u8>) -> Result<(), CpcError> {
        if flash.len() > FLASH_LIMIT {
            return Err(CpcError::FlashTooLarge {
                size: flash.len(),
                limit: FLASH_LIMIT,
            });
        }
        log::info!("Dandanator inserted: {} slots", flash.len().div_ceil(ROM_SIZE));
        self.bus.memory.set_flash(flash);
        self.bus.memory.clear_cartridge();
        self.bus.cart_mode = false;
        self.bus.dandanator = Some(Dandanator::new());
        self.reset();
        Ok(())
    }

    // =========================================================================
    // Host interface
    // =========================================================================

    /// ARGB32 framebuffer.
    #[must_use]
    pub fn framebuffer(&self) -> &[u32] {
        self.video.framebuffer()
    }

    #[must_use]
    pub fn framebuffer_width(&self) -> u32 {
        FB_WIDTH as u32
    }

    #[must_use]
    pub fn framebuffer_height(&self) -> u32 {
        FB_HEIGHT as u32
    }

    /// Drain the stereo samples produced since the last call.
    pub fn take_audio_buffer(&mut self) -> Vec<[f32; 2]> {
        self.bus.ay.take_buffer()
    }

    pub fn press_key(&mut self, key: CpcKey) {
        let (row, bit) = key.matrix();
        self.bus.keyboard.set_key(row, bit, true);
    }

    pub fn release_key(&mut self, key: CpcKey) {
        let (row, bit) = key.matrix();
        self.bus.keyboard.set_key(row, bit, false);
    }

    pub fn release_all_keys(&mut self) {
        self.bus.keyboard.release_all();
    }

    pub fn input_queue(&mut self) -> &mut InputQueue {
        &mut self.input_queue
    }

    #[must_use]
    pub fn cpu(&self) -> &Z80 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Z80 {
        &mut self.cpu
    }

    #[must_use]
    pub fn bus(&self) -> &CpcBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut CpcBus {
        &mut self.bus
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    // Run loop bookkeeping, for save states.

    pub(crate) fn timing(&self) -> (u32, u8, u32) {
        (self.target, self.rebase_frames, self.scanlines)
    }

    pub(crate) fn set_timing(&mut self, target: u32, rebase_frames: u8, scanlines: u32) {
        self.target = target;
        self.rebase_frames = rebase_frames;
        self.scanlines = scanlines;
    }

    /// Range check for run-loop counters coming from a save state.
    pub(crate) fn check_timing(rebase_frames: u8, scanlines: u32) -> Result<(), &'static str> {
        if rebase_frames >= REBASE_FRAMES {
            return Err("rebase_frames");
        }
        if scanlines > u32::from(REBASE_FRAMES) * MAX_FRAME_LINES {
            return Err("scanlines");
        }
        Ok(())
    }

    pub(crate) fn set_frame_count(&mut self, frames: u64) {
        self.frame_count = frames;
    }
}

fn check_rom(name: &'static str, rom: &[u8]) -> Result<(), CpcError> {
    if rom.len() == ROM_SIZE {
        Ok(())
    } else {
        Err(CpcError::RomSize {
            name,
            len: rom.len(),
        })
    }
}

/// Parse a `memory.<address>` suffix: decimal, `0x` or `$` hex.
fn parse_address(text: &str) -> Option<u16> {
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .or_else(|| text.strip_prefix('$'))
    {
        u16::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

impl Observable for Cpc {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("cpu.") {
            self.cpu.query(rest)
        } else if let Some(rest) = path.strip_prefix("crtc.") {
            self.bus.crtc.query(rest)
        } else if let Some(rest) = path.strip_prefix("fdc.") {
            self.bus.fdc.query(rest)
        } else if let Some(rest) = path.strip_prefix("psg.") {
            self.bus.ay.query(rest)
        } else if let Some(rest) = path.strip_prefix("ppi.") {
            self.bus.ppi.query(rest)
        } else if let Some(rest) = path.strip_prefix("ga.") {
            match rest {
                "pen" => Some(self.bus.ga.pen().into()),
                "mode" => Some(self.bus.ga.mode().into()),
                "rmr" => Some(self.bus.ga.rmr().into()),
                "mmr" => Some(self.bus.ga.mmr().into()),
                "border" => Some(self.bus.ga.ink(crate::gate_array::BORDER).into()),
                _ => None,
            }
        } else if let Some(rest) = path.strip_prefix("memory.") {
            parse_address(rest).map(|addr| Value::U8(self.bus.memory.read(addr)))
        } else {
            match path {
                "urom" => Some(self.bus.urom.into()),
                "frame_count" => Some(self.frame_count.into()),
                "scanlines" => Some(self.scanlines.into()),
                "target" => Some(self.target.into()),
                "ram_high_water" => Some(self.bus.memory.high_water().into()),
                _ => self.cpu.query(path),
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "cpu.<z80_paths>",
            "crtc.<crtc_paths>",
            "fdc.<fdc_paths>",
            "psg.<psg_paths>",
            "ppi.<ppi_paths>",
            "ga.pen",
            "ga.mode",
            "ga.rmr",
            "ga.mmr",
            "ga.border",
            "memory.<address>",
            "urom",
            "frame_count",
            "scanlines",
            "target",
            "ram_high_water",
        ]
    }

    /// Every chip's own snapshot under its prefix, plus the machine paths.
    fn snapshot(&self) -> BTreeMap<String, Value> {
        let chips: [(&str, &dyn Observable); 5] = [
            ("cpu", &self.cpu),
            ("crtc", &self.bus.crtc),
            ("fdc", &self.bus.fdc),
            ("psg", &self.bus.ay),
            ("ppi", &self.bus.ppi),
        ];
        let mut out = BTreeMap::new();
        for (prefix, chip) in chips {
            for (path, value) in chip.snapshot() {
                out.insert(format!("{prefix}.{path}"), value);
            }
        }
        for path in self.query_paths() {
            if let Some(value) = self.query(path) {
                out.insert((*path).to_string(), value);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RamSize;

    /// OS ROM that disables interrupts and spins: DI; JR $
    fn make_cpc() -> Cpc {
        let mut os = vec![0u8; ROM_SIZE];
        os[..3].copy_from_slice(&[0xF3, 0x18, 0xFE]);
        Cpc::new(&CpcConfig {
            os_rom: os,
            basic_rom: vec![0; ROM_SIZE],
            amsdos_rom: None,
            ram: RamSize::Kb128,
            title: TitleConfig::default(),
        })
        .expect("valid ROMs")
    }

    #[test]
    fn rom_size_checked() {
        let err = Cpc::new(&CpcConfig {
            os_rom: vec![0; 100],
            basic_rom: vec![0; ROM_SIZE],
            amsdos_rom: None,
            ram: RamSize::Kb128,
            title: TitleConfig::default(),
        });
        assert!(matches!(
            err,
            Err(CpcError::RomSize { name: "OS", len: 100 })
        ));
    }

    #[test]
    fn scanline_is_256_tstates() {
        let mut cpc = make_cpc();
        cpc.run_scanline();
        let t = cpc.cpu().t_states();
        // Last instruction may overshoot by a few T-states
        assert!((256..256 + 24).contains(&t), "t_states = {t}");
    }

    #[test]
    fn cpu_adjust_stretches_second_half() {
        let mut cpc = make_cpc();
        cpc.apply_title_config(TitleConfig {
            cpu_adjust: 2,
            ..TitleConfig::default()
        });
        for _ in 0..10 {
            cpc.run_scanline();
        }
        assert_eq!(cpc.timing().0, 10 * 258);
    }

    #[test]
    fn frame_is_312_lines_at_reset() {
        let mut cpc = make_cpc();
        cpc.run_frame();
        // First frame may be partial; the second is a full one
        assert_eq!(cpc.run_frame(), 312);
        assert_eq!(cpc.frame_count(), 2);
    }

    #[test]
    fn counter_rebased_every_16_frames() {
        let mut cpc = make_cpc();
        for _ in 0..16 {
            cpc.run_frame();
        }
        let (target, rebase_frames, scanlines) = cpc.timing();
        assert_eq!(target, 0);
        assert_eq!(rebase_frames, 0);
        assert_eq!(scanlines, 0);
        assert!(cpc.cpu().t_states() < 16, "overshoot only");
    }

    #[test]
    fn raster_interrupt_latched_while_disabled() {
        let mut cpc = make_cpc();
        for _ in 0..60 {
            cpc.run_scanline();
        }
        assert!(cpc.cpu().interrupt_pending());
    }

    #[test]
    fn oversized_flash_rejected() {
        let mut cpc = make_cpc();
        let err = cpc.insert_dandanator(vec![0; FLASH_LIMIT + 1]);
        assert!(matches!(err, Err(CpcError::FlashTooLarge { .. })));
        assert!(cpc.bus().dandanator.is_none());
    }

    #[test]
    fn observable_routes_prefixes() {
        let mut cpc = make_cpc();
        cpc.run_scanline();
        assert_eq!(cpc.query("memory.0x0000"), Some(Value::U8(0xF3)));
        assert_eq!(cpc.query("memory.$0001"), Some(Value::U8(0x18)));
        assert_eq!(cpc.query("crtc.r1"), Some(Value::U8(40)));
        assert_eq!(cpc.query("ga.mode"), Some(Value::U8(0)));
        assert_eq!(cpc.query("frame_count"), Some(Value::U64(0)));
        assert!(cpc.query("cpu.pc").is_some());
        assert_eq!(cpc.query("nonsense.path"), None);
    }

    #[test]
    fn snapshot_prefixes_chip_paths() {
        let cpc = make_cpc();
        let snap = cpc.snapshot();
        assert_eq!(snap.get("crtc.r1"), Some(&Value::U8(40)));
        assert!(snap.contains_key("cpu.pc"));
        assert!(snap.contains_key("ga.mode"));
        assert!(!snap.keys().any(|k| k.contains('<')));
    }

    #[test]
    fn typed_text_reaches_keyboard() {
        let mut cpc = make_cpc();
        cpc.input_queue().enqueue_text("a", 0);
        cpc.run_frame();
        assert_eq!(cpc.bus().keyboard.read(8) & 0x20, 0);
        for _ in 0..3 {
            cpc.run_frame();
        }
        assert_eq!(cpc.bus().keyboard.read(8), 0xFF);
    }
}
