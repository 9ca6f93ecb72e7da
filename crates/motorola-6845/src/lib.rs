//! Motorola 6845 CRT controller, stepped one scanline at a time.
//!
//! The CPC gate array sits between the CRTC and the CPU, so this crate also
//! owns the gate array's scanline counter (R52): it is clocked by HSYNC and
//! raises the 300 Hz raster interrupt.
//!
//! Two counter policies are available. `Standard` is forgiving about
//! end-of-frame comparisons and works with most software; `Advanced`
//! follows the vertical total adjust rules more closely and is needed by a
//! handful of titles that reprogram the CRTC mid-frame.

use emu_core::{Observable, Value};

/// Number of registers addressable through the index register.
pub const REGISTER_COUNT: usize = 32;

/// Write masks for R0-R31. Unused registers read back as zero.
pub const REGISTER_MASKS: [u8; REGISTER_COUNT] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0x7F, 0x1F, 0x7F, 0x7F, //
    0xF3, 0x1F, 0x7F, 0x1F, 0x3F, 0xFF, 0x3F, 0xFF, //
    0x3F, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Power-on register values (standard 50 Hz CPC screen).
const RESET_REGISTERS: [u8; 18] = [
    63, 40, 46, 0x8E, 38, 0, 25, 30, 0, 7, 0, 0, 0x20, 0x00, 0, 0, 0, 0,
];

/// R52 thresholds for the interrupt two lines after VSYNC.
pub const R52_INT_ON_VSYNC: [u8; 3] = [28, 16, 32];

/// Scanlines without a frame end before the counters are forced back.
pub const WATCHDOG_LINES: u16 = 350;

/// VSYNC pulse width in scanlines.
pub const VSYNC_LINES: u8 = 16;

/// Size of one character-row block in screen memory.
const ROW_BLOCK: u16 = 2048;

/// Counter policy for the vertical timing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CrtcDriver {
    #[default]
    Standard,
    Advanced,
}

/// What happened on one scanline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanlineEvents {
    /// Interrupt requests raised by the gate array on this line (0-2).
    pub interrupts: u8,
    /// The frame ended (VSYNC+2 reached, or the watchdog fired).
    pub frame_end: bool,
    /// The vertical total after a VSYNC was reached: the host display
    /// should restart at its top line.
    pub frame_top: bool,
    /// Screen memory to fetch for this line, if the display is enabled.
    pub fetch: Option<LineFetch>,
}

/// Screen memory addressing for one displayed scanline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineFetch {
    /// Start of the 2K block for this raster line.
    pub base: u16,
    /// Byte offset within the (wrapped) 16K or 32K screen.
    pub offset: u16,
    /// Displayed characters (R1); each is two bytes.
    pub chars: u8,
    /// R12 selects a 32K screen.
    pub wide: bool,
    /// Odd HSYNC width: the host shifts the line by half a character.
    pub shifted: bool,
}

impl LineFetch {
    /// RAM addresses for every byte on the line, in display order.
    pub fn addresses(&self) -> impl Iterator<Item = u16> + '_ {
        let mut offset = self.offset;
        (0..self.chars).flat_map(move |_| {
            let pair = [
                self.base.wrapping_add(offset),
                self.base.wrapping_add(offset.wrapping_add(1)),
            ];
            offset = offset.wrapping_add(2);
            offset = wrap_offset(offset, self.wide);
            pair
        })
    }
}

/// Apply the 2K row wrap, stepping into the next 16K block for 32K screens.
fn wrap_offset(mut offset: u16, wide: bool) -> u16 {
    if wide && (offset & 0x0FFF) >= 0x0800 {
        offset = offset.wrapping_add(0x4000);
    }
    offset & 0x47FF
}

/// Motorola 6845 CRTC (type 3 read-back behaviour) plus the gate array's
/// raster interrupt counter.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Crtc {
    regs: [u8; REGISTER_COUNT],
    index: u8,

    /// Vertical character counter.
    vcc: u8,
    /// Vertical line counter (raster within a character row).
    vlc: u8,
    /// Gate array scanline counter.
    r52: u8,
    /// Vertical total adjust countdown; reaching zero starts a new frame.
    vtac: u8,
    dispen: bool,

    vsync_plus_two: u8,
    vsync_off_count: u8,
    vsync_seen: bool,
    display_disable_in: u8,
    watchdog: u16,
    raster_counter: u32,

    // Latched at the start of each frame
    screen_page: u16,
    screen_offset: u16,
    wide: bool,

    driver: CrtcDriver,
    r52_vsync_threshold: u8,
}

impl Default for Crtc {
    fn default() -> Self {
        Self::new()
    }
}

impl Crtc {
    #[must_use]
    pub fn new() -> Self {
        let mut crtc = Self {
            regs: [0; REGISTER_COUNT],
            index: 0,
            vcc: 0,
            vlc: 0,
            r52: 0,
            vtac: 0,
            dispen: false,
            vsync_plus_two: 0,
            vsync_off_count: 0,
            vsync_seen: false,
            display_disable_in: 0,
            watchdog: WATCHDOG_LINES,
            raster_counter: 0,
            screen_page: 0,
            screen_offset: 0,
            wide: false,
            driver: CrtcDriver::Standard,
            r52_vsync_threshold: R52_INT_ON_VSYNC[0],
        };
        crtc.reset();
        crtc
    }

    /// Restore power-on registers and clear every counter. The driver and
    /// VSYNC threshold are configuration and survive a reset.
    pub fn reset(&mut self) {
        self.regs = [0; REGISTER_COUNT];
        self.regs[..RESET_REGISTERS.len()].copy_from_slice(&RESET_REGISTERS);
        self.index = 0;
        self.vcc = 0;
        self.vlc = 0;
        self.r52 = 0;
        self.vtac = 0;
        self.dispen = false;
        self.vsync_plus_two = 0;
        self.vsync_off_count = 0;
        self.vsync_seen = false;
        self.display_disable_in = 0;
        self.watchdog = WATCHDOG_LINES;
        self.raster_counter = 0;
        self.screen_page = 0;
        self.screen_offset = 0;
        self.wide = false;
    }

    /// Select the counter policy.
    pub fn set_driver(&mut self, driver: CrtcDriver) {
        self.driver = driver;
    }

    #[must_use]
    pub fn driver(&self) -> CrtcDriver {
        self.driver
    }

    /// Select the R52 threshold for the VSYNC+2 interrupt by table index.
    pub fn set_vsync_threshold_index(&mut self, index: usize) {
        self.r52_vsync_threshold = R52_INT_ON_VSYNC[index.min(R52_INT_ON_VSYNC.len() - 1)];
    }

    // =========================================================================
    // Register interface
    // =========================================================================

    /// Write the index register.
    pub fn select(&mut self, value: u8) {
        self.index = value & 0x1F;
    }

    #[must_use]
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Write the selected register through its mask.
    pub fn write(&mut self, value: u8) {
        let idx = self.index as usize;
        self.regs[idx] = value & REGISTER_MASKS[idx];
        // Lowering the maximum raster below the current line restarts it
        if idx == 9 && self.regs[9] < self.vlc {
            self.vlc = 0;
        }
    }

    /// Type 3 read-back: both the status and data ports return registers,
    /// with the index mapped onto R10-R17.
    #[must_use]
    pub fn read(&self) -> u8 {
        match self.index & 7 {
            0 => self.regs[16],
            1 => self.regs[17],
            2 => self.regs[10],
            3 => self.regs[11],
            4 => self.regs[12],
            5 => self.regs[13],
            6 => self.regs[14],
            _ => self.regs[15],
        }
    }

    /// Raw register value.
    #[must_use]
    pub fn register(&self, n: usize) -> u8 {
        self.regs.get(n).copied().unwrap_or(0)
    }

    /// Load a register directly (snapshot restore), still masked.
    pub fn set_register(&mut self, n: usize, value: u8) {
        if let Some(slot) = self.regs.get_mut(n) {
            *slot = value & REGISTER_MASKS[n];
        }
    }

    // =========================================================================
    // Gate array scanline counter
    // =========================================================================

    #[must_use]
    pub fn r52(&self) -> u8 {
        self.r52
    }

    /// RMR bit 4: reset the scanline counter (no interrupt).
    pub fn reset_r52(&mut self) {
        self.r52 = 0;
    }

    /// The CPU accepted an interrupt: bit 5 of the counter is cleared so
    /// the next request is at least 32 lines away.
    pub fn acknowledge_interrupt(&mut self) {
        self.r52 &= 0xDF;
    }

    // =========================================================================
    // Counters
    // =========================================================================

    #[must_use]
    pub fn vcc(&self) -> u8 {
        self.vcc
    }

    #[must_use]
    pub fn vlc(&self) -> u8 {
        self.vlc
    }

    /// Force the vertical counters (snapshot restore, frame resync).
    pub fn set_counters(&mut self, vcc: u8, vlc: u8) {
        self.vcc = vcc & 0x7F;
        self.vlc = vlc & 0x1F;
    }

    /// Check counters that came from outside (a deserialised save state)
    /// against the ranges the stepping code keeps them in. Returns the name
    /// of the first field out of range.
    pub fn check_restored(&self) -> Result<(), &'static str> {
        if usize::from(self.index) >= REGISTER_COUNT {
            return Err("index");
        }
        if self.vcc > 0x7F {
            return Err("vcc");
        }
        if self.vlc > 0x1F {
            return Err("vlc");
        }
        if self.vsync_plus_two > 2 {
            return Err("vsync_plus_two");
        }
        if self.vsync_off_count > VSYNC_LINES {
            return Err("vsync_off_count");
        }
        if !(1..=WATCHDOG_LINES).contains(&self.watchdog) {
            return Err("watchdog");
        }
        if !R52_INT_ON_VSYNC.contains(&self.r52_vsync_threshold) {
            return Err("r52_vsync_threshold");
        }
        Ok(())
    }

    /// VSYNC output as seen on PPI port B bit 0.
    #[must_use]
    pub fn vsync(&self) -> bool {
        self.vsync_off_count != 0
    }

    #[must_use]
    pub fn display_enabled(&self) -> bool {
        self.dispen
    }

    // =========================================================================
    // Scanline stepping
    // =========================================================================

    /// Advance one scanline (one HSYNC).
    pub fn step_scanline(&mut self) -> ScanlineEvents {
        let mut events = ScanlineEvents::default();
        self.raster_counter = self.raster_counter.wrapping_add(1);

        // 300 Hz raster interrupt
        self.r52 = self.r52.wrapping_add(1);
        if self.r52 & 0x3F >= 52 {
            events.interrupts += 1;
            self.r52 = 0;
        }

        // Second HSYNC after VSYNC: resynchronise the raster interrupt
        if self.vsync_plus_two != 0 {
            self.vsync_plus_two -= 1;
            if self.vsync_plus_two == 0 {
                if self.r52 >= self.r52_vsync_threshold {
                    events.interrupts += 1;
                }
                self.r52 = 0;
                events.frame_end = true;
                self.watchdog = WATCHDOG_LINES;
            }
        }

        if self.vsync_off_count != 0 {
            self.vsync_off_count -= 1;
        }

        self.vlc = self.vlc.wrapping_add(1) & 0x1F;
        if self.vlc > self.regs[9] {
            self.vlc = 0;
            match self.driver {
                CrtcDriver::Advanced => self.advance_row_advanced(&mut events),
                CrtcDriver::Standard => self.advance_row_standard(&mut events),
            }
        }

        if self.vtac != 0 {
            self.vtac -= 1;
            if self.vtac == 0 {
                self.start_frame();
            }
        }

        self.watchdog = self.watchdog.saturating_sub(1);
        if self.watchdog == 0 {
            log::debug!("CRTC watchdog: no frame end in {WATCHDOG_LINES} lines");
            self.watchdog = WATCHDOG_LINES;
            self.vcc = 0;
            events.frame_end = true;
        }

        if self.dispen {
            events.fetch = Some(self.line_fetch());
        }

        if self.display_disable_in != 0 {
            self.display_disable_in -= 1;
            if self.display_disable_in == 0 {
                self.dispen = false;
            }
        }

        events
    }

    fn advance_row_advanced(&mut self, events: &mut ScanlineEvents) {
        // No counting while the vertical adjust lines run
        if self.vtac != 0 {
            return;
        }
        self.vcc = self.vcc.wrapping_add(1) & 0x7F;
        if u16::from(self.vcc) == u16::from(self.regs[4]) + 1 {
            self.vtac = (self.regs[5] & 0x1F) + 1;
            if self.vsync_seen {
                self.vsync_seen = false;
                events.frame_top = true;
            }
        }
        if self.vcc == self.regs[6] {
            self.dispen = false;
        }
        if self.vcc == self.regs[7] {
            self.begin_vsync();
        }
    }

    fn advance_row_standard(&mut self, events: &mut ScanlineEvents) {
        self.vcc = self.vcc.wrapping_add(1) & 0x7F;
        // Deliberately >= rather than ==: tolerates R4 being lowered mid-frame
        if u16::from(self.vcc) >= u16::from(self.regs[4]) + 1 {
            self.vtac = 1;
            self.vcc = 0;
            if self.vsync_seen {
                self.vsync_seen = false;
                events.frame_top = true;
                self.vtac = (self.regs[5] & 0x1F) + 1;
            }
        }
        if self.vcc == self.regs[6] {
            let adjust = self.regs[5] & 0x1F;
            if adjust > 0 {
                self.display_disable_in = adjust;
            } else {
                self.dispen = false;
            }
        }
        if self.vcc == self.regs[7] {
            self.begin_vsync();
        }
    }

    fn begin_vsync(&mut self) {
        self.vsync_plus_two = 2;
        self.vsync_off_count = VSYNC_LINES;
        self.vsync_seen = true;
    }

    /// Latch the screen start for the new frame.
    fn start_frame(&mut self) {
        self.dispen = true;
        self.raster_counter = 0;
        if self.driver == CrtcDriver::Advanced {
            self.vcc = 0;
            self.vlc = 0;
        }
        let r12 = self.regs[12];
        self.screen_page = u16::from((r12 & 0x30) >> 4) * 0x4000;
        self.screen_offset = ((u16::from(r12 & 3) << 8) | u16::from(self.regs[13])) << 1;
        self.wide = r12 & 0x0C == 0x0C;
    }

    fn line_fetch(&self) -> LineFetch {
        let row_bytes = u32::from(self.regs[1]) * 2;
        let (row, char_row) = match self.driver {
            CrtcDriver::Advanced => (u32::from(self.vlc & 7), u32::from(self.vcc)),
            CrtcDriver::Standard => {
                let height = u32::from(self.regs[9]) + 1;
                (self.raster_counter % height, self.raster_counter / height)
            }
        };
        // Only RA0-RA2 reach the address bus, so rows past 7 (R9 > 7)
        // fetch from the first eight blocks again
        let base = self
            .screen_page
            .wrapping_add(((row & 7) as u16).wrapping_mul(ROW_BLOCK));
        let offset = (char_row * row_bytes + u32::from(self.screen_offset)) as u16;
        LineFetch {
            base,
            offset: wrap_offset(offset, self.wide),
            chars: self.regs[1],
            wide: self.wide,
            shifted: self.regs[3] & 1 != 0,
        }
    }
}

/// All query paths supported by the CRTC.
const CRTC_QUERY_PATHS: &[&str] = &[
    "index", "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r12", "r13", "vcc",
    "vlc", "r52", "vtac", "dispen", "vsync", "watchdog", "screen_page", "screen_offset",
    "driver",
];

impl Observable for Crtc {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "index" => Some(self.index.into()),
            "vcc" => Some(self.vcc.into()),
            "vlc" => Some(self.vlc.into()),
            "r52" => Some(self.r52.into()),
            "vtac" => Some(self.vtac.into()),
            "dispen" => Some(self.dispen.into()),
            "vsync" => Some(self.vsync().into()),
            "watchdog" => Some(self.watchdog.into()),
            "screen_page" => Some(self.screen_page.into()),
            "screen_offset" => Some(self.screen_offset.into()),
            "driver" => Some(format!("{:?}", self.driver).into()),
            _ => {
                let n = path.strip_prefix('r')?.parse::<usize>().ok()?;
                (n < REGISTER_COUNT).then(|| self.regs[n].into())
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        CRTC_QUERY_PATHS
    }
}
