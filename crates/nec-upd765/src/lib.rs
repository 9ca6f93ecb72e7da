//! NEC uPD765 floppy disk controller.
//!
//! Drive A only, as wired in the Amstrad CPC 6128. The controller operates
//! directly on the raw bytes of a DSK/EDSK image and records which 4K
//! regions have been written so the host can flush them back.
//!
//! # Register interface
//!
//! Two externally visible registers:
//! - **Main Status Register (MSR)**: read-only, port &FB7E on the CPC
//! - **Data Register**: read/write, port &FB7F on the CPC
//!
//! The motor latch (&FA7E) is outside the chip but lives here too, since
//! readiness depends on it.
//!
//! # State machine
//!
//! Every command is a step function keyed by an internal `state` counter
//! that advances on each data register access. Parameters must arrive in
//! the documented order; like the real chip, nothing re-synchronises a host
//! that gets the byte count wrong. `state` returns to 0 only when the last
//! result byte has been read.

pub mod commands;
pub mod dsk;

pub use dsk::{DiskImage, DiskKind, DskError, MAX_DISK_IMAGE, SectorInfo, TrackInfo};

use emu_core::{Observable, Value};

/// Main status register bits.
pub const MSR_CB: u8 = 0x10;
pub const MSR_EXM: u8 = 0x20;
pub const MSR_DIO: u8 = 0x40;
pub const MSR_RQM: u8 = 0x80;

/// ST0 bits.
pub const ST0_HD: u8 = 0x04;
pub const ST0_NR: u8 = 0x08;
pub const ST0_SE: u8 = 0x20;
pub const ST0_IC1: u8 = 0x40;
pub const ST0_IC2: u8 = 0x80;

/// ST1 bits.
pub const ST1_ND: u8 = 0x04;
pub const ST1_EN: u8 = 0x80;

/// ST3 bits.
pub const ST3_HD: u8 = 0x04;
pub const ST3_TS: u8 = 0x08;
pub const ST3_T0: u8 = 0x10;
pub const ST3_RY: u8 = 0x20;

/// Granularity of the dirty bitmap.
pub const DIRTY_REGION: usize = 4096;

/// Frames a freshly inserted disk reports "not ready" (software that waits
/// for a disk swap polls for this).
pub const INSERT_SETTLE_FRAMES: u8 = 12;

/// Sector data transfer in progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub(crate) struct Transfer {
    /// Absolute image offset of the next byte.
    pub(crate) pos: usize,
    /// Bytes left in the current sector.
    pub(crate) remaining: usize,
}

/// NEC uPD765 floppy disk controller with one drive.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Upd765 {
    pub(crate) msr: u8,
    pub(crate) st0: u8,
    pub(crate) st1: u8,
    pub(crate) st2: u8,
    pub(crate) st3: u8,

    // Command registers
    pub(crate) c: u8,
    pub(crate) h: u8,
    pub(crate) r: u8,
    pub(crate) n: u8,
    pub(crate) eot: u8,
    pub(crate) drive: u8,
    pub(crate) side: u8,

    /// Low 5 bits of the command byte.
    pub(crate) command: u8,
    /// Step counter within the current command; 0 = idle.
    pub(crate) state: u8,

    /// Present cylinder number.
    pub(crate) pcn: u8,
    pub(crate) motor: bool,
    /// A seek or recalibrate completed and has not been sensed yet.
    pub(crate) seek_end: bool,
    /// Interrupt condition waiting for SENSE INTERRUPT STATUS.
    pub(crate) interrupt: bool,
    pub(crate) ready_in: u8,
    pub(crate) image_ready: bool,

    /// Next sector to pass under the head (READ ID order).
    pub(crate) sector_index: usize,
    /// Sector directory for both sides of the current cylinder.
    pub(crate) cache: [TrackInfo; 2],
    pub(crate) transfer: Transfer,
    /// Set once a write has completed without error.
    pub(crate) written: bool,

    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) image: Option<DiskImage>,
    pub(crate) dirty: Vec<bool>,
}

impl Upd765 {
    /// Create a controller with no disk inserted.
    #[must_use]
    pub fn new() -> Self {
        Self {
            msr: MSR_RQM,
            st0: ST0_SE,
            st1: 0,
            st2: 0,
            st3: 0,
            c: 0,
            h: 0,
            r: 0,
            n: 0,
            eot: 0,
            drive: 0,
            side: 0,
            command: 0,
            state: 0,
            pcn: 0,
            motor: false,
            seek_end: false,
            interrupt: false,
            ready_in: 0,
            image_ready: false,
            sector_index: 0,
            cache: [TrackInfo::default(), TrackInfo::default()],
            transfer: Transfer::default(),
            written: false,
            image: None,
            dirty: Vec::new(),
        }
    }

    /// Reset the controller. The inserted disk stays in the drive.
    pub fn reset(&mut self) {
        let image = self.image.take();
        let dirty = std::mem::take(&mut self.dirty);
        *self = Self::new();
        self.image = image;
        self.dirty = dirty;
        if self.image.is_some() {
            self.image_ready = true;
            self.update_two_sided();
            self.change_track(0);
        }
    }

    // =========================================================================
    // Port interface
    // =========================================================================

    /// Read the main status register.
    #[must_use]
    pub fn read_status(&self) -> u8 {
        self.msr
    }

    /// Read the data register (result bytes, sector data).
    pub fn read_data(&mut self) -> u8 {
        if self.state == 0 {
            return 0xFF;
        }
        self.step(0)
    }

    /// Write the data register (command and parameter bytes, sector data).
    pub fn write_data(&mut self, value: u8) {
        if self.state == 0 {
            self.begin_command(value);
        } else {
            self.step(value);
        }
    }

    /// Motor latch (bit 0 of the &FA7E write).
    pub fn set_motor(&mut self, on: bool) {
        if on != self.motor {
            log::trace!("FDC motor {}", if on { "on" } else { "off" });
        }
        self.motor = on;
    }

    #[must_use]
    pub fn motor(&self) -> bool {
        self.motor
    }

    /// Once per frame: counts down the not-ready window after an insert.
    pub fn frame_tick(&mut self) {
        if self.ready_in == 0 {
            return;
        }
        self.ready_in -= 1;
        if self.ready_in == 0 {
            self.image_ready = true;
        }
        if self.drive_ready() {
            self.st0 &= !(ST0_NR | ST0_IC1 | ST0_IC2);
        } else {
            self.st0 |= ST0_NR;
            if !self.image_ready {
                self.st0 |= ST0_IC1 | ST0_IC2;
            }
        }
    }

    // =========================================================================
    // Disk handling
    // =========================================================================

    /// Insert a disk image. The drive reports "not ready" for a few frames,
    /// then the head sits on cylinder 0.
    pub fn insert_disk(&mut self, image: DiskImage) {
        log::info!(
            "FDC: disk inserted ({:?}, {} tracks, {} heads)",
            image.kind(),
            image.tracks(),
            image.heads()
        );
        self.dirty = vec![false; image.len().div_ceil(DIRTY_REGION)];
        self.image = Some(image);
        self.image_ready = false;
        self.ready_in = INSERT_SETTLE_FRAMES;
        self.written = false;
        self.update_two_sided();
        self.change_track(0);
    }

    /// Put back an image captured in a save state without re-running the
    /// insert sequence.
    pub fn restore_image(&mut self, image: DiskImage) {
        if self.dirty.len() != image.len().div_ceil(DIRTY_REGION) {
            self.dirty = vec![false; image.len().div_ceil(DIRTY_REGION)];
        }
        self.image = Some(image);
    }

    /// Remove the disk, returning it (with any writes applied).
    pub fn eject_disk(&mut self) -> Option<DiskImage> {
        self.image_ready = false;
        self.ready_in = 0;
        self.cache = [TrackInfo::default(), TrackInfo::default()];
        self.dirty.clear();
        self.image.take()
    }

    #[must_use]
    pub fn disk(&self) -> Option<&DiskImage> {
        self.image.as_ref()
    }

    /// Whether any completed write has landed on the image.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.written
    }

    /// Byte offsets of the 4K image regions written since the last
    /// [`clear_dirty`](Self::clear_dirty).
    pub fn dirty_regions(&self) -> impl Iterator<Item = usize> + '_ {
        self.dirty
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d)
            .map(|(i, _)| i * DIRTY_REGION)
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.iter_mut().for_each(|d| *d = false);
        self.written = false;
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    #[must_use]
    pub fn state(&self) -> u8 {
        self.state
    }

    #[must_use]
    pub fn st0(&self) -> u8 {
        self.st0
    }

    #[must_use]
    pub fn st1(&self) -> u8 {
        self.st1
    }

    #[must_use]
    pub fn st3(&self) -> u8 {
        self.st3
    }

    #[must_use]
    pub fn cylinder(&self) -> u8 {
        self.pcn
    }

    /// Check fields that came from outside (a deserialised save state)
    /// against the ranges the command steps keep them in. Returns the name
    /// of the first field out of range.
    pub fn check_restored(&self) -> Result<(), &'static str> {
        if self.state > commands::LAST_STEP {
            return Err("state");
        }
        if self.side > 1 {
            return Err("side");
        }
        if self.drive > 3 {
            return Err("drive");
        }
        if self.transfer.pos > MAX_DISK_IMAGE {
            return Err("transfer");
        }
        Ok(())
    }

    // =========================================================================
    // Internal
    // =========================================================================

    pub(crate) fn drive_ready(&self) -> bool {
        self.motor && self.drive == 0 && self.image_ready
    }

    fn update_two_sided(&mut self) {
        // The TS line is inverted on the CPC drive: set means one side
        if self.image.as_ref().is_some_and(|d| d.heads() > 1) {
            self.st3 &= !ST3_TS;
        } else {
            self.st3 |= ST3_TS;
        }
    }

    /// Move the head and re-read the sector directories for both sides.
    pub(crate) fn change_track(&mut self, cylinder: u8) {
        self.pcn = cylinder;
        if cylinder == 0 {
            self.st3 |= ST3_T0;
        } else {
            self.st3 &= !ST3_T0;
        }
        if self.side != 0 {
            self.st3 |= ST3_HD;
        } else {
            self.st3 &= !ST3_HD;
        }

        for head in 0..2u8 {
            self.cache[usize::from(head)] = self
                .image
                .as_ref()
                .and_then(|d| d.track_info(cylinder, head))
                .unwrap_or_default();
        }
        self.sector_index = 0;
        self.read_chrn();
    }

    /// Load CHRN from the next sector header under the head.
    pub(crate) fn read_chrn(&mut self) {
        let track = &self.cache[usize::from(self.side)];
        let Some(sector) = track.sectors.get(self.sector_index) else {
            return;
        };
        self.c = sector.c;
        self.h = sector.h;
        self.r = sector.r;
        self.n = sector.n;
        self.sector_index = (self.sector_index + 1) % track.sectors.len();
    }

    /// Find the sector matching CHRN on the current side. On a miss the
    /// "no data" condition is raised.
    pub(crate) fn seek_sector(&mut self) -> Option<usize> {
        let track = &self.cache[usize::from(self.side)];
        let found = track
            .sectors
            .iter()
            .position(|s| s.c == self.c && s.h == self.h && s.r == self.r && s.n == self.n);
        match found {
            Some(i) => {
                self.sector_index = (i + 1) % track.sectors.len();
                Some(i)
            }
            None => {
                log::debug!(
                    "FDC: sector C{:02X} H{:02X} R{:02X} N{:02X} not found on cylinder {}",
                    self.c,
                    self.h,
                    self.r,
                    self.n,
                    self.pcn
                );
                self.st0 |= ST0_IC1;
                self.st1 |= ST1_ND;
                None
            }
        }
    }

    /// Prime a transfer for sector `index` of the current side.
    pub(crate) fn start_transfer(&mut self, index: usize) {
        let track = &self.cache[usize::from(self.side)];
        let sector = track.sectors[index];
        self.st1 = sector.st1 & 0x25;
        self.st2 = sector.st2 & 0x61;
        self.transfer = Transfer {
            pos: track.sector_offset(index),
            remaining: sector.transfer_len(),
        };
    }

    /// Fresh ST0 for a command on the selected drive/side.
    pub(crate) fn set_st0(&mut self) {
        self.st0 = 0;
        if !self.drive_ready() {
            self.st0 |= ST0_IC1 | ST0_NR;
        }
        if self.side != 0 {
            self.st0 |= ST0_HD;
        }
        self.st1 = 0;
        self.st2 = 0;
    }

    pub(crate) fn select_drive(&mut self, value: u8) {
        self.drive = value & 3;
        self.side = (value >> 2) & 1;
    }

    pub(crate) fn mark_dirty(&mut self, pos: usize) {
        if let Some(region) = self.dirty.get_mut(pos / DIRTY_REGION) {
            *region = true;
        }
    }

    /// Command complete: back to idle, ready for the next command byte.
    pub(crate) fn finish(&mut self) {
        self.state = 0;
        self.msr &= !(MSR_CB | MSR_DIO | MSR_EXM);
    }
}

impl Default for Upd765 {
    fn default() -> Self {
        Self::new()
    }
}

/// All query paths supported by the FDC.
const FDC_QUERY_PATHS: &[&str] = &[
    "msr", "st0", "st1", "st2", "st3", "c", "h", "r", "n", "eot", "drive", "side", "command",
    "state", "cylinder", "motor", "ready", "sector_index", "disk",
];

impl Observable for Upd765 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "msr" => Some(self.msr.into()),
            "st0" => Some(self.st0.into()),
            "st1" => Some(self.st1.into()),
            "st2" => Some(self.st2.into()),
            "st3" => Some(self.st3.into()),
            "c" => Some(self.c.into()),
            "h" => Some(self.h.into()),
            "r" => Some(self.r.into()),
            "n" => Some(self.n.into()),
            "eot" => Some(self.eot.into()),
            "drive" => Some(self.drive.into()),
            "side" => Some(self.side.into()),
            "command" => Some(self.command.into()),
            "state" => Some(self.state.into()),
            "cylinder" => Some(self.pcn.into()),
            "motor" => Some(self.motor.into()),
            "ready" => Some(self.drive_ready().into()),
            "sector_index" => Some((self.sector_index as u8).into()),
            "disk" => Some(self.image.is_some().into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        FDC_QUERY_PATHS
    }
}
