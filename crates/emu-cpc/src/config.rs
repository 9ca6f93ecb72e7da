//! Machine and per-title configuration.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use flate2::Crc;
use motorola_6845::{CrtcDriver, R52_INT_ON_VSYNC};
use serde::{Deserialize, Serialize};

use crate::error::CpcError;

/// Size of one ROM image.
pub const ROM_SIZE: usize = 0x4000;

/// T-state nudges for the second half of each scanline, selected per title.
pub const CPU_ADJUST: [i32; 7] = [0, 1, 2, 0, -2, -1, 0];

/// Installed RAM. The first 64K is always present; the rest is banked in
/// 64K blocks through the MMR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RamSize {
    /// Stock 6128: one extra block.
    #[default]
    Kb128,
    /// 512K expansion: eight extra blocks.
    Kb576,
    /// Two 512K expansions, the second selected by port bit 8.
    Kb1088,
}

impl RamSize {
    /// Number of 64K blocks above the base 64K.
    #[must_use]
    pub fn extra_blocks(self) -> usize {
        match self {
            Self::Kb128 => 1,
            Self::Kb576 => 8,
            Self::Kb1088 => 16,
        }
    }

    /// Total RAM in bytes.
    #[must_use]
    pub fn bytes(self) -> usize {
        (self.extra_blocks() + 1) * 0x1_0000
    }

    /// Map a size in KB onto a supported configuration.
    #[must_use]
    pub fn from_kb(kb: u32) -> Option<Self> {
        match kb {
            128 => Some(Self::Kb128),
            576 => Some(Self::Kb576),
            1088 => Some(Self::Kb1088),
            _ => None,
        }
    }
}

/// Compatibility settings for one title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleConfig {
    pub crtc_driver: CrtcDriver,
    /// Index into [`CPU_ADJUST`].
    pub cpu_adjust: u8,
    /// Index into the R52 VSYNC interrupt threshold table.
    pub r52_int_on_vsync: u8,
}

impl TitleConfig {
    /// T-state adjustment for the configured index.
    #[must_use]
    pub fn adjust(&self) -> i32 {
        CPU_ADJUST[usize::from(self.cpu_adjust).min(CPU_ADJUST.len() - 1)]
    }

    /// Clamp both indices into their tables.
    #[must_use]
    pub fn sanitized(self) -> Self {
        Self {
            crtc_driver: self.crtc_driver,
            cpu_adjust: self.cpu_adjust.min(CPU_ADJUST.len() as u8 - 1),
            r52_int_on_vsync: self.r52_int_on_vsync.min(R52_INT_ON_VSYNC.len() as u8 - 1),
        }
    }
}

/// Configuration for creating a CPC instance.
pub struct CpcConfig {
    /// OS (lower) ROM, 16K.
    pub os_rom: Vec<u8>,
    /// BASIC, the default upper ROM, 16K.
    pub basic_rom: Vec<u8>,
    /// AMSDOS, upper ROM 7. Without it the disk ROM slot reads as BASIC.
    pub amsdos_rom: Option<Vec<u8>>,
    pub ram: RamSize,
    pub title: TitleConfig,
}

/// CRC-32 used to key the title database.
#[must_use]
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(data);
    crc.sum()
}

/// Per-title settings keyed by image CRC, stored as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleDatabase {
    titles: HashMap<u32, TitleConfig>,
}

impl TitleDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, CpcError> {
        let text = fs::read_to_string(path)?;
        let db: Self = serde_json::from_str(&text)?;
        log::info!("Loaded {} title configs from {}", db.titles.len(), path.display());
        Ok(db)
    }

    pub fn save(&self, path: &Path) -> Result<(), CpcError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Settings for `crc`, or the defaults.
    #[must_use]
    pub fn get(&self, crc: u32) -> TitleConfig {
        self.titles.get(&crc).copied().unwrap_or_default().sanitized()
    }

    pub fn set(&mut self, crc: u32, config: TitleConfig) {
        self.titles.insert(crc, config.sanitized());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.titles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    /// Key for a disk image. Disks are rewritten as they are used, so they
    /// are identified by file name rather than contents.
    #[must_use]
    pub fn disk_key(file_name: &str) -> u32 {
        crc32(file_name.as_bytes())
    }

    /// Key for a read-only image (snapshot, cartridge, flash).
    #[must_use]
    pub fn image_key(data: &[u8]) -> u32 {
        crc32(data)
    }
}
