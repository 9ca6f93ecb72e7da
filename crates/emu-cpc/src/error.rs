//! Machine-level errors.
//!
//! Everything here is raised while loading media or state, before the image
//! touches the running machine. Once a session is running nothing fails:
//! controller problems surface as status bits.

use format_cpr::CprError;
use format_sna::SnaError;
use nec_upd765::DskError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CpcError {
    #[error("{name} ROM must be 16384 bytes, got {len}")]
    RomSize { name: &'static str, len: usize },
    #[error("disk image: {0}")]
    Disk(#[from] DskError),
    #[error("snapshot: {0}")]
    Snapshot(#[from] SnaError),
    #[error("cartridge: {0}")]
    Cartridge(#[from] CprError),
    #[error("snapshot needs {needed} bytes of RAM, machine has {available}")]
    SnapshotTooLarge { needed: usize, available: usize },
    #[error("Dandanator image is {size} bytes (limit {limit})")]
    FlashTooLarge { size: usize, limit: usize },
    #[error("not a CPC save state")]
    BadMagic,
    #[error("save state version {found} (expected {expected})")]
    VersionMismatch { found: u16, expected: u16 },
    #[error("save state holds {found} bytes of RAM, machine has {expected}")]
    RamMismatch { found: usize, expected: usize },
    #[error("save state truncated")]
    TruncatedState,
    #[error("save state {chip} field {field} out of range")]
    CorruptState {
        chip: &'static str,
        field: &'static str,
    },
    #[error("save state encode: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("save state decode: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("title database: {0}")]
    TitleDatabase(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
