//! Amstrad CPC 6128 emulator.
//!
//! The machine runs scanline by scanline: 256 T-states of Z80 time per
//! 64 us line, with the CRTC, gate array, PSG and floppy controller stepped
//! between lines. RAM expansions up to 4 MB, CPR cartridges and the
//! Dandanator flash board are modelled through one banking unit.

mod bus;
#[cfg(feature = "native")]
pub mod capture;
mod config;
mod cpc;
pub mod dandanator;
mod error;
mod gate_array;
pub mod input;
mod keyboard;
pub mod memory;
pub mod palette;
mod savestate;
mod snapshot;
mod video;

pub use bus::{CpcBus, SAMPLE_RATE};
pub use config::{CPU_ADJUST, CpcConfig, ROM_SIZE, RamSize, TitleConfig, TitleDatabase, crc32};
pub use cpc::Cpc;
pub use dandanator::Dandanator;
pub use error::CpcError;
pub use gate_array::GateArray;
pub use input::{CpcKey, InputQueue};
pub use keyboard::KeyboardState;
pub use memory::{Memory, MemorySelect, Source};
pub use savestate::SAVE_STATE_VERSION;
pub use video::{FB_HEIGHT, FB_WIDTH, Video};
