//! Native save states.
//!
//! Layout: `CPCS` magic, format version (u16 LE), body length (u32 LE),
//! MessagePack body, then a zlib stream holding RAM followed by the disk
//! image bytes. The disk travels with the state so a restored session keeps
//! writes that were never flushed to the host file.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use gi_ay_3_8910::Ay3_8910;
use intel_8255::Ppi8255;
use motorola_6845::Crtc;
use nec_upd765::{DiskImage, Upd765};
use serde::{Deserialize, Serialize};
use zilog_z80::Z80State;

use crate::config::TitleConfig;
use crate::cpc::Cpc;
use crate::dandanator::Dandanator;
use crate::error::CpcError;
use crate::gate_array::GateArray;

pub const SAVE_STATE_VERSION: u16 = 1;

const MAGIC: &[u8; 4] = b"CPCS";
const HEADER_LEN: usize = 10;

#[derive(Serialize, Deserialize)]
struct StateBody {
    cpu: Z80State,
    crtc: Crtc,
    fdc: Upd765,
    ay: Ay3_8910,
    ppi: Ppi8255,
    ga: GateArray,
    urom: u8,
    bank_512k: u8,
    cart_mode: bool,
    dandanator: Option<Dandanator>,
    high_water: u8,
    target: u32,
    rebase_frames: u8,
    scanlines: u32,
    frame_count: u64,
    title: TitleConfig,
    ram_len: usize,
    disk_len: Option<usize>,
}

impl Cpc {
    /// Serialise the running machine.
    pub fn save_state(&self) -> Result<Vec<u8>, CpcError> {
        let bus = self.bus();
        let (target, rebase_frames, scanlines) = self.timing();
        let disk = bus.fdc.disk().map(DiskImage::as_bytes);

        let body = StateBody {
            cpu: self.cpu().state(),
            crtc: bus.crtc.clone(),
            fdc: bus.fdc.clone(),
            ay: bus.ay.clone(),
            ppi: bus.ppi.clone(),
            ga: bus.ga.clone(),
            urom: bus.urom,
            bank_512k: bus.bank_512k,
            cart_mode: bus.cart_mode,
            dandanator: bus.dandanator,
            high_water: bus.memory.high_water(),
            target,
            rebase_frames,
            scanlines,
            frame_count: self.frame_count(),
            title: self.title(),
            ram_len: bus.memory.ram().len(),
            disk_len: disk.map(<[u8]>::len),
        };
        let encoded = rmp_serde::to_vec(&body)?;
        let body_len = u32::try_from(encoded.len()).map_err(|_| CpcError::TruncatedState)?;

        let mut out = Vec::with_capacity(HEADER_LEN + encoded.len() + bus.memory.ram().len() / 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&SAVE_STATE_VERSION.to_le_bytes());
        out.extend_from_slice(&body_len.to_le_bytes());
        out.extend_from_slice(&encoded);

        let mut encoder = ZlibEncoder::new(out, Compression::default());
        encoder.write_all(bus.memory.ram())?;
        if let Some(disk) = disk {
            encoder.write_all(disk)?;
        }
        let out = encoder.finish()?;

        log::info!(
            "Save state: {} bytes (frame {})",
            out.len(),
            self.frame_count()
        );
        Ok(out)
    }

    /// Replace the machine with a saved state. Everything is decoded and
    /// checked first; on error the running machine is untouched.
    pub fn load_state(&mut self, data: &[u8]) -> Result<(), CpcError> {
        if data.len() < HEADER_LEN {
            return Err(CpcError::TruncatedState);
        }
        if &data[..4] != MAGIC {
            return Err(CpcError::BadMagic);
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != SAVE_STATE_VERSION {
            return Err(CpcError::VersionMismatch {
                found: version,
                expected: SAVE_STATE_VERSION,
            });
        }
        let body_len = u32::from_le_bytes([data[6], data[7], data[8], data[9]]) as usize;
        let body_end = HEADER_LEN
            .checked_add(body_len)
            .filter(|&end| end <= data.len())
            .ok_or(CpcError::TruncatedState)?;

        let body: StateBody = rmp_serde::from_slice(&data[HEADER_LEN..body_end])?;
        let expected = self.bus().memory.ram().len();
        if body.ram_len != expected {
            return Err(CpcError::RamMismatch {
                found: body.ram_len,
                expected,
            });
        }

        let corrupt = |chip: &'static str| {
            move |field: &'static str| CpcError::CorruptState { chip, field }
        };
        body.crtc.check_restored().map_err(corrupt("crtc"))?;
        body.fdc.check_restored().map_err(corrupt("fdc"))?;
        Cpc::check_timing(body.rebase_frames, body.scanlines).map_err(corrupt("timing"))?;

        let mut blob = Vec::with_capacity(body.ram_len + body.disk_len.unwrap_or(0));
        ZlibDecoder::new(&data[body_end..])
            .read_to_end(&mut blob)
            .map_err(|_| CpcError::TruncatedState)?;
        if blob.len() != body.ram_len + body.disk_len.unwrap_or(0) {
            return Err(CpcError::TruncatedState);
        }
        let disk_bytes = blob.split_off(body.ram_len);
        let disk = match body.disk_len {
            Some(_) => Some(DiskImage::parse(disk_bytes)?),
            None => None,
        };

        self.cpu_mut().restore(&body.cpu);
        let bus = self.bus_mut();
        bus.crtc = body.crtc;
        bus.fdc = body.fdc;
        if let Some(image) = disk {
            bus.fdc.restore_image(image);
        }
        bus.ay = body.ay;
        bus.ppi = body.ppi;
        bus.ga = body.ga;
        bus.ga.invalidate();
        bus.urom = body.urom;
        bus.bank_512k = body.bank_512k;
        bus.cart_mode = body.cart_mode;
        bus.dandanator = body.dandanator;
        bus.memory.ram_mut().copy_from_slice(&blob);
        bus.memory.set_high_water(body.high_water);
        bus.reconfigure();

        self.set_timing(body.target, body.rebase_frames, body.scanlines);
        self.set_frame_count(body.frame_count);
        self.apply_title_config(body.title);

        log::info!("Loaded save state (frame {})", body.frame_count);
        Ok(())
    }
}
