//! DSK and Extended DSK (EDSK) disk image view.
//!
//! The controller works directly on the raw file bytes so that writes can
//! be flushed back to the host file region by region. This module decodes
//! the headers on demand and answers "where does track T, head H start".
//!
//! # Format
//!
//! Standard header: `"MV - CPCEMU Disk-File\r\nDisk-Info\r\n"`, fixed track
//! size at $32. Extended header: `"EXTENDED CPC DSK File\r\nDisk-Info\r\n"`,
//! one byte per track at $34 giving the track size in 256-byte units.
//! Tracks are stored cylinder-major, side 1 directly after side 0.

use thiserror::Error;

/// Largest disk image accepted (enough for any 3" or 3.5" CPC format).
pub const MAX_DISK_IMAGE: usize = 512 * 1024;

/// Size of the disk information block and of each Track-Info block.
pub const HEADER_LEN: usize = 0x100;

/// Most sector directory entries that fit in a Track-Info block.
pub const MAX_SECTORS: usize = 29;

const STANDARD_SIGNATURE: &[u8] = b"MV - CPC";
const EXTENDED_SIGNATURE: &[u8] = b"EXTENDED";
const TRACK_SIGNATURE: &[u8] = b"Track-Info";

/// Entries in the extended track size table ($34-$FF).
const SIZE_TABLE_LEN: usize = HEADER_LEN - 0x34;

/// Reasons a disk image is refused before it reaches the controller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DskError {
    #[error("disk image too short: {0} bytes")]
    TooShort(usize),
    #[error("unrecognised disk image signature")]
    BadSignature,
    #[error("disk image is {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },
    #[error("disk image declares {tracks} tracks and {heads} heads")]
    BadGeometry { tracks: u8, heads: u8 },
}

/// Standard images have one track size; extended images carry a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DiskKind {
    Standard,
    Extended,
}

/// One entry of a track's sector directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SectorInfo {
    pub c: u8,
    pub h: u8,
    pub r: u8,
    pub n: u8,
    pub st1: u8,
    pub st2: u8,
    /// Bytes stored in the image for this sector.
    pub stored_len: usize,
}

impl SectorInfo {
    /// Bytes transferred by a read or write of this sector.
    #[must_use]
    pub fn transfer_len(&self) -> usize {
        if self.n == 0 {
            self.stored_len
        } else {
            128 << self.n.min(7)
        }
    }
}

/// Decoded Track-Info block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackInfo {
    pub track: u8,
    pub head: u8,
    pub size_code: u8,
    pub gap3: u8,
    pub filler: u8,
    pub sectors: Vec<SectorInfo>,
    /// Absolute image offset of the first sector's data.
    pub data_offset: usize,
}

impl TrackInfo {
    /// Absolute image offset of sector `index`'s data.
    #[must_use]
    pub fn sector_offset(&self, index: usize) -> usize {
        self.data_offset
            + self.sectors[..index.min(self.sectors.len())]
                .iter()
                .map(|s| s.stored_len)
                .sum::<usize>()
    }
}

/// A disk image held as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskImage {
    data: Vec<u8>,
    kind: DiskKind,
    tracks: u8,
    heads: u8,
    track_size: usize,
    size_table: Vec<u8>,
}

impl DiskImage {
    /// Validate the header and take ownership of the bytes.
    pub fn parse(data: Vec<u8>) -> Result<Self, DskError> {
        if data.len() < HEADER_LEN {
            return Err(DskError::TooShort(data.len()));
        }
        if data.len() > MAX_DISK_IMAGE {
            return Err(DskError::TooLarge {
                size: data.len(),
                limit: MAX_DISK_IMAGE,
            });
        }

        let kind = if data.starts_with(EXTENDED_SIGNATURE) {
            DiskKind::Extended
        } else if data.starts_with(STANDARD_SIGNATURE) {
            DiskKind::Standard
        } else {
            return Err(DskError::BadSignature);
        };

        let tracks = data[0x30];
        let heads = data[0x31];
        if tracks == 0 || !(1..=2).contains(&heads) {
            return Err(DskError::BadGeometry { tracks, heads });
        }

        let track_size = usize::from(u16::from_le_bytes([data[0x32], data[0x33]]));
        let size_table = data[0x34..HEADER_LEN].to_vec();

        log::debug!("DSK: {kind:?}, {tracks} tracks, {heads} heads, track size {track_size:#06X}");

        Ok(Self {
            data,
            kind,
            tracks,
            heads,
            track_size,
            size_table,
        })
    }

    #[must_use]
    pub fn kind(&self) -> DiskKind {
        self.kind
    }

    #[must_use]
    pub fn tracks(&self) -> u8 {
        self.tracks
    }

    #[must_use]
    pub fn heads(&self) -> u8 {
        self.heads
    }

    /// Raw image bytes, including any writes made by the controller.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Absolute offset of the Track-Info block for `cylinder`/`head`.
    #[must_use]
    pub fn track_offset(&self, cylinder: u8, head: u8) -> Option<usize> {
        let index = usize::from(cylinder) * usize::from(self.heads) + usize::from(head);
        let relative = match self.kind {
            DiskKind::Standard => index * self.track_size,
            DiskKind::Extended => {
                if index >= SIZE_TABLE_LEN {
                    return None;
                }
                self.size_table[..index]
                    .iter()
                    .map(|&units| usize::from(units) * 256)
                    .sum()
            }
        };
        let offset = HEADER_LEN + relative;
        (offset + HEADER_LEN <= self.data.len()).then_some(offset)
    }

    /// Decode the Track-Info block for `cylinder`/`head`.
    #[must_use]
    pub fn track_info(&self, cylinder: u8, head: u8) -> Option<TrackInfo> {
        if head >= self.heads {
            return None;
        }
        if self.kind == DiskKind::Extended {
            let index = usize::from(cylinder) * usize::from(self.heads) + usize::from(head);
            // Unformatted track
            if self.size_table.get(index).copied().unwrap_or(0) == 0 {
                return None;
            }
        }
        let offset = self.track_offset(cylinder, head)?;
        let block = &self.data[offset..offset + HEADER_LEN];
        if !block.starts_with(TRACK_SIGNATURE) {
            log::debug!("DSK: no Track-Info at {offset:#X} (C{cylinder} H{head})");
            return None;
        }

        let size_code = block[0x14];
        let count = usize::from(block[0x15]).min(MAX_SECTORS);
        let sectors = (0..count)
            .map(|i| {
                let e = &block[0x18 + i * 8..0x18 + i * 8 + 8];
                let stored_len = match self.kind {
                    DiskKind::Extended => usize::from(u16::from_le_bytes([e[6], e[7]])),
                    DiskKind::Standard => 128 << size_code.min(7),
                };
                SectorInfo {
                    c: e[0],
                    h: e[1],
                    r: e[2],
                    n: e[3],
                    st1: e[4],
                    st2: e[5],
                    stored_len,
                }
            })
            .collect();

        Some(TrackInfo {
            track: block[0x10],
            head: block[0x11],
            size_code,
            gap3: block[0x16],
            filler: block[0x17],
            sectors,
            data_offset: offset + HEADER_LEN,
        })
    }

    /// Read one byte. Offsets past the end read as the format filler.
    #[must_use]
    pub fn byte(&self, offset: usize) -> u8 {
        self.data.get(offset).copied().unwrap_or(0xE5)
    }

    /// Write one byte; returns false (and drops the byte) past the end.
    pub fn set_byte(&mut self, offset: usize, value: u8) -> bool {
        match self.data.get_mut(offset) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Builders for synthetic images used by this crate's tests and by the
/// machine's integration tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod build {
    use super::HEADER_LEN;

    /// A standard image with `tracks` x `heads` tracks, each holding
    /// `ids.len()` sectors of 512 bytes. Sector data is filled with
    /// `fill(cylinder, head, id, byte_index)`.
    #[must_use]
    pub fn standard(
        tracks: u8,
        heads: u8,
        ids: &[u8],
        fill: impl Fn(u8, u8, u8, usize) -> u8,
    ) -> Vec<u8> {
        let track_size = HEADER_LEN + ids.len() * 512;
        let mut data = vec![0u8; HEADER_LEN];
        let sig = b"MV - CPCEMU Disk-File\r\nDisk-Info\r\n";
        data[..sig.len()].copy_from_slice(sig);
        data[0x30] = tracks;
        data[0x31] = heads;
        data[0x32..0x34].copy_from_slice(&(track_size as u16).to_le_bytes());

        for c in 0..tracks {
            for h in 0..heads {
                let mut block = vec![0u8; HEADER_LEN];
                block[..12].copy_from_slice(b"Track-Info\r\n");
                block[0x10] = c;
                block[0x11] = h;
                block[0x14] = 2;
                block[0x15] = ids.len() as u8;
                block[0x16] = 0x4E;
                block[0x17] = 0xE5;
                for (i, &id) in ids.iter().enumerate() {
                    let e = 0x18 + i * 8;
                    block[e..e + 4].copy_from_slice(&[c, h, id, 2]);
                }
                data.extend_from_slice(&block);
                for &id in ids {
                    data.extend((0..512).map(|i| fill(c, h, id, i)));
                }
            }
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_disk() -> DiskImage {
        let ids: Vec<u8> = (0x41..=0x49).collect();
        DiskImage::parse(build::standard(40, 1, &ids, |c, _, id, i| {
            c ^ id ^ (i as u8)
        }))
        .expect("valid image")
    }

    #[test]
    fn standard_geometry() {
        let disk = data_disk();
        assert_eq!(disk.kind(), DiskKind::Standard);
        assert_eq!(disk.tracks(), 40);
        assert_eq!(disk.heads(), 1);
        assert_eq!(disk.len(), 0x100 + 40 * 0x1300);
        assert_eq!(disk.track_offset(0, 0), Some(0x100));
        assert_eq!(disk.track_offset(2, 0), Some(0x100 + 2 * 0x1300));
        assert_eq!(disk.track_offset(40, 0), None);
    }

    #[test]
    fn track_directory_decoded() {
        let disk = data_disk();
        let info = disk.track_info(3, 0).expect("track 3");
        assert_eq!(info.track, 3);
        assert_eq!(info.sectors.len(), 9);
        assert_eq!(info.sectors[0].r, 0x41);
        assert_eq!(info.sectors[8].r, 0x49);
        assert_eq!(info.filler, 0xE5);
        assert_eq!(info.sector_offset(2), info.data_offset + 1024);
        assert_eq!(info.sectors[0].transfer_len(), 512);
    }

    #[test]
    fn extended_track_table() {
        let mut data = vec![0u8; HEADER_LEN];
        data[..8].copy_from_slice(b"EXTENDED");
        data[0x30] = 2;
        data[0x31] = 1;
        data[0x34] = 2; // track 0: info + 256 bytes
        data[0x35] = 3; // track 1: info + 512 bytes
        for (t, len) in [(0u8, 256usize), (1, 512)] {
            let mut block = vec![0u8; HEADER_LEN];
            block[..10].copy_from_slice(b"Track-Info");
            block[0x10] = t;
            block[0x14] = 1;
            block[0x15] = 1;
            block[0x18..0x1C].copy_from_slice(&[t, 0, 0xC1, if len == 256 { 1 } else { 2 }]);
            block[0x1E..0x20].copy_from_slice(&(len as u16).to_le_bytes());
            data.extend_from_slice(&block);
            data.extend(std::iter::repeat_n(0xA0 + t, len));
        }
        let disk = DiskImage::parse(data).expect("valid EDSK");
        assert_eq!(disk.kind(), DiskKind::Extended);
        assert_eq!(disk.track_offset(1, 0), Some(0x100 + 0x200));
        let info = disk.track_info(1, 0).expect("track 1");
        assert_eq!(info.sectors[0].stored_len, 512);
        assert_eq!(disk.byte(info.data_offset), 0xA1);
    }

    #[test]
    fn unformatted_extended_track() {
        let mut data = vec![0u8; HEADER_LEN * 2];
        data[..8].copy_from_slice(b"EXTENDED");
        data[0x30] = 2;
        data[0x31] = 1;
        data[0x34] = 1;
        data[0x100..0x10A].copy_from_slice(b"Track-Info");
        let disk = DiskImage::parse(data).expect("valid EDSK");
        assert!(disk.track_info(0, 0).is_some());
        assert!(disk.track_info(1, 0).is_none());
    }

    #[test]
    fn rejects_bad_images() {
        assert_eq!(
            DiskImage::parse(vec![0; 10]).unwrap_err(),
            DskError::TooShort(10)
        );
        assert_eq!(
            DiskImage::parse(vec![0; 0x100]).unwrap_err(),
            DskError::BadSignature
        );
        let mut data = build::standard(1, 1, &[1], |_, _, _, _| 0);
        data[0x31] = 3;
        assert!(matches!(
            DiskImage::parse(data),
            Err(DskError::BadGeometry { heads: 3, .. })
        ));
        let mut big = vec![0u8; MAX_DISK_IMAGE + 1];
        big[..8].copy_from_slice(b"MV - CPC");
        assert!(matches!(
            DiskImage::parse(big),
            Err(DskError::TooLarge { .. })
        ));
    }

    #[test]
    fn byte_access_is_bounded() {
        let mut disk = data_disk();
        let end = disk.len();
        assert_eq!(disk.byte(end), 0xE5);
        assert!(!disk.set_byte(end, 1));
        assert!(disk.set_byte(0x200, 0x77));
        assert_eq!(disk.as_bytes()[0x200], 0x77);
    }
}
