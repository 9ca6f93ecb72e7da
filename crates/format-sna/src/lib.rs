//! Amstrad CPC SNA snapshot parser.
//!
//! A snapshot is a 256-byte header followed by the RAM image. Version 1 and
//! 2 files store the RAM uncompressed straight after the header, with the
//! size in KB at $6B. Version 3 files set that size to zero and append
//! chunks instead: a 4-byte ASCII name, a 32-bit little-endian length and
//! the payload. `MEM0`..`MEM8` chunks hold 64K each, run-length encoded
//! with $E5 as the escape byte:
//!
//! | Bytes       | Meaning                     |
//! |-------------|-----------------------------|
//! | `E5 00`     | one literal $E5             |
//! | `E5 n b`    | `n` copies of `b` (n > 0)   |
//! | anything    | itself                      |
//!
//! A `MEMn` chunk exactly 64K long is stored raw. Other chunks (`CPC+`,
//! `DSCA`, ...) are skipped.
//!
//! # Header layout
//!
//! | Offset  | Field                                  |
//! |---------|----------------------------------------|
//! | $00     | `"MV - SNA"`                           |
//! | $10     | version                                |
//! | $11-$18 | F A C B E D L H                        |
//! | $19 $1A | R, I                                   |
//! | $1B $1C | IFF1, IFF2                             |
//! | $1D-$24 | IX, IY, SP, PC                         |
//! | $25     | interrupt mode                         |
//! | $26-$2D | AF' BC' DE' HL'                        |
//! | $2E     | selected pen                           |
//! | $2F-$3F | 17 inks (hardware colour numbers)      |
//! | $40 $41 | ROM/mode register, RAM configuration   |
//! | $42-$54 | CRTC index, R0-R17                     |
//! | $55     | upper ROM number                       |
//! | $56-$59 | PPI A, B, C, control                   |
//! | $5A-$6A | PSG index, R0-R15                      |
//! | $6B     | dump size in KB (16-bit)               |
//! | $6D     | machine type                           |
//! | $9C $9D | FDD motor, current track               |
//! | $AB $AC | CRTC character and line counters (v3)  |

use thiserror::Error;

/// File signature at offset 0.
pub const SIGNATURE: &[u8; 8] = b"MV - SNA";

/// Length of the fixed header.
pub const HEADER_LEN: usize = 0x100;

/// Run-length escape byte in `MEMn` chunks.
pub const RLE_ESCAPE: u8 = 0xE5;

/// Size of one `MEMn` segment.
pub const SEGMENT_LEN: usize = 0x1_0000;

/// Highest `MEMn` chunk number.
pub const MAX_SEGMENT: usize = 8;

const CHUNK_HEADER_LEN: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnaError {
    #[error("snapshot too short: {0} bytes")]
    TooShort(usize),
    #[error("missing MV - SNA signature")]
    BadSignature,
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u8),
    #[error("snapshot declares {expected} bytes of RAM but holds {actual}")]
    TruncatedDump { expected: usize, actual: usize },
    #[error("chunk {name} at offset {offset:#X} runs past the end of the file")]
    TruncatedChunk { name: String, offset: usize },
    #[error("compressed data ends inside an escape sequence")]
    TruncatedRle,
    #[error("segment {segment} decodes to more than 64K")]
    SegmentOverflow { segment: usize },
}

/// CPU state as stored in the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnaRegisters {
    pub af: u16,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub pc: u16,
    pub af_alt: u16,
    pub bc_alt: u16,
    pub de_alt: u16,
    pub hl_alt: u16,
    pub i: u8,
    pub r: u8,
    pub iff1: bool,
    pub iff2: bool,
    pub im: u8,
}

/// A decoded snapshot. `ram` is flat: segment `n` sits at `n * 64K`, so
/// `MEM0` is the base 64K and `MEM1` onward are the expansion blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub version: u8,
    pub regs: SnaRegisters,
    pub pen: u8,
    pub inks: [u8; 17],
    pub rmr: u8,
    pub mmr: u8,
    pub crtc_index: u8,
    pub crtc: [u8; 18],
    pub urom: u8,
    /// PPI port A, B, C and control latches.
    pub ppi: [u8; 4],
    pub psg_index: u8,
    pub psg: [u8; 16],
    pub machine: u8,
    pub fdd_motor: bool,
    pub fdd_track: u8,
    pub vcc: u8,
    pub vlc: u8,
    pub ram: Vec<u8>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: 3,
            regs: SnaRegisters::default(),
            pen: 0,
            inks: [0; 17],
            rmr: 0,
            mmr: 0,
            crtc_index: 0,
            crtc: [0; 18],
            urom: 0,
            ppi: [0; 4],
            psg_index: 0,
            psg: [0; 16],
            machine: 2,
            fdd_motor: false,
            fdd_track: 0,
            vcc: 0,
            vlc: 0,
            ram: vec![0; SEGMENT_LEN],
        }
    }
}

fn word(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn put_word(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

impl Snapshot {
    /// Parse a snapshot file.
    pub fn parse(data: &[u8]) -> Result<Self, SnaError> {
        if data.len() < HEADER_LEN {
            return Err(SnaError::TooShort(data.len()));
        }
        if &data[..SIGNATURE.len()] != SIGNATURE {
            return Err(SnaError::BadSignature);
        }
        let version = data[0x10];
        if !(1..=3).contains(&version) {
            return Err(SnaError::UnsupportedVersion(version));
        }

        let regs = SnaRegisters {
            af: u16::from_le_bytes([data[0x11], data[0x12]]),
            bc: word(data, 0x13),
            de: word(data, 0x15),
            hl: word(data, 0x17),
            r: data[0x19],
            i: data[0x1A],
            iff1: data[0x1B] & 1 != 0,
            iff2: data[0x1C] & 1 != 0,
            ix: word(data, 0x1D),
            iy: word(data, 0x1F),
            sp: word(data, 0x21),
            pc: word(data, 0x23),
            im: data[0x25] & 3,
            af_alt: word(data, 0x26),
            bc_alt: word(data, 0x28),
            de_alt: word(data, 0x2A),
            hl_alt: word(data, 0x2C),
        };

        let mut inks = [0; 17];
        inks.copy_from_slice(&data[0x2F..0x40]);
        let mut crtc = [0; 18];
        crtc.copy_from_slice(&data[0x43..0x55]);
        let mut ppi = [0; 4];
        ppi.copy_from_slice(&data[0x56..0x5A]);
        let mut psg = [0; 16];
        psg.copy_from_slice(&data[0x5B..0x6B]);

        let dump_size = usize::from(word(data, 0x6B)) * 1024;
        let ram = if dump_size > 0 {
            let body = &data[HEADER_LEN..];
            if body.len() < dump_size {
                return Err(SnaError::TruncatedDump {
                    expected: dump_size,
                    actual: body.len(),
                });
            }
            body[..dump_size].to_vec()
        } else {
            read_chunks(data)?
        };

        log::debug!(
            "SNA v{version}: PC={:04X} RMR={:02X} MMR={:02X} {}K RAM",
            regs.pc,
            data[0x40],
            data[0x41],
            ram.len() / 1024
        );

        Ok(Self {
            version,
            regs,
            pen: data[0x2E],
            inks,
            rmr: data[0x40],
            mmr: data[0x41],
            crtc_index: data[0x42],
            crtc,
            urom: data[0x55],
            ppi,
            psg_index: data[0x5A],
            psg,
            machine: data[0x6D],
            fdd_motor: data[0x9C] != 0,
            fdd_track: data[0x9D],
            vcc: data[0xAB],
            vlc: data[0xAC],
            ram,
        })
    }

    /// Serialise as a version 3 snapshot with one compressed `MEMn` chunk
    /// per 64K of `ram`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_LEN];
        out[..SIGNATURE.len()].copy_from_slice(SIGNATURE);
        out[0x10] = 3;
        let r = &self.regs;
        put_word(&mut out, 0x11, r.af);
        put_word(&mut out, 0x13, r.bc);
        put_word(&mut out, 0x15, r.de);
        put_word(&mut out, 0x17, r.hl);
        out[0x19] = r.r;
        out[0x1A] = r.i;
        out[0x1B] = u8::from(r.iff1);
        out[0x1C] = u8::from(r.iff2);
        put_word(&mut out, 0x1D, r.ix);
        put_word(&mut out, 0x1F, r.iy);
        put_word(&mut out, 0x21, r.sp);
        put_word(&mut out, 0x23, r.pc);
        out[0x25] = r.im;
        put_word(&mut out, 0x26, r.af_alt);
        put_word(&mut out, 0x28, r.bc_alt);
        put_word(&mut out, 0x2A, r.de_alt);
        put_word(&mut out, 0x2C, r.hl_alt);
        out[0x2E] = self.pen;
        out[0x2F..0x40].copy_from_slice(&self.inks);
        out[0x40] = self.rmr;
        out[0x41] = self.mmr;
        out[0x42] = self.crtc_index;
        out[0x43..0x55].copy_from_slice(&self.crtc);
        out[0x55] = self.urom;
        out[0x56..0x5A].copy_from_slice(&self.ppi);
        out[0x5A] = self.psg_index;
        out[0x5B..0x6B].copy_from_slice(&self.psg);
        out[0x6D] = self.machine;
        out[0x9C] = u8::from(self.fdd_motor);
        out[0x9D] = self.fdd_track;
        out[0xAB] = self.vcc;
        out[0xAC] = self.vlc;

        for (n, segment) in self.ram.chunks(SEGMENT_LEN).take(MAX_SEGMENT + 1).enumerate() {
            let packed = encode_rle(segment);
            out.extend_from_slice(b"MEM");
            out.push(b'0' + n as u8);
            out.extend_from_slice(&(packed.len() as u32).to_le_bytes());
            out.extend_from_slice(&packed);
        }
        out
    }
}

/// Walk the chunk list after the header and assemble the RAM image.
fn read_chunks(data: &[u8]) -> Result<Vec<u8>, SnaError> {
    let mut ram = Vec::new();
    let mut offset = HEADER_LEN;
    while offset + CHUNK_HEADER_LEN <= data.len() {
        let tag = &data[offset..offset + 4];
        let name = String::from_utf8_lossy(tag).into_owned();
        let len = u32::from_le_bytes([
            data[offset + 4],
            data[offset + 5],
            data[offset + 6],
            data[offset + 7],
        ]) as usize;
        let start = offset + CHUNK_HEADER_LEN;
        let Some(payload) = start.checked_add(len).and_then(|end| data.get(start..end)) else {
            return Err(SnaError::TruncatedChunk { name, offset });
        };

        match segment_number(tag) {
            Some(segment) => {
                let decoded = if len == SEGMENT_LEN {
                    payload.to_vec()
                } else {
                    decode_rle(payload, SEGMENT_LEN)
                        .map_err(|e| match e {
                            SnaError::SegmentOverflow { .. } => {
                                SnaError::SegmentOverflow { segment }
                            }
                            other => other,
                        })?
                };
                let base = segment * SEGMENT_LEN;
                if ram.len() < base + SEGMENT_LEN {
                    ram.resize(base + SEGMENT_LEN, 0);
                }
                ram[base..base + decoded.len()].copy_from_slice(&decoded);
            }
            None => log::debug!("SNA: skipping {name} chunk ({len} bytes)"),
        }
        offset = start + len;
    }
    if ram.is_empty() {
        ram.resize(SEGMENT_LEN, 0);
    }
    Ok(ram)
}

fn segment_number(tag: &[u8]) -> Option<usize> {
    match tag {
        [b'M', b'E', b'M', digit @ b'0'..=b'8'] => Some(usize::from(digit - b'0')),
        _ => None,
    }
}

/// Expand `$E5`-escaped run-length data, refusing to produce more than
/// `limit` bytes.
pub fn decode_rle(input: &[u8], limit: usize) -> Result<Vec<u8>, SnaError> {
    let mut out = Vec::with_capacity(limit.min(SEGMENT_LEN));
    let mut bytes = input.iter().copied();
    while let Some(byte) = bytes.next() {
        if byte == RLE_ESCAPE {
            let count = bytes.next().ok_or(SnaError::TruncatedRle)?;
            if count == 0 {
                out.push(RLE_ESCAPE);
            } else {
                let value = bytes.next().ok_or(SnaError::TruncatedRle)?;
                out.extend(std::iter::repeat_n(value, usize::from(count)));
            }
        } else {
            out.push(byte);
        }
        if out.len() > limit {
            return Err(SnaError::SegmentOverflow { segment: 0 });
        }
    }
    Ok(out)
}

/// Run-length encode `input` so that [`decode_rle`] reproduces it.
#[must_use]
pub fn encode_rle(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let value = input[i];
        let run = input[i..]
            .iter()
            .take(255)
            .take_while(|&&b| b == value)
            .count();
        if run > 2 || (value == RLE_ESCAPE && run == 2) {
            out.extend_from_slice(&[RLE_ESCAPE, run as u8, value]);
            i += run;
        } else if value == RLE_ESCAPE {
            out.extend_from_slice(&[RLE_ESCAPE, 0]);
            i += 1;
        } else {
            out.push(value);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(version: u8) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_LEN];
        data[..8].copy_from_slice(SIGNATURE);
        data[0x10] = version;
        data
    }

    fn push_chunk(data: &mut Vec<u8>, name: &[u8; 4], payload: &[u8]) {
        data.extend_from_slice(name);
        data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        data.extend_from_slice(payload);
    }

    #[test]
    fn escape_with_zero_count_is_literal() {
        assert_eq!(decode_rle(&[0x01, 0xE5, 0x00, 0x02], 16), Ok(vec![1, 0xE5, 2]));
    }

    #[test]
    fn escape_with_count_repeats() {
        let out = decode_rle(&[0xE5, 0x04, 0x7F, 0x09], 16).expect("decode");
        assert_eq!(out, vec![0x7F, 0x7F, 0x7F, 0x7F, 0x09]);
    }

    #[test]
    fn rle_round_trip_keeps_escape_bytes() {
        let mut input = vec![0xE5, 1, 2, 2, 0xE5, 0xE5, 3];
        input.extend(std::iter::repeat_n(0u8, 600));
        input.extend(std::iter::repeat_n(0xE5u8, 7));
        input.push(0xE5);
        let packed = encode_rle(&input);
        assert!(packed.len() < input.len());
        assert_eq!(decode_rle(&packed, input.len()).expect("decode"), input);
    }

    #[test]
    fn truncated_escape_is_rejected() {
        assert_eq!(decode_rle(&[0xE5], 16), Err(SnaError::TruncatedRle));
        assert_eq!(decode_rle(&[0xE5, 3], 16), Err(SnaError::TruncatedRle));
    }

    #[test]
    fn decode_respects_limit() {
        assert!(matches!(
            decode_rle(&[0xE5, 0xFF, 0], 100),
            Err(SnaError::SegmentOverflow { .. })
        ));
    }

    #[test]
    fn header_registers() {
        let mut data = header(2);
        data[0x11] = 0x44; // F
        data[0x12] = 0x12; // A
        data[0x13] = 0x34; // C
        data[0x14] = 0x56; // B
        data[0x19] = 0x81;
        data[0x1B] = 1;
        data[0x21..0x23].copy_from_slice(&0xBFF0u16.to_le_bytes());
        data[0x23..0x25].copy_from_slice(&0x4000u16.to_le_bytes());
        data[0x25] = 1;
        data[0x2F] = 0x14;
        data[0x3F] = 0x0B;
        data[0x40] = 0x89;
        data[0x41] = 0xC0;
        data[0x43] = 63;
        data[0x5A] = 7;
        data[0x62] = 0x38; // PSG R7
        data[0x6B] = 64;
        data.resize(HEADER_LEN + 0x1_0000, 0);
        data[HEADER_LEN + 0x4000] = 0xC9;

        let sna = Snapshot::parse(&data).expect("parse");
        assert_eq!(sna.regs.af, 0x1244);
        assert_eq!(sna.regs.bc, 0x5634);
        assert_eq!(sna.regs.r, 0x81);
        assert!(sna.regs.iff1);
        assert!(!sna.regs.iff2);
        assert_eq!(sna.regs.sp, 0xBFF0);
        assert_eq!(sna.regs.pc, 0x4000);
        assert_eq!(sna.regs.im, 1);
        assert_eq!(sna.inks[0], 0x14);
        assert_eq!(sna.inks[16], 0x0B);
        assert_eq!(sna.rmr, 0x89);
        assert_eq!(sna.mmr, 0xC0);
        assert_eq!(sna.crtc[0], 63);
        assert_eq!(sna.psg_index, 7);
        assert_eq!(sna.psg[7], 0x38);
        assert_eq!(sna.ram.len(), 0x1_0000);
        assert_eq!(sna.ram[0x4000], 0xC9);
    }

    #[test]
    fn compressed_segments_land_at_their_block() {
        let mut data = header(3);
        let mut mem0 = vec![0u8; SEGMENT_LEN];
        mem0[0x100] = 0xE5;
        mem0[0xC000..0xC010].fill(0xAA);
        let mut mem1 = vec![0u8; SEGMENT_LEN];
        mem1[5] = 0x42;
        push_chunk(&mut data, b"MEM0", &encode_rle(&mem0));
        push_chunk(&mut data, b"CPC+", &[1, 2, 3]);
        push_chunk(&mut data, b"MEM1", &encode_rle(&mem1));

        let sna = Snapshot::parse(&data).expect("parse");
        assert_eq!(sna.ram.len(), 2 * SEGMENT_LEN);
        assert_eq!(sna.ram[0x100], 0xE5);
        assert_eq!(sna.ram[0xC00F], 0xAA);
        assert_eq!(sna.ram[0x1_0005], 0x42);
    }

    #[test]
    fn raw_full_segment_is_not_decoded() {
        let mut data = header(3);
        let mut mem0 = vec![0u8; SEGMENT_LEN];
        mem0[0] = 0xE5;
        mem0[1] = 0x03;
        push_chunk(&mut data, b"MEM0", &mem0);
        let sna = Snapshot::parse(&data).expect("parse");
        assert_eq!(&sna.ram[..3], &[0xE5, 0x03, 0x00]);
    }

    #[test]
    fn truncated_chunk_is_rejected() {
        let mut data = header(3);
        data.extend_from_slice(b"MEM0");
        data.extend_from_slice(&100u32.to_le_bytes());
        data.extend_from_slice(&[0; 10]);
        assert!(matches!(
            Snapshot::parse(&data),
            Err(SnaError::TruncatedChunk { offset: 0x100, .. })
        ));
    }

    #[test]
    fn bad_header_is_rejected() {
        assert_eq!(Snapshot::parse(&[0; 16]), Err(SnaError::TooShort(16)));
        let mut data = header(3);
        data[0] = b'X';
        assert_eq!(Snapshot::parse(&data), Err(SnaError::BadSignature));
        let data = header(9);
        assert_eq!(Snapshot::parse(&data), Err(SnaError::UnsupportedVersion(9)));
    }

    #[test]
    fn short_uncompressed_dump_is_rejected() {
        let mut data = header(1);
        data[0x6B] = 64;
        data.resize(HEADER_LEN + 1024, 0);
        assert_eq!(
            Snapshot::parse(&data),
            Err(SnaError::TruncatedDump {
                expected: 0x1_0000,
                actual: 1024
            })
        );
    }

    #[test]
    fn written_snapshot_parses_back() {
        let mut sna = Snapshot::default();
        sna.regs.pc = 0x1234;
        sna.regs.hl_alt = 0xBEEF;
        sna.rmr = 0x9D;
        sna.urom = 7;
        sna.ram = vec![0u8; 2 * SEGMENT_LEN];
        sna.ram[0x1_FFFF] = 0xE5;
        let parsed = Snapshot::parse(&sna.to_bytes()).expect("parse");
        assert_eq!(parsed, sna);
    }
}
