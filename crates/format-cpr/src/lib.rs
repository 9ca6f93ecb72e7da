//! CPC Plus cartridge (CPR) image parser.
//!
//! A CPR file is a RIFF container with form type `AMS!`. Each ROM bank is a
//! chunk named `cbNN` (NN = bank number in decimal, 00-31) holding up to
//! 16K. Banks missing from the file read as zero. RIFF pads odd-length
//! chunks with one byte.

use thiserror::Error;

/// Size of one cartridge bank.
pub const BANK_LEN: usize = 0x4000;

/// Number of banks a cartridge can address (512K).
pub const BANK_COUNT: usize = 32;

const RIFF_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CprError {
    #[error("cartridge image too short: {0} bytes")]
    TooShort(usize),
    #[error("not a RIFF AMS! cartridge image")]
    BadSignature,
    #[error("chunk {name} at offset {offset:#X} runs past the end of the file")]
    TruncatedChunk { name: String, offset: usize },
    #[error("bank chunk {0} is not a bank number below 32")]
    BadBank(String),
    #[error("bank {bank} holds {len} bytes (limit 16384)")]
    BankTooLarge { bank: usize, len: usize },
}

/// Decoded cartridge: 32 banks of 16K.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cartridge {
    banks: Vec<[u8; BANK_LEN]>,
    present: u32,
}

impl Cartridge {
    pub fn parse(data: &[u8]) -> Result<Self, CprError> {
        if data.len() < RIFF_HEADER_LEN {
            return Err(CprError::TooShort(data.len()));
        }
        if &data[0..4] != b"RIFF" || &data[8..12] != b"AMS!" {
            return Err(CprError::BadSignature);
        }
        let declared = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
        // The RIFF length counts everything after the first 8 bytes.
        let end = declared.saturating_add(8).min(data.len());

        let mut cart = Self {
            banks: vec![[0; BANK_LEN]; BANK_COUNT],
            present: 0,
        };
        let mut offset = RIFF_HEADER_LEN;
        while offset + CHUNK_HEADER_LEN <= end {
            let tag = &data[offset..offset + 4];
            let name = String::from_utf8_lossy(tag).into_owned();
            let len = u32::from_le_bytes([
                data[offset + 4],
                data[offset + 5],
                data[offset + 6],
                data[offset + 7],
            ]) as usize;
            let start = offset + CHUNK_HEADER_LEN;
            let Some(payload) = start.checked_add(len).and_then(|e| data.get(start..e)) else {
                return Err(CprError::TruncatedChunk { name, offset });
            };

            if tag.starts_with(b"cb") {
                let bank = bank_number(tag).ok_or_else(|| CprError::BadBank(name.clone()))?;
                if len > BANK_LEN {
                    return Err(CprError::BankTooLarge { bank, len });
                }
                cart.banks[bank][..len].copy_from_slice(payload);
                cart.present |= 1 << bank;
            } else {
                log::debug!("CPR: skipping {name} chunk ({len} bytes)");
            }
            offset = start + len + (len & 1);
        }

        log::debug!("CPR: {} banks present", cart.present.count_ones());
        Ok(cart)
    }

    /// Bank `n` (0-31). Banks not in the file are all zero.
    #[must_use]
    pub fn bank(&self, n: usize) -> &[u8; BANK_LEN] {
        &self.banks[n % BANK_COUNT]
    }

    #[must_use]
    pub fn is_present(&self, n: usize) -> bool {
        n < BANK_COUNT && self.present & (1 << n) != 0
    }

    /// Number of banks supplied by the file.
    #[must_use]
    pub fn bank_count(&self) -> usize {
        self.present.count_ones() as usize
    }

    #[must_use]
    pub fn into_banks(self) -> Vec<[u8; BANK_LEN]> {
        self.banks
    }
}

fn bank_number(tag: &[u8]) -> Option<usize> {
    match tag {
        [b'c', b'b', tens @ b'0'..=b'9', units @ b'0'..=b'9'] => {
            let bank = usize::from(tens - b'0') * 10 + usize::from(units - b'0');
            (bank < BANK_COUNT).then_some(bank)
        }
        _ => None,
    }
}
