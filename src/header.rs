//! Record 0: PalmDOC header followed by the MOBI header.
//!
//! Offsets are relative to the start of record 0:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x08 | 2 | text record count |
//! | 0x0C | 2 | encryption type |
//! | 0x14 | 4 | MOBI header length |
//! | 0x68 | 4 | MOBI header version |
//! | 0xA8 | 16 | DRM pointer, count, size, flags |
//! | 0xF2 | 2 | extra data flags (version ≥ 5, length ≥ 0xE4) |

use serde::Serialize;

use crate::container::{read_u16, read_u32, ContainerError};

pub const TEXT_RECORD_COUNT_OFFSET: usize = 0x08;
pub const ENCRYPTION_TYPE_OFFSET:   usize = 0x0C;
pub const MOBI_LENGTH_OFFSET:       usize = 0x14;
pub const MOBI_VERSION_OFFSET:      usize = 0x68;
pub const DRM_DESCRIPTOR_OFFSET:    usize = 0xA8;
pub const DRM_DESCRIPTOR_SIZE:      usize = 16;
pub const EXTRA_FLAGS_OFFSET:       usize = 0xF2;

/// Smallest MOBI header that carries the extra data flags.
pub const EXTRA_FLAGS_MIN_LENGTH:  u32 = 0xE4;
pub const EXTRA_FLAGS_MIN_VERSION: u32 = 5;

/// Encryption scheme declared in record 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Encryption {
    None,
    /// Old Mobipocket scheme, not supported.
    Legacy,
    /// PC1 with a PID-wrapped key table.
    Pc1,
    Unknown(u16),
}

impl From<u16> for Encryption {
    fn from(code: u16) -> Self {
        match code {
            0 => Encryption::None,
            1 => Encryption::Legacy,
            2 => Encryption::Pc1,
            n => Encryption::Unknown(n),
        }
    }
}

/// Location of the key-wrap table inside record 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrmDescriptor {
    pub offset: u32,
    pub count:  u32,
    pub size:   u32,
    pub flags:  u32,
}

impl DrmDescriptor {
    pub fn read(record0: &[u8]) -> Result<Self, ContainerError> {
        let at = DRM_DESCRIPTOR_OFFSET;
        Ok(Self {
            offset: read_u32(record0, at)?,
            count:  read_u32(record0, at + 4)?,
            size:   read_u32(record0, at + 8)?,
            flags:  read_u32(record0, at + 12)?,
        })
    }

    /// Replacement for the descriptor once the key table is gone.
    pub fn neutralized() -> [u8; DRM_DESCRIPTOR_SIZE] {
        let mut out = [0u8; DRM_DESCRIPTOR_SIZE];
        out[..4].copy_from_slice(&[0xFF; 4]);
        out
    }
}

/// Fields of record 0 needed to strip a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MobiHeader {
    pub text_records:     u16,
    pub encryption:       Encryption,
    pub mobi_length:      u32,
    pub mobi_version:     u32,
    pub extra_data_flags: u16,
}

impl MobiHeader {
    pub fn read(record0: &[u8]) -> Result<Self, ContainerError> {
        let text_records = read_u16(record0, TEXT_RECORD_COUNT_OFFSET)?;
        let encryption   = read_u16(record0, ENCRYPTION_TYPE_OFFSET)?.into();
        let mobi_length  = read_u32(record0, MOBI_LENGTH_OFFSET)?;
        let mobi_version = read_u32(record0, MOBI_VERSION_OFFSET)?;

        let extra_data_flags =
            if mobi_length >= EXTRA_FLAGS_MIN_LENGTH && mobi_version >= EXTRA_FLAGS_MIN_VERSION {
                read_u16(record0, EXTRA_FLAGS_OFFSET)?
            } else {
                0
            };

        Ok(Self { text_records, encryption, mobi_length, mobi_version, extra_data_flags })
    }
}
