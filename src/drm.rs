//! Key-wrap table in record 0 and content key recovery.
//!
//! The table holds `count` entries of [`ENTRY_SIZE`] bytes.  Each entry wraps
//! the book key in a 32-byte PC1-encrypted cookie.  The cookie key is either
//! derived from the reader's PID (`PC1-encrypt(SEED_KEY, pid)`) or, for books
//! sold without device binding, [`SEED_KEY`] itself.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{self, Read, Write};
use tracing::{debug, trace};

use crate::container::ContainerError;
use crate::crypto::{self, KEY_LEN};
use crate::pid::Pid;

/// Fixed key that wraps every cookie key.
pub const SEED_KEY: [u8; KEY_LEN] = [
    0x72, 0x38, 0x33, 0xB0, 0xB4, 0xF2, 0xE3, 0xCA,
    0xDF, 0x09, 0x01, 0xD6, 0xE2, 0xE0, 0x3F, 0x96,
];

/// Size of one key-wrap entry.
pub const ENTRY_SIZE: usize = 0x30;
/// Size of the wrapped cookie.
pub const COOKIE_SIZE: usize = 32;

/// Low bits of the cookie flags that mark a PID-bound key.
const BOUND_FLAGS_MASK: u32 = 0x1F;

/// One entry of the key-wrap table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyWrapEntry {
    pub verification: u32,
    pub size:         u32,
    pub kind:         u32,
    pub checksum:     u8,
    #[serde(serialize_with = "hex_bytes")]
    pub cookie:       [u8; COOKIE_SIZE],
}

fn hex_bytes<S: serde::Serializer>(bytes: &[u8; COOKIE_SIZE], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes))
}

impl KeyWrapEntry {
    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let verification = reader.read_u32::<BigEndian>()?;
        let size         = reader.read_u32::<BigEndian>()?;
        let kind         = reader.read_u32::<BigEndian>()?;
        let checksum     = reader.read_u8()?;
        let mut pad = [0u8; 3];
        reader.read_exact(&mut pad)?;
        let mut cookie = [0u8; COOKIE_SIZE];
        reader.read_exact(&mut cookie)?;
        Ok(Self { verification, size, kind, checksum, cookie })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<BigEndian>(self.verification)?;
        writer.write_u32::<BigEndian>(self.size)?;
        writer.write_u32::<BigEndian>(self.kind)?;
        writer.write_u8(self.checksum)?;
        writer.write_all(&[0u8; 3])?;
        writer.write_all(&self.cookie)?;
        Ok(())
    }

    /// Decrypt the cookie under `cookie_key`.
    pub fn open(&self, cookie_key: &[u8; KEY_LEN]) -> Cookie {
        Cookie::from_bytes(&crypto::decrypt(cookie_key, &self.cookie))
    }
}

/// Plaintext of a key-wrap cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub verification: u32,
    pub flags:        u32,
    pub key:          [u8; KEY_LEN],
    pub expiry:       u32,
    pub expiry2:      u32,
}

impl Cookie {
    fn from_bytes(raw: &[u8]) -> Self {
        let be = |at: usize| u32::from_be_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&raw[8..8 + KEY_LEN]);
        Self {
            verification: be(0),
            flags:        be(4),
            key,
            expiry:       be(24),
            expiry2:      be(28),
        }
    }

    pub fn to_bytes(&self) -> [u8; COOKIE_SIZE] {
        let mut out = [0u8; COOKIE_SIZE];
        out[0..4].copy_from_slice(&self.verification.to_be_bytes());
        out[4..8].copy_from_slice(&self.flags.to_be_bytes());
        out[8..24].copy_from_slice(&self.key);
        out[24..28].copy_from_slice(&self.expiry.to_be_bytes());
        out[28..32].copy_from_slice(&self.expiry2.to_be_bytes());
        out
    }
}

/// Parse `count` entries from the key-wrap block.
pub fn parse_entries(block: &[u8], count: u32) -> Result<Vec<KeyWrapEntry>, ContainerError> {
    let needed = count as usize * ENTRY_SIZE;
    if needed > block.len() {
        return Err(ContainerError::Truncated { needed, available: block.len() });
    }
    block[..needed]
        .chunks_exact(ENTRY_SIZE)
        .map(|chunk| KeyWrapEntry::read(chunk).map_err(ContainerError::from))
        .collect()
}

/// Cookie key for a PID-bound entry.
pub fn cookie_key(pid: &Pid) -> [u8; KEY_LEN] {
    let wrapped = crypto::encrypt(&SEED_KEY, &pid.key_block());
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&wrapped);
    key
}

/// Byte sum of a cookie key, as stored in each entry's checksum field.
pub fn key_checksum(key: &[u8; KEY_LEN]) -> u8 {
    key.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Which scan produced the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Entry wrapped under the reader's PID.
    Pid,
    /// Entry wrapped under the fixed seed key, no PID needed.
    Default,
}

/// A recovered book key.
#[derive(Clone, PartialEq, Eq)]
pub struct ContentKey {
    pub key:    [u8; KEY_LEN],
    pub source: KeySource,
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentKey").field("source", &self.source).finish_non_exhaustive()
    }
}

fn scan(
    entries:    &[KeyWrapEntry],
    cookie_key: &[u8; KEY_LEN],
    check_flags: bool,
) -> Option<[u8; KEY_LEN]> {
    let sum = key_checksum(cookie_key);
    entries.iter().enumerate().find_map(|(i, entry)| {
        let cookie = entry.open(cookie_key);
        let accepted = cookie.verification == entry.verification
            && entry.checksum == sum
            && (!check_flags || cookie.flags & BOUND_FLAGS_MASK == 1);
        trace!(entry = i, accepted, "key-wrap entry checked");
        accepted.then_some(cookie.key)
    })
}

/// Recover the book key: first against the PID, then against the seed key.
pub fn resolve_key(entries: &[KeyWrapEntry], pid: &Pid) -> Option<ContentKey> {
    if let Some(key) = scan(entries, &cookie_key(pid), true) {
        debug!("book key unwrapped with PID");
        return Some(ContentKey { key, source: KeySource::Pid });
    }
    debug!("no PID-bound entry matched, trying default key");
    let key = scan(entries, &SEED_KEY, false)?;
    debug!("book key unwrapped with default key");
    Some(ContentKey { key, source: KeySource::Default })
}
