//! PID encoding: device serial → PID, and PID checksum validation.
//!
//! A PID is a short string over a 34-symbol alphabet (`A`–`Z` without `O`,
//! then `1`–`9`) carrying a two-symbol checksum suffix.  Both the checksum
//! and the serial derivation are built on CRC-32 with the register seeded
//! from `0xFFFF_FFFF` and the result complemented.

use crc32fast::Hasher;
use thiserror::Error;

/// PID alphabet.
pub const LETTERS: &[u8; 34] = b"ABCDEFGHIJKLMNPQRSTUVWXYZ123456789";

/// Number of checksum symbols appended to a PID payload.
pub const CHECKSUM_LEN: usize = 2;

/// Longest PID payload that fits the 16-byte key slot.
pub const MAX_PAYLOAD_LEN: usize = 16;

/// Serial length of a Kindle for iPhone / early Kindle device.
pub const SHORT_SERIAL_LEN: usize = 16;
/// Serial length of a 40-character device identifier.
pub const LONG_SERIAL_LEN:  usize = 40;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PidError {
    #[error("Serial must be {SHORT_SERIAL_LEN} or {LONG_SERIAL_LEN} characters, got {0}")]
    BadSerialLength(usize),
    #[error("Invalid PID checksum")]
    BadChecksum,
    #[error("PID too short: {0} characters")]
    TooShort(usize),
    #[error("PID payload is {0} bytes; at most {MAX_PAYLOAD_LEN} fit the key slot")]
    TooLong(usize),
}

fn pid_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new_with_initial(0xFFFF_FFFF);
    hasher.update(data);
    !hasher.finalize()
}

/// Append the two-symbol checksum to `payload`.
pub fn checksum(payload: &[u8]) -> Vec<u8> {
    let crc = pid_crc(payload);
    let mut crc = crc ^ (crc >> 16);
    let l = LETTERS.len() as u32;

    let mut out = Vec::with_capacity(payload.len() + CHECKSUM_LEN);
    out.extend_from_slice(payload);
    for _ in 0..CHECKSUM_LEN {
        let b   = crc & 0xFF;
        let pos = (b / l) ^ (b % l);
        out.push(LETTERS[(pos % l) as usize]);
        crc >>= 8;
    }
    out
}

/// Fold `serial` into `out_len` alphabet symbols (no checksum).
pub fn derive_from_serial(serial: &[u8], out_len: usize) -> Vec<u8> {
    let crc = pid_crc(serial).to_be_bytes();

    let mut slots = vec![0u8; out_len];
    for (i, &b) in serial.iter().enumerate() {
        slots[i % out_len] ^= b;
    }
    for (i, slot) in slots.iter_mut().enumerate() {
        *slot ^= crc[i & 3];
    }

    slots
        .into_iter()
        .map(|b| LETTERS[((b >> 7) + ((b >> 5 & 3) ^ (b & 0x1F))) as usize])
        .collect()
}

/// Produce the checksummed PID for a device serial.
pub fn pid_from_serial(serial: &str) -> Result<String, PidError> {
    let serial = serial.as_bytes();
    let pid = match serial.len() {
        SHORT_SERIAL_LEN => {
            let mut payload = derive_from_serial(serial, 7);
            payload.push(b'*');
            checksum(&payload)
        }
        LONG_SERIAL_LEN => checksum(&derive_from_serial(serial, 8)),
        n => return Err(PidError::BadSerialLength(n)),
    };
    // Alphabet symbols and `*` are ASCII.
    Ok(pid.into_iter().map(char::from).collect())
}

/// A PID whose checksum has been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pid {
    payload: Vec<u8>,
}

impl Pid {
    /// Verify the checksum suffix of `pid` and keep the payload.
    pub fn parse(pid: &str) -> Result<Self, PidError> {
        let bytes = pid.as_bytes();
        if bytes.len() <= CHECKSUM_LEN {
            return Err(PidError::TooShort(bytes.len()));
        }
        let payload = &bytes[..bytes.len() - CHECKSUM_LEN];
        if checksum(payload) != bytes {
            return Err(PidError::BadChecksum);
        }
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(PidError::TooLong(payload.len()));
        }
        Ok(Self { payload: payload.to_vec() })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload right-padded with NUL bytes to the 16-byte key slot.
    pub fn key_block(&self) -> [u8; MAX_PAYLOAD_LEN] {
        let mut block = [0u8; MAX_PAYLOAD_LEN];
        block[..self.payload.len()].copy_from_slice(&self.payload);
        block
    }
}
