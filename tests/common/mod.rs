//! Synthetic Mobipocket books for the integration tests.
#![allow(dead_code)]

use mobistrip::crypto;
use mobistrip::drm::{cookie_key, key_checksum, Cookie, KeyWrapEntry, ENTRY_SIZE, SEED_KEY};
use mobistrip::Pid;

pub const SERIAL:   &str = "B002A1C457493453";
pub const PID:      &str = "DEKL1Y3*7L";
pub const BOOK_KEY: [u8; 16] = *b"0123456789abcdef";

pub const RECORD0_LEN: usize = 0x1A0;
pub const DRM_OFFSET:  usize = 0x110;

/// How record 0 describes the key-wrap table.
pub enum Drm {
    /// Encryption type 2 with these entries.
    Table(Vec<KeyWrapEntry>),
    /// What a stripped book looks like: type 0, neutral descriptor.
    Stripped,
    /// Arbitrary encryption type, empty descriptor.
    Plain(u16),
}

pub struct Book {
    pub text:        Vec<Vec<u8>>,
    /// Clear bytes appended after each text record's payload.
    pub trailing:    Vec<Vec<u8>>,
    pub extra_flags: u16,
    /// Records after the text (images, indexes).
    pub resources:   Vec<Vec<u8>>,
}

impl Book {
    pub fn simple() -> Self {
        Self {
            text:        vec![b"<html>Chapter one.".to_vec(), b" Chapter two.</html>".to_vec()],
            trailing:    vec![Vec::new(), Vec::new()],
            extra_flags: 0,
            resources:   Vec::new(),
        }
    }

    /// Book with the text encrypted under `key` and `drm` in record 0.
    pub fn encrypted(&self, key: &[u8; 16], drm: Drm) -> Vec<u8> {
        self.build(Some(key), drm)
    }

    /// Book with the text in the clear.
    pub fn plain(&self, drm: Drm) -> Vec<u8> {
        self.build(None, drm)
    }

    fn build(&self, key: Option<&[u8; 16]>, drm: Drm) -> Vec<u8> {
        let mut records = vec![record0(self.text.len() as u16, self.extra_flags, drm)];
        for (text, tail) in self.text.iter().zip(&self.trailing) {
            let mut r = match key {
                Some(k) => crypto::encrypt(k, text),
                None    => text.clone(),
            };
            r.extend_from_slice(tail);
            records.push(r);
        }
        records.extend(self.resources.iter().cloned());
        palmdb("Synthetic_Book", &records)
    }
}

fn put(buf: &mut [u8], at: usize, bytes: &[u8]) {
    buf[at..at + bytes.len()].copy_from_slice(bytes);
}

pub fn record0(text_records: u16, extra_flags: u16, drm: Drm) -> Vec<u8> {
    let mut r = vec![0u8; RECORD0_LEN];
    put(&mut r, 0x00, &1u16.to_be_bytes());
    put(&mut r, 0x08, &text_records.to_be_bytes());
    put(&mut r, 0x10, b"MOBI");
    put(&mut r, 0x14, &0xE8u32.to_be_bytes());
    put(&mut r, 0x68, &6u32.to_be_bytes());
    put(&mut r, 0xF2, &extra_flags.to_be_bytes());

    match drm {
        Drm::Table(entries) => {
            put(&mut r, 0x0C, &2u16.to_be_bytes());
            put(&mut r, 0xA8, &(DRM_OFFSET as u32).to_be_bytes());
            put(&mut r, 0xAC, &(entries.len() as u32).to_be_bytes());
            put(&mut r, 0xB0, &((entries.len() * ENTRY_SIZE) as u32).to_be_bytes());
            let mut at = DRM_OFFSET;
            for e in &entries {
                let mut raw = Vec::new();
                e.write(&mut raw).unwrap();
                put(&mut r, at, &raw);
                at += ENTRY_SIZE;
            }
        }
        Drm::Stripped => {
            put(&mut r, 0xA8, &[0xFF; 4]);
        }
        Drm::Plain(kind) => {
            put(&mut r, 0x0C, &kind.to_be_bytes());
        }
    }
    r
}

/// Assemble a PalmDB file from `records`.
pub fn palmdb(name: &str, records: &[Vec<u8>]) -> Vec<u8> {
    let mut out = name.as_bytes().to_vec();
    out.resize(0x3C, 0);
    out.extend_from_slice(b"BOOKMOBI");
    out.resize(76, 0);
    out.extend_from_slice(&(records.len() as u16).to_be_bytes());

    let mut offset = 78 + records.len() * 8 + 2;
    for (i, r) in records.iter().enumerate() {
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.push(0);
        out.extend_from_slice(&((2 * i) as u32).to_be_bytes()[1..]);
        offset += r.len();
    }
    out.extend_from_slice(&[0, 0]);
    for r in records {
        out.extend_from_slice(r);
    }
    out
}

/// Entry wrapping [`BOOK_KEY`] under `cookie_key`.
pub fn wrap(cookie_key: &[u8; 16], verification: u32, flags: u32) -> KeyWrapEntry {
    let cookie = Cookie { verification, flags, key: BOOK_KEY, expiry: 0, expiry2: 0 };
    let sealed = crypto::encrypt(cookie_key, &cookie.to_bytes());
    let mut wrapped = [0u8; 32];
    wrapped.copy_from_slice(&sealed);
    KeyWrapEntry {
        verification,
        size: ENTRY_SIZE as u32,
        kind: 1,
        checksum: key_checksum(cookie_key),
        cookie: wrapped,
    }
}

/// Entry bound to [`PID`].
pub fn pid_entry() -> KeyWrapEntry {
    wrap(&cookie_key(&Pid::parse(PID).unwrap()), 0x0BAD_F00D, 1)
}

/// Entry readable without a PID.
pub fn default_entry() -> KeyWrapEntry {
    wrap(&SEED_KEY, 0x1234_5678, 0)
}
