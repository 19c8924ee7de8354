//! PalmDB record container (`BOOKMOBI`).
//!
//! # Layout
//! ```text
//! 0x00  name, attributes, dates ...      (60 bytes, not interpreted)
//! 0x3C  type + creator                   "BOOKMOBI"
//! 0x4C  record count                     u16 BE
//! 0x4E  record table                     count × 8 bytes
//!         offset  u32 BE
//!         flags   u8
//!         value   u24 BE
//! ...   record data, records back to back up to EOF
//! ```
//!
//! A [`Container`] owns one copy of the file.  Records are never resized;
//! [`Container::patch`] overwrites bytes inside a single record.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};
use std::ops::Range;
use thiserror::Error;

/// Type/creator tag of a Mobipocket book.
pub const MAGIC: &[u8; 8] = b"BOOKMOBI";
/// Length of the NUL-padded database name at the start of the file.
pub const NAME_LEN: usize = 32;
/// Offset of [`MAGIC`] in the file.
pub const MAGIC_OFFSET: usize = 0x3C;
/// Offset of the record count.
pub const RECORD_COUNT_OFFSET: usize = 76;
/// Offset of the first record table entry.
pub const RECORD_TABLE_OFFSET: usize = 78;
/// Size of one record table entry.
pub const RECORD_ENTRY_SIZE: usize = 8;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Not a Mobipocket file (type/creator is not BOOKMOBI)")]
    InvalidMagic,
    #[error("File truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("Record {index} offset {offset:#x} is out of order or past end of file")]
    BadRecordOffset { index: usize, offset: u32 },
    #[error("Record {index} does not exist (container has {count})")]
    NoSuchRecord { index: usize, count: usize },
    #[error("Patch {start:#x}..{end:#x} crosses the end of its record at {limit:#x}")]
    PatchOutOfBounds { start: usize, end: usize, limit: usize },
    #[error("Field at {offset:#x} (+{len}) lies outside a {available}-byte record")]
    FieldOutOfBounds { offset: usize, len: usize, available: usize },
    #[error("Record {index}: trailing entries claim {trailing} bytes of a {len}-byte record")]
    TrailingOverflow { index: usize, trailing: usize, len: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// One record table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordEntry {
    pub offset: u32,
    pub flags:  u8,
    /// 24-bit unique id.
    pub value:  u32,
}

impl RecordEntry {
    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            offset: reader.read_u32::<BigEndian>()?,
            flags:  reader.read_u8()?,
            value:  reader.read_u24::<BigEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<BigEndian>(self.offset)?;
        writer.write_u8(self.flags)?;
        writer.write_u24::<BigEndian>(self.value)?;
        Ok(())
    }
}

/// A parsed PalmDB file: the raw bytes plus its record index.
#[derive(Debug, Clone)]
pub struct Container {
    data:    Vec<u8>,
    records: Vec<RecordEntry>,
}

impl Container {
    /// Parse the record table of `data`.  Takes ownership; the caller's
    /// source bytes are never touched by later patches.
    pub fn parse(data: Vec<u8>) -> Result<Self, ContainerError> {
        need(&data, RECORD_TABLE_OFFSET)?;
        if &data[MAGIC_OFFSET..MAGIC_OFFSET + MAGIC.len()] != MAGIC {
            return Err(ContainerError::InvalidMagic);
        }

        let mut cursor = Cursor::new(&data[RECORD_COUNT_OFFSET..]);
        let count = cursor.read_u16::<BigEndian>()? as usize;
        need(&data, RECORD_TABLE_OFFSET + count * RECORD_ENTRY_SIZE)?;

        let mut records = Vec::with_capacity(count);
        let mut floor = (RECORD_TABLE_OFFSET + count * RECORD_ENTRY_SIZE) as u64;
        for index in 0..count {
            let entry = RecordEntry::read(&mut cursor)?;
            let offset = entry.offset as u64;
            let ordered = if index == 0 { offset >= floor } else { offset > floor };
            if !ordered || offset > data.len() as u64 {
                return Err(ContainerError::BadRecordOffset { index, offset: entry.offset });
            }
            floor = offset;
            records.push(entry);
        }

        Ok(Self { data, records })
    }

    /// Database name from the PalmDB header.
    pub fn name(&self) -> String {
        let raw = &self.data[..NAME_LEN];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn entries(&self) -> &[RecordEntry] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Absolute byte range of record `index`.
    pub fn record_range(&self, index: usize) -> Result<Range<usize>, ContainerError> {
        let entry = self.records.get(index).ok_or(ContainerError::NoSuchRecord {
            index,
            count: self.records.len(),
        })?;
        let end = match self.records.get(index + 1) {
            Some(next) => next.offset as usize,
            None       => self.data.len(),
        };
        Ok(entry.offset as usize..end)
    }

    pub fn record(&self, index: usize) -> Result<&[u8], ContainerError> {
        Ok(&self.data[self.record_range(index)?])
    }

    /// Overwrite `bytes.len()` bytes at absolute offset `offset`.  The range
    /// must end inside the record that contains `offset`.
    pub fn patch(&mut self, offset: usize, bytes: &[u8]) -> Result<(), ContainerError> {
        let end = offset + bytes.len();
        let limit = self
            .records
            .iter()
            .position(|r| r.offset as usize > offset)
            .map(|next| self.records[next].offset as usize)
            .unwrap_or(self.data.len());
        if end > limit {
            return Err(ContainerError::PatchOutOfBounds { start: offset, end, limit });
        }
        self.data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Overwrite bytes of record `index` starting `in_offset` bytes into it.
    pub fn patch_record(&mut self, index: usize, bytes: &[u8], in_offset: usize) -> Result<(), ContainerError> {
        let range = self.record_range(index)?;
        let start = range.start + in_offset;
        if start + bytes.len() > range.end {
            return Err(ContainerError::PatchOutOfBounds {
                start,
                end: start + bytes.len(),
                limit: range.end,
            });
        }
        self.patch(start, bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

fn need(data: &[u8], needed: usize) -> Result<(), ContainerError> {
    if data.len() < needed {
        return Err(ContainerError::Truncated { needed, available: data.len() });
    }
    Ok(())
}

/// Checked big-endian field reads from a record.
pub(crate) fn field(record: &[u8], offset: usize, len: usize) -> Result<&[u8], ContainerError> {
    record.get(offset..offset + len).ok_or(ContainerError::FieldOutOfBounds {
        offset,
        len,
        available: record.len(),
    })
}

pub(crate) fn read_u16(record: &[u8], offset: usize) -> Result<u16, ContainerError> {
    Ok(field(record, offset, 2)?.read_u16::<BigEndian>()?)
}

pub(crate) fn read_u32(record: &[u8], offset: usize) -> Result<u32, ContainerError> {
    Ok(field(record, offset, 4)?.read_u32::<BigEndian>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(records: &[&[u8]]) -> Vec<u8> {
        let mut out = b"Test_Book".to_vec();
        out.resize(MAGIC_OFFSET, 0);
        out.extend_from_slice(MAGIC);
        out.resize(RECORD_COUNT_OFFSET, 0);
        out.write_u16::<BigEndian>(records.len() as u16).unwrap();
        let mut offset = RECORD_TABLE_OFFSET + records.len() * RECORD_ENTRY_SIZE + 2;
        for (i, r) in records.iter().enumerate() {
            RecordEntry { offset: offset as u32, flags: 0, value: 2 * i as u32 }
                .write(&mut out)
                .unwrap();
            offset += r.len();
        }
        out.extend_from_slice(&[0, 0]);
        for r in records {
            out.extend_from_slice(r);
        }
        out
    }

    #[test]
    fn parse_and_load_records() {
        let raw = build(&[b"zero", b"one!", b"two"]);
        let c = Container::parse(raw.clone()).unwrap();
        assert_eq!(c.record_count(), 3);
        assert_eq!(c.name(), "Test_Book");
        assert_eq!(c.record(0).unwrap(), b"zero");
        assert_eq!(c.record(1).unwrap(), b"one!");
        assert_eq!(c.record(2).unwrap(), b"two");
        assert_eq!(c.entries()[2].value, 4);
        assert_eq!(c.into_bytes(), raw);
    }

    #[test]
    fn bad_magic() {
        let mut raw = build(&[b"zero"]);
        raw[MAGIC_OFFSET] = b'X';
        assert!(matches!(Container::parse(raw), Err(ContainerError::InvalidMagic)));
    }

    #[test]
    fn truncated_table() {
        let mut raw = build(&[b"zero", b"one"]);
        raw.truncate(RECORD_TABLE_OFFSET + 4);
        assert!(matches!(Container::parse(raw), Err(ContainerError::Truncated { .. })));
        assert!(matches!(Container::parse(vec![0u8; 10]), Err(ContainerError::Truncated { .. })));
    }

    #[test]
    fn offsets_must_increase() {
        let mut raw = build(&[b"zero", b"one"]);
        // Point record 1 back at record 0.
        let r0 = raw[RECORD_TABLE_OFFSET..RECORD_TABLE_OFFSET + 4].to_vec();
        raw[RECORD_TABLE_OFFSET + 8..RECORD_TABLE_OFFSET + 12].copy_from_slice(&r0);
        assert!(matches!(
            Container::parse(raw),
            Err(ContainerError::BadRecordOffset { index: 1, .. })
        ));
    }

    #[test]
    fn patch_within_record() {
        let mut c = Container::parse(build(&[b"zero", b"one!"])).unwrap();
        c.patch_record(0, b"ZE", 0).unwrap();
        c.patch_record(1, b"!", 3).unwrap();
        assert_eq!(c.record(0).unwrap(), b"ZEro");
        assert_eq!(c.record(1).unwrap(), b"one!");
    }

    #[test]
    fn patch_crossing_record_end_fails() {
        let mut c = Container::parse(build(&[b"zero", b"one!"])).unwrap();
        let before = c.as_bytes().to_vec();
        assert!(matches!(
            c.patch_record(0, b"toolong", 0),
            Err(ContainerError::PatchOutOfBounds { .. })
        ));
        let start = c.record_range(0).unwrap().start;
        assert!(c.patch(start + 2, b"xyz").is_err());
        assert!(c.patch_record(1, b"x", 4).is_err());
        assert_eq!(c.as_bytes(), &before[..]);
    }

    #[test]
    fn missing_record() {
        let c = Container::parse(build(&[b"zero"])).unwrap();
        assert!(matches!(c.record(1), Err(ContainerError::NoSuchRecord { index: 1, count: 1 })));
    }

    #[test]
    fn field_reads_are_checked() {
        let rec = [0x00, 0x02, 0x00, 0x00, 0x01, 0x00];
        assert_eq!(read_u16(&rec, 0).unwrap(), 2);
        assert_eq!(read_u32(&rec, 2).unwrap(), 0x100);
        assert!(matches!(read_u32(&rec, 4), Err(ContainerError::FieldOutOfBounds { .. })));
    }
}
