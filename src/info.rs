//! Read-only inspection of a book, for the `info` command.

use serde::Serialize;

use crate::container::{field, Container, ContainerError};
use crate::drm::{parse_entries, KeyWrapEntry};
use crate::header::{DrmDescriptor, Encryption, MobiHeader};

#[derive(Debug, Clone, Serialize)]
pub struct DrmInfo {
    pub descriptor: DrmDescriptor,
    pub entries:    Vec<KeyWrapEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookInfo {
    pub name:    String,
    pub size:    usize,
    pub records: usize,
    pub header:  MobiHeader,
    /// Present for PC1 books.
    pub drm:     Option<DrmInfo>,
}

impl BookInfo {
    pub fn inspect(data: &[u8]) -> Result<Self, ContainerError> {
        let container = Container::parse(data.to_vec())?;
        let record0 = container.record(0)?;
        let header = MobiHeader::read(record0)?;

        let drm = if header.encryption == Encryption::Pc1 {
            let descriptor = DrmDescriptor::read(record0)?;
            let block = field(record0, descriptor.offset as usize, descriptor.size as usize)?;
            let entries = parse_entries(block, descriptor.count)?;
            Some(DrmInfo { descriptor, entries })
        } else {
            None
        };

        Ok(Self {
            name: container.name(),
            size: container.len(),
            records: container.record_count(),
            header,
            drm,
        })
    }
}
