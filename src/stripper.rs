//! High-level [`DrmStripper`] API, the main entry point for embedding.
//!
//! ```no_run
//! use mobistrip::stripper::{strip_file, Credential};
//!
//! let pids = Credential::parse_list("DEKL1Y3*7L");
//! strip_file("book.azw", "book.mobi", &pids)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Conversion steps
//! 1. Verify the PID checksum.
//! 2. Parse the record table and the MOBI header in record 0.
//! 3. Encryption type 0: return the input unchanged.  Types other than 2
//!    are refused.
//! 4. Recover the book key from the key-wrap table.
//! 5. Zero the key-wrap table, set the DRM pointer to `0xFFFFFFFF` and the
//!    count/size/flags to 0, clear the encryption type.
//! 6. Decrypt text records `1..=text_records`, leaving trailing entries in
//!    the clear.  Later records (images, indexes) are copied unchanged.
//!
//! The input slice is never modified; a failed conversion produces nothing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, trace};

use crate::container::{field, Container, ContainerError};
use crate::crypto;
use crate::drm::{self, KeySource};
use crate::header::{DrmDescriptor, Encryption, MobiHeader, DRM_DESCRIPTOR_OFFSET, ENCRYPTION_TYPE_OFFSET};
use crate::pid::{self, Pid, PidError};
use crate::trailing::trailing_size;

/// Records between progress messages while decrypting.
const HEARTBEAT_EVERY: usize = 100;

#[derive(Error, Debug)]
pub enum DrmError {
    #[error("Malformed container: {0}")]
    MalformedContainer(#[from] ContainerError),
    #[error("Invalid credential: {0}")]
    InvalidCredential(#[from] PidError),
    #[error("Cannot decode Mobipocket encryption type 1")]
    UnsupportedScheme,
    #[error("Unknown encryption type: {0}")]
    UnknownScheme(u16),
    #[error("No PIDs found in this file")]
    NoKeyMaterial,
    #[error("No key found, the PID may be incorrect")]
    KeyResolutionFailed,
    #[error("No PID or serial supplied")]
    NoCandidates,
}

/// A reader credential as supplied by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Checksummed PID.
    Pid(String),
    /// Device serial, converted to a PID before use.
    Serial(String),
}

impl Credential {
    pub fn to_pid(&self) -> Result<Pid, PidError> {
        match self {
            Credential::Pid(p)    => Pid::parse(p),
            Credential::Serial(s) => Pid::parse(&pid::pid_from_serial(s)?),
        }
    }

    /// Split a comma separated PID list, dropping blanks.
    pub fn parse_list(list: &str) -> Vec<Credential> {
        list.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| Credential::Pid(p.to_owned()))
            .collect()
    }
}

// ── DrmStripper ──────────────────────────────────────────────────────────────

/// One finished conversion.
#[derive(Debug)]
pub struct DrmStripper {
    container:  Container,
    header:     MobiHeader,
    key_source: Option<KeySource>,
}

impl DrmStripper {
    /// Strip `data` using the PID `pid`.
    pub fn new(data: &[u8], pid: &str) -> Result<Self, DrmError> {
        Self::with_pid(data, &Pid::parse(pid)?)
    }

    /// Strip `data` with an already validated PID.
    pub fn with_pid(data: &[u8], pid: &Pid) -> Result<Self, DrmError> {
        let mut container = Container::parse(data.to_vec())?;
        let header = MobiHeader::read(container.record(0)?)?;
        info!(
            version = header.mobi_version,
            length = header.mobi_length,
            extra_data_flags = header.extra_data_flags,
            "MOBI header"
        );

        match header.encryption {
            Encryption::None => {
                info!("book is not encrypted");
                return Ok(Self { container, header, key_source: None });
            }
            Encryption::Legacy     => return Err(DrmError::UnsupportedScheme),
            Encryption::Unknown(n) => return Err(DrmError::UnknownScheme(n)),
            Encryption::Pc1        => {}
        }

        let drm = DrmDescriptor::read(container.record(0)?)?;
        if drm.count == 0 {
            return Err(DrmError::NoKeyMaterial);
        }
        let block = field(container.record(0)?, drm.offset as usize, drm.size as usize)?;
        let entries = drm::parse_entries(block, drm.count)?;
        let key = drm::resolve_key(&entries, pid).ok_or(DrmError::KeyResolutionFailed)?;

        container.patch_record(0, &vec![0u8; drm.size as usize], drm.offset as usize)?;
        container.patch_record(0, &DrmDescriptor::neutralized(), DRM_DESCRIPTOR_OFFSET)?;
        container.patch_record(0, &[0u8; 2], ENCRYPTION_TYPE_OFFSET)?;

        decrypt_text_records(&mut container, &header, &key.key)?;
        Ok(Self { container, header, key_source: Some(key.source) })
    }

    pub fn header(&self) -> &MobiHeader {
        &self.header
    }

    /// `None` when the input was not encrypted.
    pub fn key_source(&self) -> Option<KeySource> {
        self.key_source
    }

    pub fn was_encrypted(&self) -> bool {
        self.key_source.is_some()
    }

    pub fn result(&self) -> &[u8] {
        self.container.as_bytes()
    }

    pub fn into_result(self) -> Vec<u8> {
        self.container.into_bytes()
    }
}

fn decrypt_text_records(
    container: &mut Container,
    header:    &MobiHeader,
    key:       &[u8; crypto::KEY_LEN],
) -> Result<(), ContainerError> {
    let last = header.text_records as usize;
    if last >= container.record_count() {
        return Err(ContainerError::NoSuchRecord { index: last, count: container.record_count() });
    }

    info!(records = last, "decrypting");
    for index in 1..=last {
        let record = container.record(index)?;
        let trailing = trailing_size(record, header.extra_data_flags);
        if trailing > record.len() {
            return Err(ContainerError::TrailingOverflow { index, trailing, len: record.len() });
        }
        trace!(record = index, trailing, "text record");
        let plain = crypto::decrypt(key, &record[..record.len() - trailing]);
        container.patch_record(index, &plain, 0)?;
        if index % HEARTBEAT_EVERY == 0 {
            debug!(record = index, of = last, "decrypting");
        }
    }
    info!("done");
    Ok(())
}

// ── Convenience functions ────────────────────────────────────────────────────

/// Strip `data` with a single PID and return the new file bytes.
pub fn strip(data: &[u8], pid: &str) -> Result<Vec<u8>, DrmError> {
    Ok(DrmStripper::new(data, pid)?.into_result())
}

/// Try each candidate in order; only the last failure is reported.
pub fn strip_with_candidates(data: &[u8], candidates: &[Credential]) -> Result<DrmStripper, DrmError> {
    let mut last_err = DrmError::NoCandidates;
    for (index, candidate) in candidates.iter().enumerate() {
        let attempt = candidate
            .to_pid()
            .map_err(DrmError::from)
            .and_then(|pid| DrmStripper::with_pid(data, &pid));
        match attempt {
            Ok(stripped) => return Ok(stripped),
            Err(e) => {
                debug!(candidate = index, error = %e, "candidate rejected");
                last_err = e;
            }
        }
    }
    Err(last_err)
}

#[derive(Error, Debug)]
pub enum StripError {
    #[error(transparent)]
    Drm(#[from] DrmError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Refusing to overwrite the input file {}", .0.display())]
    SameFile(PathBuf),
}

/// Default output name: the input with its extension replaced by `.mobi`.
pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("mobi")
}

/// Read `input`, strip it, and write `output`.  Nothing is written on error.
pub fn strip_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input:      P,
    output:     Q,
    candidates: &[Credential],
) -> Result<DrmStripper, StripError> {
    let (input, output) = (input.as_ref(), output.as_ref());
    if same_file(input, output) {
        return Err(StripError::SameFile(output.to_owned()));
    }
    let data = fs::read(input)?;
    let stripped = strip_with_candidates(&data, candidates)?;
    fs::write(output, stripped.result())?;
    Ok(stripped)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
