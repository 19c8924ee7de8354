pub mod pid;
pub mod crypto;
pub mod container;
pub mod header;
pub mod trailing;
pub mod drm;
pub mod stripper;
pub mod info;
pub mod batch;

pub use container::{Container, ContainerError};
pub use header::{Encryption, MobiHeader};
pub use pid::{pid_from_serial, Pid, PidError};
pub use stripper::{strip, strip_file, strip_with_candidates, Credential, DrmError, DrmStripper, StripError};
