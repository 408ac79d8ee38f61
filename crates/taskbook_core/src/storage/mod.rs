//! Artifact blob storage.
//!
//! # Responsibility
//! - Persist uploaded binaries under collision-free opaque names.
//! - Delete and open stored binaries on behalf of the workflow engine.
//!
//! # Invariants
//! - Stored names are `<token>_<sanitized name>`; the token never contains `_`.
//! - A failed save never leaves a partial file behind.
//! - Deleting a missing blob succeeds.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Read;

mod artifact_ref;
mod fs_store;

pub use artifact_ref::{file_extension, sanitize_file_name, ArtifactRef};
pub use fs_store::FsArtifactStore;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    /// No blob exists for the given storage name.
    NotFound(String),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "artifact storage i/o failed: {err}"),
            Self::NotFound(name) => write!(f, "artifact not found: {name}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::NotFound(_) => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Storage contract used by the workflow engine.
pub trait ArtifactStore {
    type Reader: Read + Send + 'static;

    /// Writes `bytes` under a fresh unique name derived from `original_name`.
    fn save(&self, bytes: &[u8], original_name: &str) -> StorageResult<ArtifactRef>;
    /// Removes a stored blob; a missing blob is not an error.
    fn delete(&self, artifact: &ArtifactRef) -> StorageResult<()>;
    /// Opens a stored blob for reading.
    fn open(&self, artifact: &ArtifactRef) -> StorageResult<Self::Reader>;

    /// Human-facing filename for download delivery.
    fn resolve_download_name(&self, artifact: &ArtifactRef) -> String {
        artifact.file_name().to_string()
    }
}
