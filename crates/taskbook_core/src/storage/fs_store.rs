//! Filesystem-backed artifact store.
//!
//! # Invariants
//! - Every blob lives directly under `root`; names never contain separators.
//! - Saves use `create_new`, so two writers can never share one file.

use super::{ArtifactRef, ArtifactStore, StorageError, StorageResult};
use log::{error, info, warn};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

const MAX_SAVE_ATTEMPTS: usize = 3;

/// Stores artifacts as plain files in one uploads directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Opens (and creates if needed) the uploads directory.
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Absolute or root-relative path of a stored blob.
    pub fn path_for(&self, artifact: &ArtifactRef) -> PathBuf {
        self.root.join(artifact.storage_name())
    }

    fn write_new(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let written = file.write_all(bytes).and_then(|()| file.sync_all());
        if let Err(err) = written {
            drop(file);
            let _ = std::fs::remove_file(path);
            return Err(err);
        }
        Ok(())
    }
}

impl ArtifactStore for FsArtifactStore {
    type Reader = File;

    fn save(&self, bytes: &[u8], original_name: &str) -> StorageResult<ArtifactRef> {
        let started_at = Instant::now();
        for _ in 0..MAX_SAVE_ATTEMPTS {
            let artifact = ArtifactRef::generate(original_name);
            let path = self.path_for(&artifact);
            match self.write_new(&path, bytes) {
                Ok(()) => {
                    info!(
                        "event=artifact_save module=storage status=ok bytes={} duration_ms={}",
                        bytes.len(),
                        started_at.elapsed().as_millis()
                    );
                    return Ok(artifact);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    warn!("event=artifact_save module=storage status=retry reason=name_collision");
                }
                Err(err) => {
                    error!(
                        "event=artifact_save module=storage status=error bytes={} error={}",
                        bytes.len(),
                        err
                    );
                    return Err(err.into());
                }
            }
        }

        Err(StorageError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "could not allocate a unique artifact name",
        )))
    }

    fn delete(&self, artifact: &ArtifactRef) -> StorageResult<()> {
        match std::fs::remove_file(self.path_for(artifact)) {
            Ok(()) => {
                info!("event=artifact_delete module=storage status=ok");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("event=artifact_delete module=storage status=ok missing=true");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn open(&self, artifact: &ArtifactRef) -> StorageResult<File> {
        match File::open(self.path_for(artifact)) {
            Ok(file) => Ok(file),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(artifact.storage_name()))
            }
            Err(err) => Err(err.into()),
        }
    }
}
