//! Single-slot backup of the base file
//!
//! The backup lives next to the base file as `<name>.backup` and is
//! overwritten on every apply. Copies are checked against a SHA-256 digest
//! of the base file taken just before the copy.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Suffix appended to the base file name to form the backup name.
pub const BACKUP_SUFFIX: &str = ".backup";

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to copy {} to {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} does not match the expected contents (expected sha256 {expected}, found {actual})", path.display())]
    Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

/// Digest of the base file contents at backup time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub sha256: String,
    pub len: u64,
}

/// `web.config` → `web.config.backup`
pub fn backup_path(base: &Path) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// SHA-256 of a file's contents
pub fn hash_file(path: &Path) -> Result<Snapshot, BackupError> {
    let bytes = fs::read(path).map_err(|source| BackupError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(Snapshot {
        sha256: format!("{:x}", hasher.finalize()),
        len: bytes.len() as u64,
    })
}

fn verified_copy(from: &Path, to: &Path, expected: &Snapshot) -> Result<(), BackupError> {
    fs::copy(from, to).map_err(|source| BackupError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })?;

    let actual = hash_file(to)?;
    if actual != *expected {
        return Err(BackupError::Mismatch {
            path: to.to_path_buf(),
            expected: expected.sha256.clone(),
            actual: actual.sha256,
        });
    }
    Ok(())
}

/// Copy `base` over `backup`, replacing any previous backup.
pub fn create_backup(base: &Path, backup: &Path) -> Result<Snapshot, BackupError> {
    let snapshot = hash_file(base)?;
    verified_copy(base, backup, &snapshot)?;
    info!(
        "Backed up {} to {} (sha256 {})",
        base.display(),
        backup.display(),
        snapshot.sha256
    );
    Ok(snapshot)
}

/// Copy `backup` back over `base` and check the result against `expected`.
pub fn restore_backup(backup: &Path, base: &Path, expected: &Snapshot) -> Result<(), BackupError> {
    debug!("Restoring {} from {}", base.display(), backup.display());
    verified_copy(backup, base, expected)?;
    info!("Restored {} from {}", base.display(), backup.display());
    Ok(())
}
