//! Single-flight guard keyed by base file path
//!
//! An apply holds `<base>.lock` for its whole duration. The lock file records
//! the holder so that a lock left behind by a dead process can be detected
//! and replaced. A lock file that cannot be read (for example one left empty
//! by a crash between create and write) is treated as held only for
//! [`UNREADABLE_LOCK_GRACE`]; after that it is stale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, warn};

pub const LOCK_SUFFIX: &str = ".lock";

/// How long an unreadable lock file is assumed to belong to a writer that
/// has not finished writing it
pub const UNREADABLE_LOCK_GRACE: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum LockError {
    #[error(
        "{} is being transformed by {holder} (delete {} if no apply is running)",
        base.display(),
        lock.display()
    )]
    Busy {
        base: PathBuf,
        lock: PathBuf,
        holder: String,
    },

    #[error("failed to manage lock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Metadata stored in the lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyLockData {
    pub base: PathBuf,
    pub process_id: u32,
    pub hostname: String,
    pub acquired_at: DateTime<Utc>,
}

impl ApplyLockData {
    fn new(base: &Path) -> Self {
        Self {
            base: base.to_path_buf(),
            process_id: std::process::id(),
            hostname: get_hostname(),
            acquired_at: Utc::now(),
        }
    }

    fn describe(&self) -> String {
        format!(
            "PID {} on {} (acquired {})",
            self.process_id,
            self.hostname,
            self.acquired_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// `web.config` → `web.config.lock`
pub fn lock_path(base: &Path) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

/// RAII guard; the lock file is removed on drop
#[derive(Debug)]
pub struct ApplyLock {
    lock_path: PathBuf,
}

impl ApplyLock {
    pub fn acquire(base: &Path) -> Result<Self, LockError> {
        let lock_path = lock_path(base);
        let io_err = |source| LockError::Io {
            path: lock_path.clone(),
            source,
        };

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(mut file) => {
                let data = ApplyLockData::new(base);
                let written = serde_json::to_string_pretty(&data)
                    .map_err(std::io::Error::other)
                    .and_then(|json| file.write_all(json.as_bytes()));
                if let Err(e) = written {
                    drop(file);
                    if let Err(cleanup) = fs::remove_file(&lock_path) {
                        warn!("Failed to remove partial lock {}: {}", lock_path.display(), cleanup);
                    }
                    return Err(io_err(e));
                }
                debug!("Acquired apply lock {}", lock_path.display());
                Ok(Self { lock_path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&lock_path)
                    .ok()
                    .and_then(|c| serde_json::from_str::<ApplyLockData>(&c).ok());
                let busy = |holder: String| LockError::Busy {
                    base: base.to_path_buf(),
                    lock: lock_path.clone(),
                    holder,
                };

                match holder {
                    Some(data) if is_process_running(data.process_id) => Err(busy(data.describe())),
                    Some(data) => {
                        warn!(
                            "Removing stale lock {} (PID {} no longer running)",
                            lock_path.display(),
                            data.process_id
                        );
                        fs::remove_file(&lock_path).map_err(io_err)?;
                        Self::acquire(base)
                    }
                    None if unreadable_lock_expired(&lock_path) => {
                        warn!(
                            "Removing unreadable lock {} older than {}s",
                            lock_path.display(),
                            UNREADABLE_LOCK_GRACE.as_secs()
                        );
                        fs::remove_file(&lock_path).map_err(io_err)?;
                        Self::acquire(base)
                    }
                    // Possibly a writer that has not finished writing yet.
                    None => Err(busy("an unknown process".to_string())),
                }
            }
            Err(e) => Err(io_err(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ApplyLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_path) {
            warn!("Failed to release lock {}: {}", self.lock_path.display(), e);
        } else {
            debug!("Released apply lock {}", self.lock_path.display());
        }
    }
}

fn unreadable_lock_expired(lock_path: &Path) -> bool {
    fs::metadata(lock_path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age >= UNREADABLE_LOCK_GRACE)
}

/// Check if a process with given PID is running
pub fn is_process_running(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }

    #[cfg(unix)]
    {
        use std::process::Command;

        Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[cfg(windows)]
    {
        use std::process::Command;

        Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", pid), "/NH"])
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .output()
            .ok()
            .and_then(|output| {
                String::from_utf8(output.stdout)
                    .ok()
                    .map(|s| s.contains(&pid.to_string()))
            })
            .unwrap_or(false)
    }

    #[cfg(not(any(unix, windows)))]
    {
        warn!("Process detection not supported on this platform");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("web.config");

        let lock = ApplyLock::acquire(&base).unwrap();
        assert!(lock.path().exists());
        let path = lock.path().to_path_buf();
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_is_busy() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("web.config");

        let _held = ApplyLock::acquire(&base).unwrap();
        let err = ApplyLock::acquire(&base).unwrap_err();
        assert!(matches!(err, LockError::Busy { .. }));
    }

    #[test]
    fn test_stale_lock_is_replaced() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("web.config");
        let stale = ApplyLockData {
            base: base.clone(),
            process_id: 99_999_999,
            hostname: "elsewhere".to_string(),
            acquired_at: Utc::now(),
        };
        fs::write(lock_path(&base), serde_json::to_string(&stale).unwrap()).unwrap();

        let lock = ApplyLock::acquire(&base).unwrap();
        let contents = fs::read_to_string(lock.path()).unwrap();
        let data: ApplyLockData = serde_json::from_str(&contents).unwrap();
        assert_eq!(data.process_id, std::process::id());
    }

    #[test]
    fn test_fresh_unreadable_lock_is_busy_and_names_lock_file() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("web.config");
        fs::write(lock_path(&base), "not json").unwrap();

        let err = ApplyLock::acquire(&base).unwrap_err();
        assert!(matches!(err, LockError::Busy { .. }));
        assert!(err.to_string().contains("web.config.lock"));
    }

    #[test]
    fn test_old_empty_lock_is_replaced() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("web.config");
        let path = lock_path(&base);
        fs::write(&path, "").unwrap();
        let old = SystemTime::now() - UNREADABLE_LOCK_GRACE - Duration::from_secs(5);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(old)
            .unwrap();

        let lock = ApplyLock::acquire(&base).unwrap();
        let data: ApplyLockData =
            serde_json::from_str(&fs::read_to_string(lock.path()).unwrap()).unwrap();
        assert_eq!(data.process_id, std::process::id());
    }
}
