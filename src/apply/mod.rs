//! Safe transform applier
//!
//! Every apply runs the same protocol:
//!
//! 1. Take the single-flight lock for the base file (when enabled).
//! 2. Copy the base file to `<base>.backup` and verify the copy.
//! 3. Run the engine with the base file as both source and destination.
//! 4. On an engine error or panic, copy the backup back over the base file.
//!
//! The backup is left on disk whatever the outcome. A failure at step 2 means
//! the engine never runs.

pub mod backup;
pub mod lock;

pub use backup::{backup_path, BackupError, Snapshot, BACKUP_SUFFIX};
pub use lock::{ApplyLock, LockError};

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Once;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::engine::{EngineError, EngineOutcome, TransformEngine, TransformReport};
use crate::error::{ErrorCode, TransformError};

/// What to do with the base file when the engine declines to apply.
///
/// The engine runs in place, so a declined transform is not guaranteed to
/// leave the base file untouched. `Keep` trusts the engine; `Restore` copies
/// the backup back anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectionPolicy {
    #[default]
    Keep,
    Restore,
}

impl std::str::FromStr for RejectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "restore" => Ok(Self::Restore),
            other => Err(format!(
                "invalid rejection policy '{other}' (expected 'keep' or 'restore')"
            )),
        }
    }
}

/// Why an apply failed
#[derive(Error, Debug)]
pub enum ApplyFailure {
    #[error("another apply holds the lock: {0}")]
    Busy(#[source] LockError),

    #[error("could not create backup: {0}")]
    Backup(#[source] BackupError),

    #[error("{0}")]
    Engine(#[source] EngineError),

    #[error("transform engine panicked: {0}")]
    EnginePanicked(String),
}

impl ApplyFailure {
    pub fn code(&self) -> u16 {
        match self {
            Self::Busy(_) => ErrorCode::LOCK_BUSY,
            Self::Backup(BackupError::Mismatch { .. }) => ErrorCode::BACKUP_VERIFICATION_FAILED,
            Self::Backup(_) => ErrorCode::BACKUP_COPY_FAILED,
            Self::Engine(e) => e.code(),
            Self::EnginePanicked(_) => ErrorCode::ENGINE_PANICKED,
        }
    }
}

impl From<ApplyFailure> for TransformError {
    fn from(failure: ApplyFailure) -> Self {
        let code = failure.code();
        let message = failure.to_string();
        match failure {
            ApplyFailure::Busy(_) => TransformError::lock_with_code(code, message, None),
            ApplyFailure::Backup(e) => {
                TransformError::backup_with_code(code, message, None).with_source(e)
            }
            ApplyFailure::Engine(e) => e.into(),
            ApplyFailure::EnginePanicked(_) => TransformError::engine_with_code(code, message),
        }
    }
}

/// Whether the base file was put back from the backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackStatus {
    /// No restore was needed or attempted
    NotAttempted,
    /// The base file now matches the backup again
    Restored,
    /// The restore itself failed; the base file may be damaged
    RestoreFailed(String),
}

/// Terminal result of [`SafeTransformApplier::apply`]
#[derive(Debug)]
pub enum ApplyOutcome {
    Applied {
        backup: PathBuf,
        report: TransformReport,
    },
    TransformRejected {
        backup: PathBuf,
        report: TransformReport,
        rollback: RollbackStatus,
    },
    Failed {
        reason: ApplyFailure,
        backup: Option<PathBuf>,
        rollback: RollbackStatus,
    },
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn rollback(&self) -> &RollbackStatus {
        match self {
            Self::Applied { .. } => &RollbackStatus::NotAttempted,
            Self::TransformRejected { rollback, .. } | Self::Failed { rollback, .. } => rollback,
        }
    }
}

/// Applier settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOptions {
    pub rejection_policy: RejectionPolicy,
    pub lock_base_file: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            rejection_policy: RejectionPolicy::Keep,
            lock_base_file: true,
        }
    }
}

/// Runs a [`TransformEngine`] under the backup-and-rollback protocol
pub struct SafeTransformApplier<E> {
    engine: E,
    options: ApplyOptions,
}

impl<E: TransformEngine> SafeTransformApplier<E> {
    pub fn new(engine: E) -> Self {
        Self::with_options(engine, ApplyOptions::default())
    }

    pub fn with_options(engine: E, options: ApplyOptions) -> Self {
        Self { engine, options }
    }

    pub fn options(&self) -> &ApplyOptions {
        &self.options
    }

    /// Apply `transform` onto `base` in place.
    ///
    /// The caller must already hold the user's confirmation to overwrite
    /// `base`. Never returns an error: every failure ends up in
    /// [`ApplyOutcome::Failed`].
    pub fn apply(&self, base: &Path, transform: &Path) -> ApplyOutcome {
        let _lock = if self.options.lock_base_file {
            match ApplyLock::acquire(base) {
                Ok(lock) => Some(lock),
                Err(e) => {
                    warn!("Refusing to apply: {}", e);
                    return ApplyOutcome::Failed {
                        reason: ApplyFailure::Busy(e),
                        backup: None,
                        rollback: RollbackStatus::NotAttempted,
                    };
                }
            }
        } else {
            None
        };

        let backup = backup_path(base);
        let snapshot = match backup::create_backup(base, &backup) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Backup of {} failed: {}", base.display(), e);
                return ApplyOutcome::Failed {
                    reason: ApplyFailure::Backup(e),
                    backup: None,
                    rollback: RollbackStatus::NotAttempted,
                };
            }
        };

        debug!(
            "Running transform {} on {}",
            transform.display(),
            base.display()
        );
        install_engine_panic_hook();
        IN_ENGINE.with(|flag| flag.set(true));
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.engine.transform(base, transform, base)
        }));
        IN_ENGINE.with(|flag| flag.set(false));

        match result {
            Ok(Ok(EngineOutcome::Applied(report))) => {
                info!(
                    "Applied {} to {} ({} change(s))",
                    transform.display(),
                    base.display(),
                    report.applied
                );
                ApplyOutcome::Applied { backup, report }
            }
            Ok(Ok(EngineOutcome::NotApplied(report))) => {
                let rollback = match self.options.rejection_policy {
                    RejectionPolicy::Keep => {
                        warn!(
                            "Transform {} was not applied; {} left as the engine left it",
                            transform.display(),
                            base.display()
                        );
                        RollbackStatus::NotAttempted
                    }
                    RejectionPolicy::Restore => self.restore(&backup, base, &snapshot),
                };
                ApplyOutcome::TransformRejected {
                    backup,
                    report,
                    rollback,
                }
            }
            Ok(Err(e)) => {
                error!("Transform {} failed: {}", transform.display(), e);
                let rollback = self.restore(&backup, base, &snapshot);
                ApplyOutcome::Failed {
                    reason: ApplyFailure::Engine(e),
                    backup: Some(backup),
                    rollback,
                }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Transform engine panicked: {}", message);
                let rollback = self.restore(&backup, base, &snapshot);
                ApplyOutcome::Failed {
                    reason: ApplyFailure::EnginePanicked(message),
                    backup: Some(backup),
                    rollback,
                }
            }
        }
    }

    fn restore(&self, backup: &Path, base: &Path, snapshot: &Snapshot) -> RollbackStatus {
        match backup::restore_backup(backup, base, snapshot) {
            Ok(()) => RollbackStatus::Restored,
            Err(e) => {
                error!("Rollback of {} failed: {}", base.display(), e);
                RollbackStatus::RestoreFailed(e.to_string())
            }
        }
    }
}

thread_local! {
    static IN_ENGINE: Cell<bool> = const { Cell::new(false) };
}

/// Panics raised inside an engine call go to the debug log instead of
/// stderr; the outcome already reports them. Other panics reach the
/// previous hook unchanged.
fn install_engine_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if IN_ENGINE.with(Cell::get) {
                debug!("Transform engine panicked: {}", info);
            } else {
                previous(info);
            }
        }));
    });
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Copy `<base>.backup` back over `base` without an apply in progress.
pub fn restore_from_backup(base: &Path) -> Result<PathBuf, TransformError> {
    let backup = backup_path(base);
    if !backup.is_file() {
        return Err(TransformError::backup_with_code(
            ErrorCode::BACKUP_MISSING,
            format!("No backup found at {}", backup.display()),
            Some(backup),
        ));
    }

    let snapshot = backup::hash_file(&backup).map_err(|e| {
        TransformError::backup_with_code(
            ErrorCode::RESTORE_FAILED,
            format!("Could not read backup {}", backup.display()),
            Some(backup.clone()),
        )
        .with_source(e)
    })?;
    backup::restore_backup(&backup, base, &snapshot).map_err(|e| {
        TransformError::backup_with_code(
            ErrorCode::RESTORE_FAILED,
            format!("Could not restore {}", base.display()),
            Some(base.to_path_buf()),
        )
        .with_source(e)
    })?;
    Ok(backup)
}
