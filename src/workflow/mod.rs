//! Apply and restore workflows
//!
//! Glue between the user and the core: resolve the base file, ask before
//! overwriting it, run the safe applier and report exactly one message per
//! terminal outcome. Dependencies are passed in explicitly.

pub mod reload;

pub use reload::{CommandReload, NoReload, ReloadHook};

use std::path::Path;
use tracing::{debug, info};

use crate::apply::{
    restore_from_backup, ApplyLock, ApplyOutcome, RollbackStatus, SafeTransformApplier,
};
use crate::engine::TransformEngine;
use crate::error::TransformError;
use crate::interaction::UserInteraction;
use crate::resolver::ConventionResolver;

/// How a workflow run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Read-only commands (resolve, list) that finished
    Completed,
    Applied,
    Restored,
    Declined,
    TransformMissing,
    NotEligible,
    BaseNotFound,
    Rejected,
    Failed,
}

impl CommandStatus {
    /// Process exit code for the CLI
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Completed | Self::Applied | Self::Restored | Self::Declined => 0,
            Self::Failed => 1,
            Self::TransformMissing | Self::NotEligible | Self::BaseNotFound => 2,
            Self::Rejected => 3,
        }
    }
}

/// Flags controlling confirmation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfirmOptions {
    /// Skip the overwrite prompt
    pub assume_yes: bool,
    /// Apply even when the file does not look like a transform
    pub force: bool,
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn describe_rollback(base: &Path, backup: Option<&Path>, rollback: &RollbackStatus) -> String {
    let base_name = display_name(base);
    match rollback {
        RollbackStatus::Restored => format!("{base_name} was restored from the backup."),
        RollbackStatus::NotAttempted => format!("{base_name} was not restored from the backup."),
        RollbackStatus::RestoreFailed(e) => match backup {
            Some(backup) => format!(
                "Restoring {base_name} from the backup FAILED: {e}\nRecover it manually from {}.",
                backup.display()
            ),
            None => format!("Restoring {base_name} from the backup FAILED: {e}"),
        },
    }
}

/// Resolve → confirm → apply → report
pub struct ApplyTransformCommand<'a, E> {
    resolver: &'a ConventionResolver,
    applier: &'a SafeTransformApplier<E>,
    ui: &'a dyn UserInteraction,
    reload: &'a dyn ReloadHook,
}

impl<'a, E: TransformEngine> ApplyTransformCommand<'a, E> {
    pub fn new(
        resolver: &'a ConventionResolver,
        applier: &'a SafeTransformApplier<E>,
        ui: &'a dyn UserInteraction,
        reload: &'a dyn ReloadHook,
    ) -> Self {
        Self {
            resolver,
            applier,
            ui,
            reload,
        }
    }

    pub fn execute(&self, transform: &Path, options: ConfirmOptions) -> CommandStatus {
        if !transform.is_file() {
            self.ui
                .display_warning(&format!("Transform file not found: {}", transform.display()));
            return CommandStatus::TransformMissing;
        }

        if !self.resolver.is_transform_candidate(transform) && !options.force {
            self.ui.display_warning(&format!(
                "{} does not look like an environment transform file (use --force to apply it anyway).",
                display_name(transform)
            ));
            return CommandStatus::NotEligible;
        }

        let Some(base) = self.resolver.find_base_file(transform) else {
            self.ui.display_warning(&format!(
                "Base file (web.config or app.config) not found in the same directory as:\n{}",
                transform.display()
            ));
            return CommandStatus::BaseNotFound;
        };

        let environment = ConventionResolver::environment_label(transform);
        let base_name = display_name(&base);
        debug!(
            "Resolved {} -> {} (environment {})",
            transform.display(),
            base.display(),
            environment
        );

        if !options.assume_yes {
            let question = format!(
                "Apply the {environment} environment transform?\n\n\
                 Base file: {base_name}\n\
                 Transform: {}\n\n\
                 WARNING: {base_name} will be OVERWRITTEN!\n",
                display_name(transform)
            );
            match self.ui.prompt_yes_no(&question, false) {
                Ok(true) => {}
                Ok(false) => {
                    self.ui
                        .display_info(&format!("Cancelled. {base_name} was not modified."));
                    return CommandStatus::Declined;
                }
                Err(e) => {
                    self.ui.display_error(&format!(
                        "Could not read confirmation ({e}). {base_name} was not modified."
                    ));
                    return CommandStatus::Declined;
                }
            }
        }

        match self.applier.apply(&base, transform) {
            ApplyOutcome::Applied { backup, report } => {
                info!(
                    "Applied {} environment transform ({} change(s))",
                    environment, report.applied
                );
                self.ui.display_success(&format!(
                    "Transform applied successfully!\n\n\
                     Environment: {environment}\n\
                     Updated file: {base_name}\n\n\
                     Backup saved to: {}",
                    display_name(&backup)
                ));
                self.reload.reload(&base);
                CommandStatus::Applied
            }
            ApplyOutcome::TransformRejected {
                backup, rollback, ..
            } => {
                let message = format!(
                    "The {environment} transform did not match anything in {base_name}; nothing was applied.\n{}",
                    describe_rollback(&base, Some(backup.as_path()), &rollback)
                );
                if matches!(rollback, RollbackStatus::RestoreFailed(_)) {
                    self.ui.display_error(&message);
                } else {
                    self.ui.display_warning(&message);
                }
                CommandStatus::Rejected
            }
            ApplyOutcome::Failed {
                reason,
                backup,
                rollback,
            } => {
                let rollback_text = match (&rollback, &backup) {
                    (RollbackStatus::NotAttempted, None) => {
                        format!("{base_name} was not modified.")
                    }
                    _ => describe_rollback(&base, backup.as_deref(), &rollback),
                };
                let error = TransformError::from(reason);
                self.ui.display_error(&format!(
                    "Error applying transform:\n\n{error}\n\n{rollback_text}"
                ));
                CommandStatus::Failed
            }
        }
    }
}

/// Put `<base>.backup` back over `base` after confirmation
pub struct RestoreCommand<'a> {
    ui: &'a dyn UserInteraction,
    reload: &'a dyn ReloadHook,
    lock_base_file: bool,
}

impl<'a> RestoreCommand<'a> {
    pub fn new(ui: &'a dyn UserInteraction, reload: &'a dyn ReloadHook, lock_base_file: bool) -> Self {
        Self {
            ui,
            reload,
            lock_base_file,
        }
    }

    pub fn execute(&self, base: &Path, options: ConfirmOptions) -> CommandStatus {
        let base_name = display_name(base);

        if !options.assume_yes {
            let question = format!(
                "Restore {base_name} from its backup?\n\nWARNING: {base_name} will be OVERWRITTEN!\n"
            );
            match self.ui.prompt_yes_no(&question, false) {
                Ok(true) => {}
                Ok(false) => {
                    self.ui
                        .display_info(&format!("Cancelled. {base_name} was not modified."));
                    return CommandStatus::Declined;
                }
                Err(e) => {
                    self.ui.display_error(&format!(
                        "Could not read confirmation ({e}). {base_name} was not modified."
                    ));
                    return CommandStatus::Declined;
                }
            }
        }

        let _lock = if self.lock_base_file {
            match ApplyLock::acquire(base) {
                Ok(lock) => Some(lock),
                Err(e) => {
                    self.ui.display_error(&format!("Cannot restore {base_name}: {e}"));
                    return CommandStatus::Failed;
                }
            }
        } else {
            None
        };

        match restore_from_backup(base) {
            Ok(backup) => {
                self.ui.display_success(&format!(
                    "{base_name} was restored from {}.",
                    display_name(&backup)
                ));
                self.reload.reload(base);
                CommandStatus::Restored
            }
            Err(e) => {
                self.ui.display_error(&e.to_string());
                CommandStatus::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::backup_path;
    use crate::testing::{MockUserInteraction, RecordingReload, ScriptedEngine, TestContext};
    use std::fs;

    const ORIGINAL: &str = "<configuration />";

    struct Harness {
        ctx: TestContext,
        resolver: ConventionResolver,
        ui: MockUserInteraction,
        reload: RecordingReload,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                ctx: TestContext::new().unwrap(),
                resolver: ConventionResolver::default(),
                ui: MockUserInteraction::new(),
                reload: RecordingReload::default(),
            }
        }

        fn run(&self, engine: ScriptedEngine, transform: &Path, options: ConfirmOptions) -> CommandStatus {
            let applier = SafeTransformApplier::new(engine);
            ApplyTransformCommand::new(&self.resolver, &applier, &self.ui, &self.reload)
                .execute(transform, options)
        }
    }

    #[test]
    fn test_confirmed_apply_reports_success_and_reloads() {
        let h = Harness::new();
        let base = h.ctx.create_test_file("web.config", ORIGINAL).unwrap();
        let xform = h.ctx.create_test_file("web.staging-HLG.config", "<x />").unwrap();
        h.ui.add_yes_no_response(true);

        let status = h.run(ScriptedEngine::applies("<new />"), &xform, ConfirmOptions::default());
        assert_eq!(status, CommandStatus::Applied);

        let messages = h.ui.get_messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].starts_with("PROMPT: Apply the HLG environment transform?"));
        assert!(messages[0].contains("web.config will be OVERWRITTEN"));
        assert!(messages[1].starts_with("SUCCESS: Transform applied successfully!"));
        assert!(messages[1].contains("Backup saved to: web.config.backup"));
        assert_eq!(h.reload.reloaded(), vec![base]);
    }

    #[test]
    fn test_declined_apply_changes_nothing() {
        let h = Harness::new();
        let base = h.ctx.create_test_file("web.config", ORIGINAL).unwrap();
        let xform = h.ctx.create_test_file("web.staging-HLG.config", "<x />").unwrap();
        h.ui.add_yes_no_response(false);

        let status = h.run(ScriptedEngine::applies("<new />"), &xform, ConfirmOptions::default());
        assert_eq!(status, CommandStatus::Declined);
        assert_eq!(fs::read_to_string(&base).unwrap(), ORIGINAL);
        assert!(!backup_path(&base).exists());
        assert!(h.reload.reloaded().is_empty());
    }

    #[test]
    fn test_missing_base_never_prompts() {
        let h = Harness::new();
        let xform = h.ctx.create_test_file("web.pestana-prd.config", "<x />").unwrap();

        let status = h.run(ScriptedEngine::applies("<new />"), &xform, ConfirmOptions::default());
        assert_eq!(status, CommandStatus::BaseNotFound);

        let messages = h.ui.get_messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("WARN: Base file (web.config or app.config) not found"));
    }

    #[test]
    fn test_not_eligible_without_force() {
        let h = Harness::new();
        h.ctx.create_test_file("web.config", ORIGINAL).unwrap();
        let xform = h.ctx.create_test_file("settings.config", "<x />").unwrap();

        let status = h.run(ScriptedEngine::applies("<new />"), &xform, ConfirmOptions::default());
        assert_eq!(status, CommandStatus::NotEligible);

        let status = h.run(
            ScriptedEngine::applies("<new />"),
            &xform,
            ConfirmOptions {
                assume_yes: true,
                force: true,
            },
        );
        assert_eq!(status, CommandStatus::Applied);
    }

    #[test]
    fn test_failure_message_confirms_restore() {
        let h = Harness::new();
        let base = h.ctx.create_test_file("web.config", ORIGINAL).unwrap();
        let xform = h.ctx.create_test_file("web.staging-HLG.config", "<x />").unwrap();

        let status = h.run(
            ScriptedEngine::corrupts_then_fails("<broken"),
            &xform,
            ConfirmOptions {
                assume_yes: true,
                force: false,
            },
        );
        assert_eq!(status, CommandStatus::Failed);
        assert_eq!(fs::read_to_string(&base).unwrap(), ORIGINAL);

        let messages = h.ui.get_messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("ERROR: Error applying transform:"));
        assert!(messages[0].contains("[E4003] Transform error:"));
        assert!(messages[0].contains("web.config was restored from the backup."));
    }

    #[test]
    fn test_failed_restore_is_a_single_error() {
        let h = Harness::new();
        h.ctx.create_test_file("web.config", ORIGINAL).unwrap();
        let xform = h.ctx.create_test_file("web.staging-HLG.config", "<x />").unwrap();

        let status = h.run(
            ScriptedEngine::corrupts_and_deletes_backup("<broken"),
            &xform,
            ConfirmOptions {
                assume_yes: true,
                force: false,
            },
        );
        assert_eq!(status, CommandStatus::Failed);

        let messages = h.ui.get_messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("ERROR: Error applying transform:"));
        assert!(messages[0].contains("Restoring web.config from the backup FAILED"));
        assert!(messages[0].contains("Recover it manually from"));
        assert!(!messages[0].contains("was restored from the backup"));
        assert!(h.reload.reloaded().is_empty());
    }

    #[test]
    fn test_rejection_message_names_the_gap() {
        let h = Harness::new();
        h.ctx.create_test_file("web.config", ORIGINAL).unwrap();
        let xform = h.ctx.create_test_file("web.staging-HLG.config", "<x />").unwrap();

        let status = h.run(
            ScriptedEngine::corrupts_then_declines(ORIGINAL),
            &xform,
            ConfirmOptions {
                assume_yes: true,
                force: false,
            },
        );
        assert_eq!(status, CommandStatus::Rejected);
        let messages = h.ui.get_messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("WARN: The HLG transform did not match anything"));
        assert!(messages[0].contains("was not restored from the backup"));
    }

    #[test]
    fn test_prompt_error_counts_as_decline() {
        let h = Harness::new();
        h.ctx.create_test_file("web.config", ORIGINAL).unwrap();
        let xform = h.ctx.create_test_file("web.staging-HLG.config", "<x />").unwrap();
        // No scripted answer: the mock prompt errors.
        let status = h.run(ScriptedEngine::applies("<new />"), &xform, ConfirmOptions::default());
        assert_eq!(status, CommandStatus::Declined);
    }

    #[test]
    fn test_restore_command() {
        let h = Harness::new();
        let base = h.ctx.create_test_file("web.config", "changed").unwrap();
        fs::write(backup_path(&base), ORIGINAL).unwrap();
        h.ui.add_yes_no_response(true);

        let status = RestoreCommand::new(&h.ui, &h.reload, true)
            .execute(&base, ConfirmOptions::default());
        assert_eq!(status, CommandStatus::Restored);
        assert_eq!(fs::read_to_string(&base).unwrap(), ORIGINAL);
        assert_eq!(h.reload.reloaded(), vec![base]);
    }

    #[test]
    fn test_restore_command_without_backup() {
        let h = Harness::new();
        let base = h.ctx.create_test_file("web.config", "changed").unwrap();

        let status = RestoreCommand::new(&h.ui, &h.reload, false).execute(
            &base,
            ConfirmOptions {
                assume_yes: true,
                force: false,
            },
        );
        assert_eq!(status, CommandStatus::Failed);
        assert!(h.ui.get_messages()[0].contains("No backup found"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CommandStatus::Applied.exit_code(), 0);
        assert_eq!(CommandStatus::Failed.exit_code(), 1);
        assert_eq!(CommandStatus::BaseNotFound.exit_code(), 2);
        assert_eq!(CommandStatus::Rejected.exit_code(), 3);
    }
}
