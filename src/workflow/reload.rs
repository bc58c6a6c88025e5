//! Post-apply reload hooks
//!
//! After the base file changes, the host may want to reopen it. Reload
//! failures are logged and never change the workflow's outcome.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

/// Something to run once the base file has been rewritten
pub trait ReloadHook: Send + Sync {
    fn reload(&self, path: &Path);
}

/// Does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReload;

impl ReloadHook for NoReload {
    fn reload(&self, _path: &Path) {}
}

/// Runs an external command with the rewritten file appended as the last argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReload {
    program: String,
    args: Vec<String>,
}

impl CommandReload {
    /// Split a shell-style command line such as `code --reuse-window`
    pub fn parse(command_line: &str) -> Result<Self> {
        let mut words = shell_words::split(command_line)
            .with_context(|| format!("Invalid reload command: {command_line}"))?
            .into_iter();
        let program = words
            .next()
            .ok_or_else(|| anyhow!("Reload command is empty"))?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl ReloadHook for CommandReload {
    fn reload(&self, path: &Path) {
        debug!("Running reload command: {} {:?} {}", self.program, self.args, path.display());
        match Command::new(&self.program).args(&self.args).arg(path).status() {
            Ok(status) if status.success() => {}
            Ok(status) => warn!("Reload command {} exited with {}", self.program, status),
            Err(e) => warn!("Could not run reload command {}: {}", self.program, e),
        }
    }
}
