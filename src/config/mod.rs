//! Layered configuration
//!
//! Defaults, then the global `config.toml`, then `.config-transform.toml` in
//! the working directory, then an explicit `--config` file, then
//! `CONFIG_TRANSFORM_*` environment variables. Each layer overrides only the
//! keys it sets.

pub mod loader;

pub use loader::ConfigLoader;

use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::apply::{ApplyOptions, RejectionPolicy};
use crate::error::{ErrorCode, TransformError};
use crate::resolver::{ConventionResolver, DEFAULT_ENVIRONMENT_MARKER};
use crate::workflow::{CommandReload, NoReload, ReloadHook};

/// Project-level config file name, looked up in the working directory
pub const PROJECT_CONFIG_FILE: &str = ".config-transform.toml";

pub const ENV_LOG_LEVEL: &str = "CONFIG_TRANSFORM_LOG_LEVEL";
pub const ENV_REJECTION_POLICY: &str = "CONFIG_TRANSFORM_REJECTION_POLICY";
pub const ENV_LOCK: &str = "CONFIG_TRANSFORM_LOCK";
pub const ENV_RELOAD_COMMAND: &str = "CONFIG_TRANSFORM_RELOAD_COMMAND";

/// Directory holding the global config file
pub fn get_global_config_dir() -> Result<PathBuf> {
    ProjectDirs::from("com", "config-transform", "config-transform")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow!("Could not determine home directory"))
}

/// Effective settings after all layers are merged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub log_level: Option<String>,
    pub environment_markers: Vec<String>,
    pub rejection_policy: RejectionPolicy,
    pub lock_base_file: bool,
    pub reload_command: Option<String>,
}

/// One layer as read from a TOML file; absent keys leave earlier values alone
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub log_level: Option<String>,
    pub environment_markers: Option<Vec<String>>,
    pub rejection_policy: Option<RejectionPolicy>,
    pub lock_base_file: Option<bool>,
    pub reload_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            environment_markers: vec![DEFAULT_ENVIRONMENT_MARKER.to_string()],
            rejection_policy: RejectionPolicy::Keep,
            lock_base_file: true,
            reload_command: None,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn invalid_value(message: impl Into<String>) -> TransformError {
    TransformError::config_with_code(ErrorCode::CONFIG_INVALID_VALUE, message)
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, layer: ConfigLayer) {
        if let Some(level) = layer.log_level {
            self.log_level = Some(level);
        }
        if let Some(markers) = layer.environment_markers {
            self.environment_markers = markers;
        }
        if let Some(policy) = layer.rejection_policy {
            self.rejection_policy = policy;
        }
        if let Some(lock) = layer.lock_base_file {
            self.lock_base_file = lock;
        }
        if let Some(command) = layer.reload_command {
            self.reload_command = Some(command);
        }
    }

    pub fn merge_env_vars(&mut self) -> Result<()> {
        self.merge_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `CONFIG_TRANSFORM_*` overrides from an arbitrary lookup
    pub fn merge_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = Some(level);
        }

        if let Some(policy) = lookup(ENV_REJECTION_POLICY) {
            self.rejection_policy = policy
                .parse()
                .map_err(|e: String| invalid_value(format!("Invalid {ENV_REJECTION_POLICY}: {e}")))?;
        }

        if let Some(lock) = lookup(ENV_LOCK) {
            self.lock_base_file = parse_bool(&lock).ok_or_else(|| {
                invalid_value(format!(
                    "Invalid {ENV_LOCK} value '{lock}' (expected true or false)"
                ))
            })?;
        }

        if let Some(command) = lookup(ENV_RELOAD_COMMAND) {
            self.reload_command = if command.trim().is_empty() {
                None
            } else {
                Some(command)
            };
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.environment_markers.iter().any(|m| m.trim().is_empty()) {
            return Err(invalid_value("environment_markers must not contain empty entries").into());
        }
        if let Some(command) = &self.reload_command {
            CommandReload::parse(command).map_err(|e| {
                invalid_value(format!("Invalid reload_command '{command}'")).with_source(e)
            })?;
        }
        Ok(())
    }

    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            rejection_policy: self.rejection_policy,
            lock_base_file: self.lock_base_file,
        }
    }

    pub fn resolver(&self) -> ConventionResolver {
        ConventionResolver::new(self.environment_markers.clone())
    }

    pub fn reload_hook(&self) -> Result<Box<dyn ReloadHook>> {
        match &self.reload_command {
            Some(command) => Ok(Box::new(CommandReload::parse(command)?)),
            None => Ok(Box::new(NoReload)),
        }
    }
}
