use super::{get_global_config_dir, Config, ConfigLayer, PROJECT_CONFIG_FILE};
use crate::error::{ErrorCode, TransformError};
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads and merges the configuration layers
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    global_path: Option<PathBuf>,
    project_dir: PathBuf,
    explicit_path: Option<PathBuf>,
    use_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            global_path: get_global_config_dir()
                .ok()
                .map(|dir| dir.join("config.toml")),
            project_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            explicit_path: None,
            use_env: true,
        }
    }

    pub fn with_global_path(mut self, path: Option<PathBuf>) -> Self {
        self.global_path = path;
        self
    }

    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = dir.into();
        self
    }

    /// An explicit file, which must exist
    pub fn with_explicit_path(mut self, path: Option<PathBuf>) -> Self {
        self.explicit_path = path;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    pub fn load(&self) -> Result<Config> {
        let mut config = Config::new();

        if let Some(global) = &self.global_path {
            if global.is_file() {
                config.merge(read_layer(global)?);
            }
        }

        let project = self.project_dir.join(PROJECT_CONFIG_FILE);
        if project.is_file() {
            config.merge(read_layer(&project)?);
        }

        if let Some(explicit) = &self.explicit_path {
            if !explicit.is_file() {
                return Err(TransformError::config_with_code(
                    ErrorCode::CONFIG_NOT_FOUND,
                    format!("Config file not found: {}", explicit.display()),
                )
                .into());
            }
            config.merge(read_layer(explicit)?);
        }

        if self.use_env {
            config.merge_env_vars()?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn read_layer(path: &Path) -> Result<ConfigLayer, TransformError> {
    debug!("Loading config layer {}", path.display());
    let content = fs::read_to_string(path).map_err(|e| {
        TransformError::config_with_code(
            ErrorCode::CONFIG_GENERIC,
            format!("Failed to read config file {}", path.display()),
        )
        .with_source(e)
    })?;
    toml::from_str(&content).map_err(|e| {
        TransformError::config_with_code(
            ErrorCode::CONFIG_PARSE_ERROR,
            format!("Failed to parse config file {}", path.display()),
        )
        .with_source(e)
    })
}
