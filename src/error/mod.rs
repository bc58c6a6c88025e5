use std::path::PathBuf;
use thiserror::Error;

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

/// The unified error type surfaced by config-transform operations
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Resolution error: {message}")]
    Resolve {
        code: u16,
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Backup error: {message}")]
    Backup {
        code: u16,
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Transform error: {message}")]
    Engine {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Lock error: {message}")]
    Lock {
        code: u16,
        message: String,
        path: Option<PathBuf>,
    },
}

impl TransformError {
    /// Create a configuration error with specific code
    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a resolution error with specific code and path
    pub fn resolve_with_code(code: u16, message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Resolve {
            code,
            message: message.into(),
            path,
            source: None,
        }
    }

    /// Create a backup error with specific code and path
    pub fn backup_with_code(code: u16, message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Backup {
            code,
            message: message.into(),
            path,
            source: None,
        }
    }

    /// Create an engine error with specific code
    pub fn engine_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Engine {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a lock error with specific code
    pub fn lock_with_code(code: u16, message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Lock {
            code,
            message: message.into(),
            path,
        }
    }

    /// Attach a source error
    pub fn with_source(mut self, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        let boxed = Some(err.into());
        match &mut self {
            Self::Config { source, .. }
            | Self::Resolve { source, .. }
            | Self::Backup { source, .. }
            | Self::Engine { source, .. } => *source = boxed,
            Self::Lock { .. } => {}
        }
        self
    }

    /// Get the numeric error code
    pub fn code(&self) -> u16 {
        match self {
            Self::Config { code, .. }
            | Self::Resolve { code, .. }
            | Self::Backup { code, .. }
            | Self::Engine { code, .. }
            | Self::Lock { code, .. } => *code,
        }
    }

    /// Message suitable for showing to a user without the code prefix
    pub fn user_message(&self) -> String {
        match self {
            Self::Config { message, .. }
            | Self::Resolve { message, .. }
            | Self::Backup { message, .. }
            | Self::Engine { message, .. }
            | Self::Lock { message, .. } => message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code() {
        let err = TransformError::resolve_with_code(
            ErrorCode::RESOLVE_BASE_NOT_FOUND,
            "no base file",
            Some(PathBuf::from("/tmp/web-prd.config")),
        );
        assert_eq!(err.to_string(), "[E2002] Resolution error: no base file");
        assert_eq!(err.code(), ErrorCode::RESOLVE_BASE_NOT_FOUND);
    }

    #[test]
    fn test_with_source_preserves_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = TransformError::backup_with_code(ErrorCode::BACKUP_MISSING, "missing", None)
            .with_source(io);
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("gone"));
        assert_eq!(err.user_message(), "missing");
    }

    #[test]
    fn test_config_error_display() {
        let err = TransformError::config_with_code(
            ErrorCode::CONFIG_NOT_FOUND,
            "Config file not found: x.toml",
        );
        assert_eq!(
            err.to_string(),
            "[E1001] Configuration error: Config file not found: x.toml"
        );
    }
}
