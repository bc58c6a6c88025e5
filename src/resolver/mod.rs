//! Convention resolver
//!
//! Maps an environment transform file (for example `web.staging-HLG.config`)
//! to the base configuration file it targets and to a display label for its
//! environment. Everything here is a pure function of file names plus, for
//! base lookup, the contents of the transform's directory.

use crate::error::{ErrorCode, TransformError};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Recognized base file names, probed in this order.
pub const BASE_FILE_CANDIDATES: [&str; 4] = ["web.config", "Web.config", "app.config", "App.config"];

/// Extension shared by base and transform files.
pub const CONFIG_EXTENSION: &str = ".config";

/// Label returned when the environment cannot be parsed from a file name.
pub const UNKNOWN_ENVIRONMENT: &str = "UNKNOWN";

/// Environment marker recognized out of the box by the eligibility check.
pub const DEFAULT_ENVIRONMENT_MARKER: &str = "pestana";

/// Short uppercase environment name, for display only
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvironmentLabel(String);

impl EnvironmentLabel {
    pub fn unknown() -> Self {
        Self(UNKNOWN_ENVIRONMENT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_ENVIRONMENT
    }
}

impl fmt::Display for EnvironmentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A transform file paired with the base file it applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTransform {
    pub transform: PathBuf,
    pub base: PathBuf,
    pub environment: EnvironmentLabel,
}

/// Resolves transform files against the naming convention
#[derive(Debug, Clone)]
pub struct ConventionResolver {
    environment_markers: Vec<String>,
}

impl Default for ConventionResolver {
    fn default() -> Self {
        Self::new(vec![DEFAULT_ENVIRONMENT_MARKER.to_string()])
    }
}

impl ConventionResolver {
    pub fn new(environment_markers: Vec<String>) -> Self {
        Self {
            environment_markers: environment_markers
                .into_iter()
                .map(|m| m.to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Find the base file living next to `transform_path`.
    ///
    /// Candidates are probed in [`BASE_FILE_CANDIDATES`] order and the first
    /// existing one wins. `None` is an expected answer, not an error.
    pub fn find_base_file(&self, transform_path: &Path) -> Option<PathBuf> {
        let directory = containing_directory(transform_path);

        let found = BASE_FILE_CANDIDATES
            .iter()
            .map(|name| directory.join(name))
            .find(|candidate| {
                trace!("Probing base file candidate {}", candidate.display());
                candidate.is_file()
            });

        match &found {
            Some(base) => debug!("Resolved base file {}", base.display()),
            None => debug!("No base file found in {}", directory.display()),
        }
        found
    }

    /// Parse the environment label out of a transform file name.
    ///
    /// `web.staging-HLG.config` yields `HLG`. Names without a hyphen yield
    /// [`UNKNOWN_ENVIRONMENT`].
    pub fn environment_label(transform_path: &Path) -> EnvironmentLabel {
        let stem = transform_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        match stem.rsplit_once('-') {
            Some((_, environment)) => EnvironmentLabel(environment.to_uppercase()),
            None => EnvironmentLabel::unknown(),
        }
    }

    /// Whether a file should be offered as a transform at all.
    ///
    /// Advisory only: the name must end in `.config`, must not be one of the
    /// canonical base names, and must either carry an environment marker or
    /// have more than one dot-separated extension segment.
    pub fn is_transform_candidate(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name() else {
            return false;
        };
        let file_name = file_name.to_string_lossy().to_lowercase();

        if !file_name.ends_with(CONFIG_EXTENSION) {
            return false;
        }
        if file_name == "web.config" || file_name == "app.config" {
            return false;
        }

        let has_marker = self
            .environment_markers
            .iter()
            .any(|marker| file_name.contains(marker.as_str()));
        let segments = file_name.split('.').count();

        has_marker || segments > 2
    }

    /// Resolve a transform file into its base file and environment label
    pub fn resolve(&self, transform_path: &Path) -> Result<ResolvedTransform, TransformError> {
        if !transform_path.is_file() {
            return Err(TransformError::resolve_with_code(
                ErrorCode::RESOLVE_TRANSFORM_MISSING,
                format!("Transform file not found: {}", transform_path.display()),
                Some(transform_path.to_path_buf()),
            ));
        }

        let base = self.find_base_file(transform_path).ok_or_else(|| {
            TransformError::resolve_with_code(
                ErrorCode::RESOLVE_BASE_NOT_FOUND,
                format!(
                    "Base file (web.config or app.config) not found in the directory of:\n{}",
                    transform_path.display()
                ),
                Some(transform_path.to_path_buf()),
            )
        })?;

        Ok(ResolvedTransform {
            transform: transform_path.to_path_buf(),
            base,
            environment: Self::environment_label(transform_path),
        })
    }

    /// List transform candidates directly inside `directory`, sorted by name
    pub fn list_candidates(&self, directory: &Path) -> Result<Vec<PathBuf>, TransformError> {
        let mut candidates = Vec::new();

        for entry in WalkDir::new(directory).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| {
                TransformError::resolve_with_code(
                    ErrorCode::RESOLVE_GENERIC,
                    format!("Failed to read directory {}", directory.display()),
                    Some(directory.to_path_buf()),
                )
                .with_source(e)
            })?;

            if entry.file_type().is_file() && self.is_transform_candidate(entry.path()) {
                candidates.push(entry.into_path());
            }
        }

        candidates.sort();
        Ok(candidates)
    }
}

fn containing_directory(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
