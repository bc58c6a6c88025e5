//! Transform engine contract
//!
//! The safe applier only depends on [`TransformEngine`]. The bundled
//! [`XdtEngine`] implements the XML Document Transform subset used by
//! `web.config`/`app.config` transform files.

pub mod document;
pub mod xdt;

pub use document::{Document, DocumentError, Element, Node};
pub use xdt::{TransformReport, XdtEngine, XDT_NAMESPACE};

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::{ErrorCode, TransformError};

/// Result of a transform run that did not error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    /// At least one directive changed the document; the destination was written
    Applied(TransformReport),
    /// Nothing in the descriptor matched; the destination was not written
    NotApplied(TransformReport),
}

/// Errors reported by a transform engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("input file not found: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("{} is not well-formed XML: {source}", path.display())]
    MalformedDocument {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    #[error("transform {} is malformed: {message}", path.display())]
    MalformedDescriptor { path: PathBuf, message: String },

    #[error("unsupported transform directive '{directive}' on <{element}>")]
    UnsupportedDirective { directive: String, element: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    pub fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the error is a problem with the transform descriptor itself
    /// (as opposed to "nothing matched", which is not an error at all).
    pub fn is_descriptor_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedDescriptor { .. } | Self::UnsupportedDirective { .. }
        )
    }

    pub fn code(&self) -> u16 {
        match self {
            Self::MissingInput { .. } => ErrorCode::ENGINE_MISSING_INPUT,
            Self::MalformedDocument { .. } => ErrorCode::ENGINE_MALFORMED_DOCUMENT,
            Self::MalformedDescriptor { .. } => ErrorCode::ENGINE_MALFORMED_DESCRIPTOR,
            Self::UnsupportedDirective { .. } => ErrorCode::ENGINE_UNSUPPORTED_DIRECTIVE,
            Self::Io { .. } => ErrorCode::ENGINE_IO_ERROR,
        }
    }
}

impl From<EngineError> for TransformError {
    fn from(err: EngineError) -> Self {
        TransformError::engine_with_code(err.code(), err.to_string()).with_source(err)
    }
}

/// A transform engine mutates `source` according to `descriptor` and writes
/// the result to `destination`, which may be the same path as `source`.
pub trait TransformEngine: Send + Sync {
    fn transform(
        &self,
        source: &Path,
        descriptor: &Path,
        destination: &Path,
    ) -> Result<EngineOutcome, EngineError>;
}

impl<T: TransformEngine + ?Sized> TransformEngine for Box<T> {
    fn transform(
        &self,
        source: &Path,
        descriptor: &Path,
        destination: &Path,
    ) -> Result<EngineOutcome, EngineError> {
        (**self).transform(source, descriptor, destination)
    }
}
