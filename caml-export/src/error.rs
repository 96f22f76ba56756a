//! Export error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::packager::ExportPhase;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Errors that abort an export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The asset store holds no files for the project.
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    /// The bundled container template is missing.
    #[error("Template not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    /// Creating or unpacking an archive failed.
    #[error("Archive failed: {0}")]
    ArchiveFailed(String),

    /// Any lower-level I/O failure.
    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    /// The zip codec rejected its input.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Serializing a document failed.
    #[error("Document error: {0}")]
    Core(#[from] caml_core::CamlError),

    /// The export state machine was driven out of order.
    #[error("Invalid export phase transition: {from} -> {to}")]
    InvalidPhase {
        /// Current phase.
        from: ExportPhase,
        /// Requested phase.
        to: ExportPhase,
    },
}

impl From<walkdir::Error> for ExportError {
    fn from(err: walkdir::Error) -> Self {
        match err.into_io_error() {
            Some(io) => Self::FileSystem(io),
            None => Self::ArchiveFailed("directory walk hit a filesystem loop".to_string()),
        }
    }
}
