//! Error types for the importer module

use crate::error::Error as CrateError;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for import operations
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is neither JSON nor JSON-Lines
    #[error("Unrecognized format in {path}: {message}")]
    Format { path: PathBuf, message: String },

    #[error("Data directory {0} does not exist")]
    MissingDirectory(PathBuf),

    #[error("Report error: {0}")]
    Report(#[from] std::io::Error),
}

impl From<ImportError> for CrateError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Read { source, .. } | ImportError::Report(source) => {
                CrateError::Io(source)
            }
            _ => CrateError::Import(err.to_string()),
        }
    }
}
