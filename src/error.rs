//! Typed error taxonomy for the core operations.
//!
//! Validation errors (`InvalidInput`, `InvalidGeometry`) are raised before
//! any store mutation is attempted. Persistence errors mean the transaction
//! was rolled back and no partial write is visible.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("missing or invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid bounding box: {0}")]
    InvalidGeometry(String),

    #[error("source not found: {}", path.display())]
    SourceMissing { path: PathBuf },

    #[error("unsupported format '{extension}' for {operation}")]
    UnsupportedFormat {
        extension: String,
        operation: &'static str,
    },

    #[error("render failed: {reason}")]
    Render { reason: String },

    #[error("render timed out")]
    RenderTimeout,

    #[error("storage operation failed ({context})")]
    Persistence {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("i/o error ({context})")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn input(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    pub fn geometry(message: impl Into<String>) -> Self {
        Error::InvalidGeometry(message.into())
    }

    pub fn render(reason: impl Into<String>) -> Self {
        Error::Render {
            reason: reason.into(),
        }
    }

    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Error::SourceMissing { path: path.into() }
    }

    pub fn unsupported(extension: impl Into<String>, operation: &'static str) -> Self {
        Error::UnsupportedFormat {
            extension: extension.into(),
            operation,
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether this error is caused by operator input rather than a system
    /// failure. User-visible messages are phrased differently for the two.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_) | Error::InvalidGeometry(_) | Error::UnsupportedFormat { .. }
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(source: rusqlite::Error) -> Self {
        Error::Persistence {
            context: "database".to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
