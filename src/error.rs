//! Error types for the import/export pipeline.

use std::path::PathBuf;

use crate::import::FileKind;

/// Failure of a single analyze, import, export or reset attempt.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("invalid XML: {0}")]
    InvalidXml(String),

    #[error("unrecognized structure")]
    UnrecognizedStructure,

    #[error("{0}")]
    Format(String),

    #[error("{0} import is not implemented yet")]
    NotImplemented(FileKind),

    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("file is not readable: {0}")]
    Unreadable(String),

    #[error("remote write failed: {}", .0.join("; "))]
    RemoteWrite(Vec<String>),

    #[error("another import is already running")]
    Busy,

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ImportError {
    /// Syntax errors in the file itself.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::InvalidJson(_) | Self::InvalidXml(_))
    }

    /// Content that parsed but can't be imported.
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::UnrecognizedStructure | Self::Format(_))
    }
}

/// Local cache write failure. Never fatal: callers log it and carry on.
#[derive(Debug, thiserror::Error)]
pub enum CacheWriteError {
    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write cache file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Illegal transition of the session state machine.
#[derive(Debug, thiserror::Error)]
#[error("cannot {action} while {state}")]
pub struct AuthError {
    pub action: &'static str,
    pub state: &'static str,
}
