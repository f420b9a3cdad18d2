//! Fatal failures of a combine run.
//!
//! Everything recoverable (duplicate keys, dropped elements, unresolved
//! references) goes through [`crate::diagnostics`] instead and never shows up
//! here.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CombineError {
    /// A listed source file does not exist.
    #[error("unable to find source file {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input is not well-formed XML.
    #[error("malformed XML in {}({line},{column}): {reason}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        column: usize,
        reason: String,
    },

    #[error("{} has no root element", path.display())]
    NoRootElement { path: PathBuf },

    /// Two inputs bind the same prefix to different namespaces.
    #[error(
        "namespace prefix `{prefix}` is bound to \"{first_uri}\" in {} but to \"{second_uri}\" in {}",
        first_file.display(),
        second_file.display()
    )]
    NamespaceConflict {
        prefix: String,
        first_file: PathBuf,
        first_uri: String,
        second_file: PathBuf,
        second_uri: String,
    },

    #[error("reference cycle between resources: {}", keys.join(", "))]
    ReferenceCycle { keys: Vec<String> },

    #[error("failed to serialize document: {reason}")]
    Serialize { reason: String },

    #[error("error during document saving to {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open lock file {}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another process held the advisory lock for the whole timeout.
    #[error("timed out after {timeout:?} waiting for exclusive access to `{resource}`")]
    LockTimeout { resource: String, timeout: Duration },
}

impl From<quick_xml::Error> for CombineError {
    fn from(e: quick_xml::Error) -> Self {
        CombineError::Serialize {
            reason: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CombineError>;
