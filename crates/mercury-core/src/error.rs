//! Error types for mercury-core.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for mercury-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in mercury-core.
///
/// Exceptions raised by user code inside a block are not errors at this
/// level: they are captured as [`Payload::Error`](crate::payload::Payload)
/// in the block's result. Everything here aborts at least the current
/// notebook.
#[derive(Debug, Error)]
pub enum Error {
    /// No kernel specification is registered under this name.
    #[error("no kernel named '{0}' is registered")]
    KernelNotFound(String),

    /// Two notebooks of one document would share a name, and so their files.
    #[error("notebook name '{0}' is used more than once in this document")]
    DuplicateUnit(String),

    /// The kernel is known but could not be located or started.
    #[error("kernel '{kernel}' is unavailable: {message}")]
    SessionUnavailable { kernel: String, message: String },

    /// The session collapsed while starting, executing or shutting down.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// A round-trip to the session exceeded the configured timeout.
    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    /// Persisting a generated artifact failed.
    #[error("failed to write {path}: {source}")]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration or kernel specification.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A failure attributed to one notebook (and optionally one of its blocks).
    #[error("notebook '{unit}'{}: {source}", block.map(|b| format!(" (block {})", b + 1)).unwrap_or_default())]
    Unit {
        unit: String,
        block: Option<usize>,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attribute this error to a notebook and, if known, the block being run.
    ///
    /// Errors that already carry a notebook are returned unchanged.
    pub fn in_unit(self, unit: &str, block: Option<usize>) -> Self {
        match self {
            Error::Unit { .. } => self,
            other => Error::Unit {
                unit: unit.to_string(),
                block,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, skipping notebook attribution.
    pub fn root(&self) -> &Error {
        match self {
            Error::Unit { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the error must stop the whole build rather than one document.
    pub fn is_build_fatal(&self) -> bool {
        matches!(self.root(), Error::KernelNotFound(_) | Error::Config(_))
    }

    /// Render the error together with a recovery hint, when one applies.
    pub fn with_hint(&self) -> String {
        let hint = match self.root() {
            Error::KernelNotFound(_) => {
                Some("run `mercury kernels` to list available kernels, or add a [kernels.<name>] table to mercury.toml")
            }
            Error::SessionUnavailable { .. } => {
                Some("check that the kernel's argv[0] is installed and on PATH")
            }
            Error::DuplicateUnit(_) => Some("give each {kernel} selector in the document a distinct :id:"),
            Error::Timeout(_) => Some("raise `timeout_secs` in mercury.toml, or set it to -1"),
            _ => None,
        };
        match hint {
            Some(hint) => format!("{}\n  hint: {}", self, hint),
            None => self.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
