//! Error types for the Markdown front end.

use std::path::PathBuf;

/// Result type for Markdown operations.
pub type MarkdownResult<T> = Result<T, MarkdownError>;

/// Errors that can occur while reading, executing or writing a document.
#[derive(Debug, thiserror::Error)]
pub enum MarkdownError {
    /// Failed to read a document or an included source file.
    #[error("Failed to read file {path}: {message}")]
    ReadError { path: PathBuf, message: String },

    /// Failed to write the rendered document.
    #[error("Failed to write file {path}: {message}")]
    WriteError { path: PathBuf, message: String },

    /// Malformed directive.
    #[error("{path}:{line}: {message}")]
    Directive {
        path: String,
        line: usize,
        message: String,
    },

    /// The document is not under the source root.
    #[error("{path} is not inside the source root {root}")]
    OutsideSourceRoot { path: PathBuf, root: PathBuf },

    /// Executing the document failed.
    #[error(transparent)]
    Execution(#[from] mercury_core::Error),

    /// Failed to serialize a widget payload.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl MarkdownError {
    /// Whether the error must stop the whole build rather than one document.
    pub fn is_build_fatal(&self) -> bool {
        matches!(self, MarkdownError::Execution(e) if e.is_build_fatal())
    }
}
