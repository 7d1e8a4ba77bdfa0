//! Kernels: the live, stateful processes that execute code.
//!
//! The orchestrator only sees two seams: a [`KernelProvider`] that starts
//! sessions by kernel name, and the [`Session`] each one returns.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!     │
//!     └── KernelProvider::start("python3")
//!             │
//!             ├── KernelRegistry   (name → KernelSpec: argv, language, env)
//!             │
//!             └── ProcessSession   (child process, JSON lines on stdin/stdout)
//!                     ├── execute       → Vec<Payload>
//!                     ├── language_info → LanguageInfo
//!                     ├── widget_state  → Option<JSON>
//!                     └── shutdown / kill on drop
//! ```

pub mod process;
pub mod protocol;
mod registry;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::payload::Payload;

pub use process::{ProcessKernelProvider, ProcessSession};
pub use registry::{KERNEL_PATH_ENV, KERNEL_SPEC_FILE, KernelRegistry, KernelSpec};

/// Identity of a running session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Kernel name the session was started from.
    pub kernel: String,
    /// Generated id distinguishing this session from others of the same kernel.
    pub instance_id: String,
    pub display_name: String,
    pub language: String,
}

/// Language a session executes, as reported by the kernel itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub name: String,
    /// Extension for scripts in this language, with leading dot.
    pub file_extension: String,
    /// Highlighting tag for source listings.
    #[serde(default)]
    pub pygments_lexer: Option<String>,
    /// Whether the kernel can report interactive widget state.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub widgets: bool,
}

impl LanguageInfo {
    /// Highlighting tag, falling back to the language name.
    pub fn lexer(&self) -> &str {
        self.pygments_lexer.as_deref().unwrap_or(&self.name)
    }
}

/// A live handle to one kernel process.
///
/// Sessions are exclusively owned by one notebook run and never shared.
pub trait Session {
    fn info(&self) -> &SessionInfo;

    /// Run one block and return everything it produced.
    ///
    /// Exceptions in the code come back as [`Payload::Error`]; `Err` means
    /// the session itself failed or the round-trip timed out.
    fn execute(&mut self, code: &str, timeout: Option<Duration>) -> Result<Vec<Payload>>;

    fn language_info(&mut self) -> Result<LanguageInfo>;

    /// Aggregate widget state, if the kernel tracks any.
    fn widget_state(&mut self) -> Result<Option<serde_json::Value>>;

    /// Stop the kernel. Must be safe to call more than once.
    fn shutdown(&mut self) -> Result<()>;
}

/// Starts sessions by kernel name.
pub trait KernelProvider {
    fn has_kernel(&self, name: &str) -> bool;

    /// Names of all kernels this provider can start.
    fn kernel_names(&self) -> Vec<String>;

    /// Start a fresh session.
    ///
    /// Fails with `KernelNotFound` for unknown names and with
    /// `SessionUnavailable` when the kernel cannot be launched.
    fn start(&self, name: &str) -> Result<Box<dyn Session>>;
}

impl<P: KernelProvider + ?Sized> KernelProvider for &P {
    fn has_kernel(&self, name: &str) -> bool {
        (**self).has_kernel(name)
    }

    fn kernel_names(&self) -> Vec<String> {
        (**self).kernel_names()
    }

    fn start(&self, name: &str) -> Result<Box<dyn Session>> {
        (**self).start(name)
    }
}

/// Generate a fresh session instance id.
pub fn new_instance_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
