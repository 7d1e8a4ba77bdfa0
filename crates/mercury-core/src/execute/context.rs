//! Execution options and progress callbacks.

use std::time::Duration;

use crate::config::ExecuteConfig;
use crate::error::Error;

/// Round-trip options for running one notebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Limit for each block's round-trip; `None` waits forever.
    pub timeout: Option<Duration>,
    /// Keep going after a block raises. When false, the remaining blocks of
    /// the notebook are skipped and get empty results.
    pub allow_errors: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            allow_errors: true,
        }
    }
}

impl From<&ExecuteConfig> for ExecuteOptions {
    fn from(config: &ExecuteConfig) -> Self {
        Self {
            timeout: config.timeout(),
            allow_errors: config.allow_errors,
        }
    }
}

/// Callback trait for execution progress reporting.
///
/// Block indices are positions within the notebook, starting at 0.
pub trait ExecutionCallback {
    /// Called when a notebook's session has started.
    fn on_unit_started(&self, _unit: &str, _kernel: &str, _blocks: usize) {}

    /// Called when a block is submitted.
    fn on_block_started(&self, unit: &str, index: usize);

    /// Called when a block finished; `raised` if its code threw.
    fn on_block_completed(&self, unit: &str, index: usize, raised: bool);

    /// Called when the session failed while running a block.
    fn on_block_error(&self, unit: &str, index: usize, error: &Error);

    /// Called after the session of a successful notebook was shut down.
    fn on_unit_completed(&self, _unit: &str) {}
}
