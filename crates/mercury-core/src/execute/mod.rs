//! Execution of notebooks against live sessions.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!     │
//!     ├── KernelProvider::start(kernel)   one fresh session per notebook
//!     │       │
//!     │       └── SessionGuard            shut down on every exit path
//!     │
//!     ├── Session::execute(block)         strictly in block order
//!     │       ├── Ok(payloads)            in-code exceptions are payloads
//!     │       └── Err(..)                 session failure: abort the notebook
//!     │
//!     └── language_info / widget_state    queried once after the last block
//! ```

mod context;
mod orchestrator;

pub use context::{ExecuteOptions, ExecutionCallback};
pub use orchestrator::{Orchestrator, SessionMetadata, UnitExecution, check_kernels};
