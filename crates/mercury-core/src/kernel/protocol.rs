//! Wire protocol between Mercury and kernel processes.
//!
//! One JSON object per line over the kernel's stdin (requests) and stdout
//! (replies). Every request gets exactly one reply. Execution outputs use the
//! nbformat-4 output shape so existing tooling can produce them directly.
//!
//! ```text
//! → {"type":"execute","code":"x + 1"}
//! ← {"type":"execute_reply","outputs":[{"output_type":"execute_result",...}]}
//! ```

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::payload::Payload;

use super::LanguageInfo;

/// Request sent from Mercury to a kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelRequest {
    /// Liveness check, answered with `Pong`.
    Ping,
    /// Run code in the kernel's persistent namespace.
    Execute { code: String },
    /// Ask for the kernel's language.
    LanguageInfo,
    /// Ask for aggregated widget state.
    WidgetState,
    /// Exit cleanly.
    Shutdown,
}

/// Reply sent from a kernel to Mercury.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelReply {
    Pong,
    ExecuteReply {
        #[serde(default)]
        outputs: Vec<Payload>,
    },
    LanguageInfo { language_info: LanguageInfo },
    WidgetState {
        #[serde(default)]
        state: Option<serde_json::Value>,
    },
    ShuttingDown,
    /// The kernel could not process the request (not an exception in user code).
    Error { message: String },
}

/// Write one request as a JSON line and flush.
pub fn write_message<W: Write>(writer: &mut W, request: &KernelRequest) -> Result<()> {
    let mut line = serde_json::to_vec(request)?;
    line.push(b'\n');
    writer
        .write_all(&line)
        .and_then(|_| writer.flush())
        .map_err(|e| Error::ExecutionFailed(format!("failed to write to kernel: {}", e)))
}

/// Decode one reply line.
pub fn read_message(line: &str) -> Result<KernelReply> {
    serde_json::from_str(line.trim_end()).map_err(|e| {
        Error::ExecutionFailed(format!("malformed kernel reply ({}): {}", e, truncate(line, 200)))
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
