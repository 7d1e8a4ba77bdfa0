//! ANSI styles for build progress, summaries and the kernel listing.

use std::fmt::Display;
use std::io::{self, Write};

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";
pub const RED: &str = "\x1b[31m";

/// `text` wrapped in `style` and a reset.
pub fn styled(style: &str, text: impl Display) -> String {
    format!("{}{}{}", style, text, RESET)
}

/// Per-block progress marks are printed without a newline; make them visible.
#[inline]
pub fn flush_stdout() {
    io::stdout().flush().ok();
}
