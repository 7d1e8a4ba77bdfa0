//! Terminal progress reporting for notebook execution.

use mercury_core::{Error, ExecutionCallback};

use crate::colors;

/// Prints one line per notebook and a mark per block.
#[derive(Debug, Default)]
pub struct ProgressCallback;

impl ExecutionCallback for ProgressCallback {
    fn on_unit_started(&self, unit: &str, kernel: &str, blocks: usize) {
        print!(
            "{}  ▶ {}{}{} {}({}, {} block{}){} ",
            colors::CYAN,
            colors::RESET,
            colors::BOLD,
            unit,
            colors::DIM,
            kernel,
            blocks,
            if blocks == 1 { "" } else { "s" },
            colors::RESET
        );
        colors::flush_stdout();
    }

    fn on_block_started(&self, _unit: &str, _index: usize) {}

    fn on_block_completed(&self, _unit: &str, _index: usize, raised: bool) {
        if raised {
            print!("{}", colors::styled(colors::YELLOW, "!"));
        } else {
            print!("{}", colors::styled(colors::GREEN, "."));
        }
        colors::flush_stdout();
    }

    fn on_block_error(&self, _unit: &str, _index: usize, _error: &Error) {
        println!(" {}", colors::styled(colors::RED, "✗"));
    }

    fn on_unit_completed(&self, _unit: &str) {
        println!(" {}", colors::styled(colors::GREEN, "✓"));
    }
}
