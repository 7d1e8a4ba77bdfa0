//! Kernels command - lists launchable kernels.

use std::path::Path;

use mercury_core::{KernelRegistry, KernelSpec};

use crate::build::{load_config, source_root};
use crate::colors;

pub fn execute(config: Option<&Path>, root: Option<&Path>) -> anyhow::Result<()> {
    let root = source_root(root)?;
    let config = load_config(config, &root)?;
    let registry = KernelRegistry::from_config(&config);

    if registry.is_empty() {
        println!("No kernels found.");
        println!(
            "{}Add a [kernels.<name>] table to mercury.toml or install a kernel.toml under {}{}",
            colors::DIM,
            KernelRegistry::default_search_path()
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            colors::RESET
        );
        return Ok(());
    }

    for name in registry.names() {
        let Some(spec) = registry.get(name) else {
            continue;
        };
        let marker = if name == config.default_kernel { "*" } else { " " };
        let status = if launchable(spec) {
            colors::styled(colors::GREEN, "ok")
        } else {
            colors::styled(colors::YELLOW, "missing")
        };
        println!(
            "{} {}{}{}  {}  {}[{}]{} {}",
            marker,
            colors::BOLD,
            name,
            colors::RESET,
            spec.display_name_or(name),
            colors::DIM,
            spec.resolved_argv().first().map(String::as_str).unwrap_or_default(),
            colors::RESET,
            status
        );
    }
    Ok(())
}

/// Whether the spec's program can be found.
fn launchable(spec: &KernelSpec) -> bool {
    spec.resolved_argv()
        .first()
        .is_some_and(|program| which::which(program).is_ok() || Path::new(program).is_file())
}
