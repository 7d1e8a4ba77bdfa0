//! Kernel specifications and their discovery.
//!
//! Kernels are found in `<dir>/<name>/kernel.toml` under each directory of
//! `$MERCURY_KERNEL_PATH`, then under the per-user data directory
//! (`~/.local/share/mercury/kernels` on Linux). Specs given inline in
//! `mercury.toml` override discovered ones of the same name.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::ExecuteConfig;
use crate::error::{Error, Result};

/// Environment variable listing extra kernel directories.
pub const KERNEL_PATH_ENV: &str = "MERCURY_KERNEL_PATH";

/// File describing one kernel inside its directory.
pub const KERNEL_SPEC_FILE: &str = "kernel.toml";

const RESOURCE_DIR_PLACEHOLDER: &str = "{resource_dir}";

/// How to launch one kind of kernel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KernelSpec {
    /// Command line; `{resource_dir}` expands to the spec's directory.
    pub argv: Vec<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Directory the spec was loaded from.
    #[serde(skip)]
    pub resource_dir: Option<PathBuf>,
}

impl KernelSpec {
    /// Load a `kernel.toml`, remembering its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let mut spec: KernelSpec = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        if spec.argv.is_empty() {
            return Err(Error::Config(format!("{}: argv must not be empty", path.display())));
        }
        spec.resource_dir = path.parent().map(Path::to_path_buf);
        Ok(spec)
    }

    /// Command line with placeholders expanded.
    pub fn resolved_argv(&self) -> Vec<String> {
        let dir = self
            .resource_dir
            .as_ref()
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string());
        self.argv
            .iter()
            .map(|arg| arg.replace(RESOURCE_DIR_PLACEHOLDER, &dir))
            .collect()
    }

    pub fn display_name_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.display_name.as_deref().unwrap_or(name)
    }
}

/// Known kernels by name.
#[derive(Debug, Clone, Default)]
pub struct KernelRegistry {
    specs: BTreeMap<String, KernelSpec>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discovered kernels overlaid with the config's inline ones.
    pub fn from_config(config: &ExecuteConfig) -> Self {
        let mut registry = Self::discover(&Self::default_search_path());
        for (name, spec) in &config.kernels {
            registry.insert(name.clone(), spec.clone());
        }
        registry
    }

    /// Directories searched for kernel specs, highest priority first.
    pub fn default_search_path() -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = std::env::var_os(KERNEL_PATH_ENV)
            .map(|paths| std::env::split_paths(&paths).collect())
            .unwrap_or_default();
        if let Some(data) = dirs::data_dir() {
            dirs.push(data.join("mercury").join("kernels"));
        }
        dirs
    }

    /// Scan directories for `<name>/kernel.toml`.
    ///
    /// Earlier directories win. Unreadable or invalid specs are skipped.
    pub fn discover(search_path: &[PathBuf]) -> Self {
        let mut registry = Self::new();
        for dir in search_path {
            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let spec_path = entry.path().join(KERNEL_SPEC_FILE);
                let Some(name) = entry.file_name().to_str().map(String::from) else {
                    continue;
                };
                if registry.specs.contains_key(&name) || !spec_path.is_file() {
                    continue;
                }
                match KernelSpec::load(&spec_path) {
                    Ok(spec) => {
                        tracing::debug!("Found kernel '{}' at {}", name, spec_path.display());
                        registry.specs.insert(name, spec);
                    }
                    Err(e) => tracing::warn!("Ignoring kernel spec {}: {}", spec_path.display(), e),
                }
            }
        }
        registry
    }

    pub fn insert(&mut self, name: impl Into<String>, spec: KernelSpec) {
        self.specs.insert(name.into(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&KernelSpec> {
        self.specs.get(name)
    }

    /// Look up a spec, failing with `KernelNotFound`.
    pub fn resolve(&self, name: &str) -> Result<&KernelSpec> {
        self.get(name).ok_or_else(|| Error::KernelNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
