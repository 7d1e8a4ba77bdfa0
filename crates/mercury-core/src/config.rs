//! Build configuration.
//!
//! Read from `mercury.toml`; every key is optional.
//!
//! ```toml
//! default_kernel = "python3"
//! timeout_secs = 30
//! allow_errors = true
//! data_priority = ["text/html", "image/png", "text/plain"]
//! output_dir = "_build/mercury_execute"
//!
//! [kernels.python3]
//! argv = ["python3", "-u", "/opt/mercury/bridge.py"]
//! language = "python"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::kernel::KernelSpec;
use crate::payload::mime;

/// Conventional config file name.
pub const CONFIG_FILE: &str = "mercury.toml";

/// Mime types in the order they are preferred for rendering.
pub fn default_data_priority() -> Vec<String> {
    [
        mime::WIDGET_VIEW,
        mime::TEXT_HTML,
        mime::IMAGE_SVG,
        mime::IMAGE_PNG,
        mime::IMAGE_JPEG,
        mime::TEXT_LATEX,
        mime::TEXT_PLAIN,
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Options controlling how documents are executed and rendered.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecuteConfig {
    /// Kernel used when a selector names none.
    pub default_kernel: String,
    /// Seconds allowed per block round-trip; negative disables the limit.
    pub timeout_secs: i64,
    /// Keep running a notebook's blocks after one raises.
    pub allow_errors: bool,
    /// Preferred mime types, most preferred first.
    pub data_priority: Vec<String>,
    /// Root for generated notebooks, scripts and images.
    pub output_dir: PathBuf,
    /// Inline kernel specifications, taking precedence over discovered ones.
    pub kernels: BTreeMap<String, KernelSpec>,
}

impl Default for ExecuteConfig {
    fn default() -> Self {
        Self {
            default_kernel: "python3".to_string(),
            timeout_secs: -1,
            allow_errors: true,
            data_priority: default_data_priority(),
            output_dir: PathBuf::from("_build/mercury_execute"),
            kernels: BTreeMap::new(),
        }
    }
}

impl ExecuteConfig {
    /// Load and validate a config file.
    ///
    /// Relative `output_dir` values are resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let mut config = Self::from_toml(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        if config.output_dir.is_relative()
            && let Some(dir) = path.parent()
        {
            config.output_dir = dir.join(&config.output_dir);
        }
        Ok(config)
    }

    /// Parse and validate config text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_kernel.trim().is_empty() {
            return Err(Error::Config("default_kernel must not be empty".to_string()));
        }
        if self.data_priority.is_empty() {
            return Err(Error::Config("data_priority must list at least one mime type".to_string()));
        }
        for (name, spec) in &self.kernels {
            if spec.argv.is_empty() {
                return Err(Error::Config(format!("kernel '{}' has an empty argv", name)));
            }
        }
        Ok(())
    }

    /// Per-block round-trip limit, if any.
    pub fn timeout(&self) -> Option<Duration> {
        u64::try_from(self.timeout_secs).ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecuteConfig::default();
        assert_eq!(config.default_kernel, "python3");
        assert!(config.allow_errors);
        assert_eq!(config.timeout(), None);
        assert_eq!(config.data_priority[0], mime::WIDGET_VIEW);
        assert_eq!(config.data_priority.last().map(String::as_str), Some(mime::TEXT_PLAIN));
    }

    #[test]
    fn test_parse_partial_file() {
        let config = ExecuteConfig::from_toml(
            r#"
            timeout_secs = 30
            allow_errors = false

            [kernels.bash]
            argv = ["bash-kernel", "--stdio"]
            language = "bash"
            "#,
        )
        .unwrap();
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert!(!config.allow_errors);
        assert_eq!(config.default_kernel, "python3");
        assert_eq!(config.kernels["bash"].argv[0], "bash-kernel");
    }

    #[test]
    fn test_zero_timeout_is_a_limit() {
        let config = ExecuteConfig::from_toml("timeout_secs = 0").unwrap();
        assert_eq!(config.timeout(), Some(Duration::ZERO));
    }

    #[test]
    fn test_rejects_empty_priority() {
        let err = ExecuteConfig::from_toml("data_priority = []").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(ExecuteConfig::from_toml("timeout = 5").is_err());
    }

    #[test]
    fn test_load_resolves_output_dir_against_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        std::fs::write(&path, "output_dir = \"out\"").unwrap();

        let config = ExecuteConfig::load(&path).unwrap();
        assert_eq!(config.output_dir, temp.path().join("out"));
    }
}
