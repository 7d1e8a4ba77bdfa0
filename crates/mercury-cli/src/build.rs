//! Build command - executes Markdown documents and writes them with outputs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, bail};
use mercury_core::{CONFIG_FILE, ExecuteConfig, KernelRegistry, Pipeline, ProcessKernelProvider};
use mercury_markdown::{MarkdownDocument, MarkdownError, docname_for};

use crate::colors;
use crate::progress::ProgressCallback;

/// Default directory for rendered documents, under the source root.
const DEFAULT_OUT_DIR: &str = "_build/mercury";

/// Options for `mercury build`.
#[derive(Debug, Default)]
pub struct BuildOptions {
    pub docs: Vec<PathBuf>,
    pub config: Option<PathBuf>,
    pub source_root: Option<PathBuf>,
    pub out: Option<PathBuf>,
    pub kernel: Option<String>,
    pub timeout: Option<i64>,
    pub strict: bool,
}

/// Load `mercury.toml`: the explicit path if given, else the one in the
/// source root if present, else defaults.
pub fn load_config(path: Option<&Path>, source_root: &Path) -> anyhow::Result<ExecuteConfig> {
    let implicit = source_root.join(CONFIG_FILE);
    let mut config = match path {
        Some(path) => ExecuteConfig::load(path)?,
        None if implicit.is_file() => ExecuteConfig::load(&implicit)?,
        None => ExecuteConfig::default(),
    };
    if config.output_dir.is_relative() {
        config.output_dir = source_root.join(&config.output_dir);
    }
    Ok(config)
}

/// Source root from the flag, or the working directory.
pub fn source_root(flag: Option<&Path>) -> anyhow::Result<PathBuf> {
    let root = flag.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    std::path::absolute(&root).with_context(|| format!("Invalid source root {}", root.display()))
}

pub fn execute(options: BuildOptions) -> anyhow::Result<()> {
    let source_root = source_root(options.source_root.as_deref())?;
    let mut config = load_config(options.config.as_deref(), &source_root)?;
    if let Some(kernel) = options.kernel {
        config.default_kernel = kernel;
    }
    if let Some(timeout) = options.timeout {
        config.timeout_secs = timeout;
    }
    if options.strict {
        config.allow_errors = false;
    }
    config.validate()?;

    let out_dir = std::path::absolute(
        options
            .out
            .unwrap_or_else(|| source_root.join(DEFAULT_OUT_DIR)),
    )?;

    let registry = KernelRegistry::from_config(&config);
    tracing::debug!("{} kernel(s) available", registry.len());
    let mut pipeline = Pipeline::new(ProcessKernelProvider::new(registry), &config, &source_root);
    pipeline.set_callback(ProgressCallback);

    let start = Instant::now();
    let total = options.docs.len();
    let mut failed = 0;

    for doc in &options.docs {
        let path = std::path::absolute(doc).with_context(|| format!("Invalid path {}", doc.display()))?;
        println!("{}Executing{} {}", colors::BOLD, colors::RESET, doc.display());

        match build_document(&mut pipeline, &path, &source_root, &out_dir) {
            Ok(written) => {
                println!(
                    "{}  Wrote{} {}",
                    colors::DIM,
                    colors::RESET,
                    written.display()
                );
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}error:{} {}: {}", colors::RED, colors::RESET, doc.display(), describe(&e));
                if e.is_build_fatal() {
                    bail!("build aborted");
                }
            }
        }
    }

    let elapsed = start.elapsed();
    if failed > 0 {
        bail!("{} of {} document(s) failed", failed, total);
    }
    println!(
        "\n{}✓ Built {} document(s){} in {:.2?}",
        colors::GREEN,
        total,
        colors::RESET,
        elapsed
    );
    Ok(())
}

fn build_document(
    pipeline: &mut Pipeline<ProcessKernelProvider>,
    path: &Path,
    source_root: &Path,
    out_dir: &Path,
) -> Result<PathBuf, MarkdownError> {
    let docname = docname_for(path, source_root)?;
    let doc = MarkdownDocument::read(path)?;
    let executed = mercury_markdown::execute(pipeline, &doc, &docname)?;

    let target = out_dir.join(format!("{}.md", docname));
    let write_error = |e: std::io::Error| MarkdownError::WriteError {
        path: target.clone(),
        message: e.to_string(),
    };
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(&target, &executed.markdown).map_err(write_error)?;
    Ok(target)
}

fn describe(error: &MarkdownError) -> String {
    match error {
        MarkdownError::Execution(e) => e.with_hint(),
        other => other.to_string(),
    }
}
