//! Mercury CLI - Execute code blocks in Markdown documents through kernels.

mod build;
mod colors;
mod kernels;
mod progress;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mercury")]
#[command(about = "Execute code blocks in Markdown documents and embed their outputs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute documents and write them with their outputs
    Build {
        /// Markdown documents to execute
        #[arg(required = true)]
        docs: Vec<PathBuf>,

        /// Path to mercury.toml (default: <source-root>/mercury.toml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Root that document names and URIs are relative to (default: current directory)
        #[arg(long)]
        source_root: Option<PathBuf>,

        /// Directory for the executed documents (default: <source-root>/_build/mercury)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Kernel for blocks without a selector
        #[arg(short, long)]
        kernel: Option<String>,

        /// Per-block timeout in seconds; negative disables it
        #[arg(long, allow_negative_numbers = true)]
        timeout: Option<i64>,

        /// Stop a notebook at the first exception
        #[arg(long)]
        strict: bool,
    },

    /// List the kernels that can be launched
    Kernels {
        /// Path to mercury.toml
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Root used to find mercury.toml (default: current directory)
        #[arg(long)]
        source_root: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Core errors carry recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(core_err) = err.downcast_ref::<mercury_core::Error>() {
            anyhow::anyhow!("{}", core_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Build {
            docs,
            config,
            source_root,
            out,
            kernel,
            timeout,
            strict,
        } => {
            build::execute(build::BuildOptions {
                docs,
                config,
                source_root,
                out,
                kernel,
                timeout,
                strict,
            })
            .map_err(format_error)?;
        }

        Commands::Kernels { config, source_root } => {
            kernels::execute(config.as_deref(), source_root.as_deref()).map_err(format_error)?;
        }
    }

    Ok(())
}
