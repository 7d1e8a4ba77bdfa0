//! Core engine for Mercury: executes the code blocks of a document in live
//! kernels and renders what they produce.
//!
//! This crate provides:
//! - Grouping of document nodes into notebooks, one session each
//! - Deterministic notebook and artifact naming
//! - Kernel discovery and process-backed sessions
//! - Sequential execution with guaranteed session teardown
//! - Artifact extraction and nbformat-4 archives
//! - Priority-driven rendering of outputs into fragments

pub mod config;
pub mod document;
pub mod error;
pub mod execute;
pub mod extract;
pub mod kernel;
pub mod naming;
pub mod notebook;
pub mod paths;
pub mod payload;
pub mod pipeline;
pub mod render;
pub mod testing;

pub use config::{CONFIG_FILE, ExecuteConfig};
pub use document::{CodeBlock, DisplayFlags, DocNode, ExecutionUnit, UnitSelector, group_nodes};
pub use error::{Error, Result};
pub use execute::{ExecuteOptions, ExecutionCallback, Orchestrator, SessionMetadata, UnitExecution};
pub use extract::{ArtifactExtractor, UnitArtifacts};
pub use kernel::{KernelProvider, KernelRegistry, KernelSpec, LanguageInfo, ProcessKernelProvider, Session, SessionInfo};
pub use naming::{NameSequence, PipelineContext, UnitIdentity};
pub use paths::OutputDirs;
pub use payload::{ArtifactRecord, BlockResult, DisplayData, MimeBundle, Payload, StreamName};
pub use pipeline::{Pipeline, PipelineState, RenderedDocument, UnitReport};
pub use render::{BlockPart, OutputRenderer, RenderFragment, RenderedBlock, SourceFragment};
