//! The per-document pipeline: group, then execute, extract and render each
//! notebook in turn.
//!
//! ```text
//! Idle → Grouping → { ExecutingUnit → ExtractingArtifacts → Rendering }* → Done
//!                              └──────────── any failure ────────────→ Failed
//! ```
//!
//! Kernel names are checked for every notebook before the first one runs, so
//! an unknown kernel fails the document without executing anything.

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::config::ExecuteConfig;
use crate::document::{DocNode, group_nodes};
use crate::error::Result;
use crate::execute::{ExecuteOptions, ExecutionCallback, Orchestrator, check_kernels};
use crate::extract::{ArtifactExtractor, UnitArtifacts};
use crate::kernel::KernelProvider;
use crate::naming::PipelineContext;
use crate::paths::OutputDirs;
use crate::render::{OutputRenderer, RenderFragment, RenderedBlock};

/// Where the pipeline is in processing a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Grouping,
    ExecutingUnit(usize),
    ExtractingArtifacts(usize),
    Rendering(usize),
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Grouping => write!(f, "grouping"),
            PipelineState::ExecutingUnit(i) => write!(f, "executing notebook {}", i),
            PipelineState::ExtractingArtifacts(i) => write!(f, "extracting artifacts of notebook {}", i),
            PipelineState::Rendering(i) => write!(f, "rendering notebook {}", i),
            PipelineState::Done => write!(f, "done"),
            PipelineState::Failed => write!(f, "failed"),
        }
    }
}

/// What was produced for one notebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub name: String,
    pub kernel: String,
    /// Document-wide indices of the notebook's blocks.
    pub blocks: Range<usize>,
    #[serde(skip)]
    pub artifacts: UnitArtifacts,
    /// Link targets for the archive and the script.
    pub archive_uri: String,
    pub script_uri: String,
}

/// A fully executed and rendered document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedDocument {
    /// One entry per code block, in document order.
    pub blocks: Vec<RenderedBlock>,
    /// Aggregate widget state, present when any notebook reported some.
    pub widget_state: Option<RenderFragment>,
    pub units: Vec<UnitReport>,
}

impl RenderedDocument {
    pub fn unit(&self, name: &str) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.name == name)
    }
}

/// Drives documents through execution and rendering.
pub struct Pipeline<P> {
    orchestrator: Orchestrator<P>,
    data_priority: Vec<String>,
    default_kernel: String,
    output_root: PathBuf,
    source_root: PathBuf,
    state: PipelineState,
}

impl<P: KernelProvider> Pipeline<P> {
    /// `source_root` is the directory document names are relative to.
    pub fn new(provider: P, config: &ExecuteConfig, source_root: impl Into<PathBuf>) -> Self {
        Self {
            orchestrator: Orchestrator::new(provider, ExecuteOptions::from(config)),
            data_priority: config.data_priority.clone(),
            default_kernel: config.default_kernel.clone(),
            output_root: config.output_dir.clone(),
            source_root: source_root.into(),
            state: PipelineState::Idle,
        }
    }

    pub fn set_callback(&mut self, callback: impl ExecutionCallback + 'static) {
        self.orchestrator.set_callback(callback);
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// A fresh context for the document named `docname`.
    pub fn context(&self, docname: impl Into<String>) -> PipelineContext {
        PipelineContext::new(docname, self.default_kernel.clone())
    }

    /// Output layout for the document `ctx` describes.
    pub fn output_dirs(&self, ctx: &PipelineContext) -> OutputDirs {
        OutputDirs::for_document(&self.output_root, &self.source_root, ctx.doc_dir())
    }

    /// Run one document.
    ///
    /// The first failure stops the document; notebooks after it are not run.
    pub fn run(&mut self, ctx: &mut PipelineContext, nodes: Vec<DocNode>) -> Result<RenderedDocument> {
        self.state = PipelineState::Idle;
        let result = self.drive(ctx, nodes);
        self.transition(if result.is_ok() {
            PipelineState::Done
        } else {
            PipelineState::Failed
        });
        result
    }

    fn drive(&mut self, ctx: &mut PipelineContext, nodes: Vec<DocNode>) -> Result<RenderedDocument> {
        self.transition(PipelineState::Grouping);
        let units = group_nodes(nodes);
        let identities = units.iter().map(|u| ctx.resolve(u)).collect::<Result<Vec<_>>>()?;

        {
            let mut seen = FxHashSet::default();
            let kernels = identities
                .iter()
                .map(|id| id.kernel.as_str())
                .filter(|k| seen.insert(*k));
            check_kernels(self.orchestrator.provider(), kernels)?;
        }

        tracing::info!("Executing {} ({} notebook(s))", ctx.docname(), units.len());
        let dirs = self.output_dirs(ctx);
        let extractor = ArtifactExtractor::new(&dirs);
        let renderer = OutputRenderer::new(self.data_priority.clone(), dirs.uri_base.clone());

        let mut document = RenderedDocument {
            blocks: Vec::new(),
            widget_state: None,
            units: Vec::with_capacity(units.len()),
        };
        let mut widget_states = Vec::new();

        for (unit, identity) in units.into_iter().zip(identities) {
            self.transition(PipelineState::ExecutingUnit(unit.index));
            let mut execution = self.orchestrator.execute(&identity, &unit.blocks)?;

            let lexer = execution.metadata.language.lexer().to_string();
            let mut blocks = unit.blocks;
            for block in &mut blocks {
                block.language = Some(lexer.clone());
            }

            self.transition(PipelineState::ExtractingArtifacts(unit.index));
            let artifacts = extractor
                .extract(&identity.name, &blocks, &mut execution)
                .map_err(|e| e.in_unit(&identity.name, None))?;

            self.transition(PipelineState::Rendering(unit.index));
            for (block, result) in blocks.iter().zip(&execution.results) {
                document
                    .blocks
                    .push(RenderedBlock::new(block, renderer.render(result)));
            }
            if let Some(state) = execution.metadata.widget_state.take() {
                widget_states.push(state);
            }

            document.units.push(UnitReport {
                archive_uri: dirs.uri_for(&file_name(&artifacts.archive)),
                script_uri: dirs.uri_for(&file_name(&artifacts.script)),
                name: identity.name,
                kernel: identity.kernel,
                blocks: unit.first_block..unit.first_block + blocks.len(),
                artifacts,
            });
        }

        document.widget_state = merge_widget_states(widget_states).map(|state| RenderFragment::WidgetState { state });
        Ok(document)
    }

    fn transition(&mut self, next: PipelineState) {
        tracing::debug!("Pipeline: {} -> {}", self.state, next);
        self.state = next;
    }
}

impl<P> fmt::Debug for Pipeline<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("state", &self.state)
            .field("output_root", &self.output_root)
            .finish_non_exhaustive()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Combine per-notebook widget states into one document-wide state.
///
/// Model maps under `state` are merged; other keys come from the first
/// notebook that set them.
pub fn merge_widget_states(states: Vec<serde_json::Value>) -> Option<serde_json::Value> {
    let mut states = states.into_iter();
    let mut merged = states.next()?;
    for state in states {
        let (Some(target), serde_json::Value::Object(source)) = (merged.as_object_mut(), state) else {
            continue;
        };
        for (key, value) in source {
            match target.get_mut(&key) {
                Some(existing) => {
                    if let (true, Some(models), serde_json::Value::Object(more)) =
                        (key == "state", existing.as_object_mut(), value)
                    {
                        models.extend(more);
                    }
                }
                None => {
                    target.insert(key, value);
                }
            }
        }
    }
    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_widget_states() {
        let merged = merge_widget_states(vec![
            json!({"version_major": 2, "version_minor": 0, "state": {"a": {"x": 1}}}),
            json!({"version_major": 3, "state": {"b": {"y": 2}}}),
        ])
        .unwrap();
        assert_eq!(
            merged,
            json!({"version_major": 2, "version_minor": 0, "state": {"a": {"x": 1}, "b": {"y": 2}}})
        );
    }

    #[test]
    fn test_merge_nothing() {
        assert_eq!(merge_widget_states(Vec::new()), None);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PipelineState::ExecutingUnit(2).to_string(), "executing notebook 2");
    }
}
