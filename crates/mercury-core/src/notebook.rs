//! Jupyter notebook (.ipynb) archives of executed notebooks.
//!
//! The archive holds every block's source and outputs, plus the session's
//! kernel and language metadata, so a reader can re-open the notebook in
//! any nbformat-4 tool. Artifact paths recorded by the extractor travel in
//! each output's `metadata.filenames`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::document::CodeBlock;
use crate::error::{Error, Result};
use crate::execute::SessionMetadata;
use crate::kernel::LanguageInfo;
use crate::payload::{BlockResult, Payload, mime};

/// A Jupyter notebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JupyterNotebook {
    pub metadata: NotebookMetadata,

    /// Format version (always 4)
    pub nbformat: u32,

    /// Minor format version
    pub nbformat_minor: u32,

    pub cells: Vec<JupyterCell>,
}

/// Notebook-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookMetadata {
    pub kernelspec: KernelSpecMetadata,

    pub language_info: LanguageInfo,

    /// Aggregate widget state, under the widget-state mime type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widgets: Option<serde_json::Map<String, serde_json::Value>>,
}

/// The `kernelspec` block of notebook metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelSpecMetadata {
    pub display_name: String,
    pub language: String,
    pub name: String,
}

/// One code cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JupyterCell {
    /// Always `"code"`.
    pub cell_type: String,

    pub id: String,

    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Cell source, split into lines that keep their newline.
    pub source: Vec<String>,

    pub outputs: Vec<Payload>,

    pub execution_count: Option<u32>,
}

impl JupyterNotebook {
    /// Build the archive for one executed notebook.
    ///
    /// `blocks` and `results` are matched by position.
    pub fn from_execution(
        unit: &str,
        metadata: &SessionMetadata,
        blocks: &[CodeBlock],
        results: &[BlockResult],
    ) -> Self {
        let cells = blocks
            .iter()
            .zip(results)
            .enumerate()
            .map(|(i, (block, result))| JupyterCell {
                cell_type: "code".to_string(),
                id: format!("{}-{}", unit, i),
                metadata: serde_json::Map::new(),
                source: block.source.split_inclusive('\n').map(String::from).collect(),
                outputs: result.payloads.clone(),
                execution_count: Some(i as u32 + 1),
            })
            .collect();

        let widgets = metadata.widget_state.as_ref().map(|state| {
            let mut map = serde_json::Map::new();
            map.insert(mime::WIDGET_STATE.to_string(), state.clone());
            map
        });

        Self {
            metadata: NotebookMetadata {
                kernelspec: KernelSpecMetadata {
                    display_name: metadata.session.display_name.clone(),
                    language: metadata.language.name.clone(),
                    name: metadata.session.kernel.clone(),
                },
                language_info: metadata.language.clone(),
                widgets,
            },
            nbformat: 4,
            nbformat_minor: 5,
            cells,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a notebook from a file.
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Serialization(format!("{}: {}", path.display(), e)))
    }

    /// Cell sources joined back into whole blocks.
    pub fn sources(&self) -> impl Iterator<Item = String> + '_ {
        self.cells.iter().map(|cell| cell.source.concat())
    }
}
