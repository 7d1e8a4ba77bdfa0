//! Artifact extraction.
//!
//! Writes everything a notebook produces to its document's output directory:
//! one file per file-worthy display representation, the notebook archive
//! and the concatenated script. Paths of extracted files are recorded on
//! the payloads so the renderer can reference them.

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::document::CodeBlock;
use crate::error::{Error, Result};
use crate::execute::UnitExecution;
use crate::notebook::JupyterNotebook;
use crate::paths::{OutputDirs, write_atomic};
use crate::payload::{Payload, mime};

/// Archive extension.
pub const NOTEBOOK_EXTENSION: &str = ".ipynb";

/// Files written for one notebook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitArtifacts {
    pub archive: PathBuf,
    pub script: PathBuf,
    /// Extracted display representations, in output order.
    pub files: Vec<PathBuf>,
}

/// File name of the artifact holding payload `index` of notebook `unit`.
///
/// `index` counts every payload of the notebook in output order, so names
/// only change when the notebook's outputs do.
pub fn artifact_name(unit: &str, index: usize, mime_type: &str) -> Option<String> {
    mime::file_extension(mime_type).map(|ext| format!("{}_{}{}", unit, index, ext))
}

/// Writes a notebook's artifacts under one output directory.
#[derive(Debug, Clone)]
pub struct ArtifactExtractor<'a> {
    dirs: &'a OutputDirs,
}

impl<'a> ArtifactExtractor<'a> {
    pub fn new(dirs: &'a OutputDirs) -> Self {
        Self { dirs }
    }

    /// Extract `execution`'s artifacts, recording their paths on its payloads.
    ///
    /// Any failed write aborts the notebook.
    pub fn extract(&self, unit: &str, blocks: &[CodeBlock], execution: &mut UnitExecution) -> Result<UnitArtifacts> {
        self.dirs.create()?;
        let mut artifacts = UnitArtifacts::default();

        let payloads = execution.results.iter_mut().flat_map(|r| r.payloads.iter_mut());
        for (index, payload) in payloads.enumerate() {
            let Payload::Display(display) = payload else {
                continue;
            };
            let file_worthy: Vec<(String, String)> = display
                .data
                .mime_types()
                .filter_map(|m| artifact_name(unit, index, m).map(|name| (m.to_string(), name)))
                .collect();
            for (mime_type, name) in file_worthy {
                let path = self.dirs.file(&name);
                let bytes = decode(&display.data.text(&mime_type).unwrap_or_default(), &mime_type, &path)?;
                write_atomic(&path, &bytes)?;
                tracing::debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
                display.artifacts.insert(mime_type, path.clone());
                artifacts.files.push(path);
            }
        }

        let notebook = JupyterNotebook::from_execution(unit, &execution.metadata, blocks, &execution.results);
        artifacts.archive = self.dirs.file(&format!("{}{}", unit, NOTEBOOK_EXTENSION));
        write_atomic(&artifacts.archive, notebook.to_json()?.as_bytes())?;

        artifacts.script = self
            .dirs
            .file(&format!("{}{}", unit, execution.metadata.language.file_extension));
        write_atomic(&artifacts.script, script(blocks).as_bytes())?;

        tracing::info!(
            "Wrote notebook '{}' ({} artifact file(s)) to {}",
            unit,
            artifacts.files.len(),
            self.dirs.dir.display()
        );
        Ok(artifacts)
    }
}

/// The notebook's sources, separated by one blank line.
pub fn script(blocks: &[CodeBlock]) -> String {
    blocks
        .iter()
        .map(|b| b.source.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn decode(text: &str, mime_type: &str, path: &std::path::Path) -> Result<Vec<u8>> {
    if !mime::is_base64(mime_type) {
        return Ok(text.as_bytes().to_vec());
    }
    // Kernels commonly wrap base64 at 76 columns.
    let compact: String = text.split_whitespace().collect();
    STANDARD.decode(compact).map_err(|e| Error::ArtifactWrite {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })
}
