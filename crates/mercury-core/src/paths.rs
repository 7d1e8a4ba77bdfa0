//! Output directory layout.
//!
//! Generated files for a document live under the output root, mirroring the
//! document's directory relative to the source root:
//!
//! ```text
//! _build/mercury_execute/
//! └── guide/              # doc_dir of guide/intro.md
//!     ├── intro.ipynb     # archive
//!     ├── intro.py        # concatenated source
//!     ├── intro_3.png     # extracted artifacts
//!     └── intro_1.ipynb   # second notebook of the same document
//! ```
//!
//! Unit names are unique per document and directories are unique per
//! document path, so no two notebooks ever write the same file.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Where one document's notebooks are written, and how the rendered
/// document refers to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDirs {
    /// Directory receiving every file generated for the document.
    pub dir: PathBuf,
    /// `/`-prefixed URI of `dir` relative to the source root.
    pub uri_base: String,
}

impl OutputDirs {
    /// Compute the layout for a document whose directory, relative to
    /// `source_root`, is `doc_dir`. Nothing is created on disk.
    pub fn for_document(output_root: &Path, source_root: &Path, doc_dir: &str) -> Self {
        let dir = if doc_dir.is_empty() {
            output_root.to_path_buf()
        } else {
            output_root.join(doc_dir)
        };
        let uri_base = uri_relative_to(&dir, source_root);
        Self { dir, uri_base }
    }

    /// Create the directory if needed.
    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|source| Error::ArtifactWrite {
            path: self.dir.clone(),
            source,
        })
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// URI under which the rendered document links to a generated file.
    pub fn uri_for(&self, file_name: &str) -> String {
        if self.uri_base.ends_with('/') {
            format!("{}{}", self.uri_base, file_name)
        } else {
            format!("{}/{}", self.uri_base, file_name)
        }
    }
}

/// Write `contents` to `path` through a temporary file in the same directory,
/// so readers never observe a half-written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let wrap = |source| Error::ArtifactWrite {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(wrap)?;
    temp.write_all(contents).map_err(wrap)?;
    temp.persist(path).map_err(|e| wrap(e.error))?;
    Ok(())
}

/// `/` followed by the path of `target` relative to `base`, with `/` separators.
fn uri_relative_to(target: &Path, base: &Path) -> String {
    let target = absolute(target);
    let base = absolute(base);

    let target: Vec<Component> = target.components().collect();
    let base: Vec<Component> = base.components().collect();
    let common = target.iter().zip(&base).take_while(|(a, b)| a == b).count();

    let parts: Vec<String> = std::iter::repeat_n("..".to_string(), base.len() - common)
        .chain(
            target[common..]
                .iter()
                .map(|c| c.as_os_str().to_string_lossy().into_owned()),
        )
        .collect();
    format!("/{}", parts.join("/"))
}

/// Absolute form of `path` with `.` and `..` folded away lexically.
fn absolute(path: &Path) -> PathBuf {
    let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
