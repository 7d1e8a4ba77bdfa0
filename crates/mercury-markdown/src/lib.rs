//! Markdown front end for Mercury.
//!
//! Reads a Markdown document, executes its `{execute}` blocks through a
//! [`Pipeline`], and writes the document back with outputs in place.
//!
//! # Workflow
//!
//! ```text
//! guide/intro.md ──parse──> MarkdownDocument ──nodes──> Pipeline::run
//!                                  │                         │
//!                                  └────────── splice <── RenderedDocument
//!                                                │
//!                                                └──> rendered guide/intro.md
//! ```

pub mod error;
pub mod parser;
pub mod splice;

use std::path::{Component, Path};

use mercury_core::{KernelProvider, Pipeline, RenderedDocument};

pub use error::{MarkdownError, MarkdownResult};
pub use parser::{Directive, DownloadKind, DownloadLink, MarkdownDocument, MarkdownParser};
pub use splice::{fragment_markdown, splice};

/// A document after execution.
#[derive(Debug, Clone)]
pub struct ExecutedDocument {
    pub docname: String,
    pub markdown: String,
    pub rendered: RenderedDocument,
}

/// Document name of `path`: its path under `source_root`, `/`-separated,
/// without extension.
pub fn docname_for(path: &Path, source_root: &Path) -> MarkdownResult<String> {
    let outside = || MarkdownError::OutsideSourceRoot {
        path: path.to_path_buf(),
        root: source_root.to_path_buf(),
    };
    let relative = path.strip_prefix(source_root).map_err(|_| outside())?;
    let mut parts: Vec<String> = Vec::new();
    for component in relative.with_extension("").components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return Err(outside()),
        }
    }
    if parts.is_empty() {
        return Err(outside());
    }
    Ok(parts.join("/"))
}

/// Execute `doc` as the document named `docname`.
pub fn execute<P: KernelProvider>(
    pipeline: &mut Pipeline<P>,
    doc: &MarkdownDocument,
    docname: &str,
) -> MarkdownResult<ExecutedDocument> {
    let mut ctx = pipeline.context(docname);
    let rendered = pipeline.run(&mut ctx, doc.nodes())?;
    let markdown = splice(doc, &rendered)?;
    Ok(ExecutedDocument {
        docname: docname.to_string(),
        markdown,
        rendered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docname_for() {
        let root = Path::new("/site/docs");
        assert_eq!(docname_for(Path::new("/site/docs/guide/intro.md"), root).unwrap(), "guide/intro");
        assert_eq!(docname_for(Path::new("/site/docs/index.md"), root).unwrap(), "index");
        assert!(matches!(
            docname_for(Path::new("/elsewhere/a.md"), root),
            Err(MarkdownError::OutsideSourceRoot { .. })
        ));
    }
}
