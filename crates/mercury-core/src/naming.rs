//! Deterministic notebook naming.
//!
//! Notebook names become file names in the output directory, so they must be
//! unique within a document and identical across rebuilds of the same input.

use rustc_hash::FxHashSet;

use crate::document::ExecutionUnit;
use crate::error::{Error, Result};

/// Infinite sequence `base`, `base_1`, `base_2`, ...
#[derive(Debug, Clone)]
pub struct NameSequence {
    base: String,
    next: usize,
}

impl NameSequence {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            next: 0,
        }
    }

    /// Start over from the unqualified base name.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

impl Iterator for NameSequence {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let name = match self.next {
            0 => self.base.clone(),
            n => format!("{}_{}", self.base, n),
        };
        self.next += 1;
        Some(name)
    }
}

/// Kernel and name resolved for one notebook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitIdentity {
    pub name: String,
    pub kernel: String,
}

/// Per-document state threaded through grouping, naming and execution.
///
/// One context is created for each document and dropped with it; nothing is
/// shared between documents except the read-only configuration.
#[derive(Debug)]
pub struct PipelineContext {
    docname: String,
    default_kernel: String,
    names: NameSequence,
    /// Names already given to notebooks of this document.
    claimed: FxHashSet<String>,
}

impl PipelineContext {
    /// `docname` is the document's path relative to the source root, with
    /// `/` separators and no extension (e.g. `guide/plotting`).
    pub fn new(docname: impl Into<String>, default_kernel: impl Into<String>) -> Self {
        let docname = docname.into();
        let base = docname.rsplit('/').next().unwrap_or(&docname).to_string();
        Self {
            names: NameSequence::new(base),
            claimed: FxHashSet::default(),
            default_kernel: default_kernel.into(),
            docname,
        }
    }

    pub fn docname(&self) -> &str {
        &self.docname
    }

    /// Directory part of the docname, empty for top-level documents.
    pub fn doc_dir(&self) -> &str {
        self.docname.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }

    pub fn default_kernel(&self) -> &str {
        &self.default_kernel
    }

    /// Name and kernel for the next notebook.
    ///
    /// An explicit id is used verbatim and does not advance the generated
    /// sequence; reusing a name already given in this document is an error.
    /// Generated names skip over explicit ids claimed earlier. Call once per
    /// notebook, in document order.
    pub fn resolve(&mut self, unit: &ExecutionUnit) -> Result<UnitIdentity> {
        let name = match &unit.selector.id {
            Some(id) => id.clone(),
            None => {
                let claimed = &self.claimed;
                self.names
                    .find(|name| !claimed.contains(name))
                    .ok_or_else(|| Error::DuplicateUnit(self.docname.clone()))?
            }
        };
        if !self.claimed.insert(name.clone()) {
            return Err(Error::DuplicateUnit(name));
        }
        let kernel = unit
            .selector
            .kernel
            .clone()
            .unwrap_or_else(|| self.default_kernel.clone());
        Ok(UnitIdentity { name, kernel })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{CodeBlock, DocNode, UnitSelector, group_nodes};

    #[test]
    fn test_sequence() {
        let names: Vec<_> = NameSequence::new("doc").take(4).collect();
        assert_eq!(names, ["doc", "doc_1", "doc_2", "doc_3"]);
    }

    #[test]
    fn test_sequence_restarts() {
        let mut seq = NameSequence::new("doc");
        seq.next();
        seq.next();
        seq.reset();
        assert_eq!(seq.next().as_deref(), Some("doc"));
    }

    fn try_resolve_all(docname: &str, nodes: Vec<DocNode>) -> Result<Vec<UnitIdentity>> {
        let mut ctx = PipelineContext::new(docname, "python3");
        group_nodes(nodes).iter().map(|u| ctx.resolve(u)).collect()
    }

    fn resolve_all(docname: &str, nodes: Vec<DocNode>) -> Vec<UnitIdentity> {
        try_resolve_all(docname, nodes).unwrap()
    }

    fn doc() -> Vec<DocNode> {
        vec![
            DocNode::Block(CodeBlock::new("a")),
            DocNode::Selector(UnitSelector::new(Some("julia"), None)),
            DocNode::Block(CodeBlock::new("b")),
            DocNode::Selector(UnitSelector::new(None, Some("demo"))),
            DocNode::Block(CodeBlock::new("c")),
            DocNode::Selector(UnitSelector::default()),
            DocNode::Block(CodeBlock::new("d")),
        ]
    }

    #[test]
    fn test_explicit_ids_do_not_consume_generated_names() {
        let ids = resolve_all("guide/intro", doc());
        let names: Vec<_> = ids.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["intro", "intro_1", "demo", "intro_2"]);
        assert_eq!(ids[1].kernel, "julia");
        assert_eq!(ids[0].kernel, "python3");
    }

    #[test]
    fn test_naming_is_reproducible() {
        assert_eq!(resolve_all("intro", doc()), resolve_all("intro", doc()));
    }

    #[test]
    fn test_explicit_id_colliding_with_generated_name_fails() {
        let nodes = vec![
            DocNode::Block(CodeBlock::new("first")),
            DocNode::Selector(UnitSelector::new(None, Some("doc"))),
            DocNode::Block(CodeBlock::new("second")),
        ];
        let err = try_resolve_all("doc", nodes).unwrap_err();
        assert!(matches!(&err, Error::DuplicateUnit(name) if name == "doc"), "got {:?}", err);
    }

    #[test]
    fn test_repeated_explicit_id_fails() {
        let nodes = vec![
            DocNode::Selector(UnitSelector::new(None, Some("setup"))),
            DocNode::Block(CodeBlock::new("a")),
            DocNode::Selector(UnitSelector::new(None, Some("setup"))),
            DocNode::Block(CodeBlock::new("b")),
        ];
        assert!(matches!(try_resolve_all("doc", nodes), Err(Error::DuplicateUnit(_))));
    }

    #[test]
    fn test_generated_names_skip_claimed_ids() {
        let nodes = vec![
            DocNode::Selector(UnitSelector::new(None, Some("doc"))),
            DocNode::Block(CodeBlock::new("a")),
            DocNode::Selector(UnitSelector::new(None, Some("doc_2"))),
            DocNode::Block(CodeBlock::new("b")),
            DocNode::Selector(UnitSelector::default()),
            DocNode::Block(CodeBlock::new("c")),
            DocNode::Selector(UnitSelector::default()),
            DocNode::Block(CodeBlock::new("d")),
            DocNode::Selector(UnitSelector::default()),
            DocNode::Block(CodeBlock::new("e")),
        ];
        let names: Vec<_> = resolve_all("doc", nodes).into_iter().map(|i| i.name).collect();
        assert_eq!(names, ["doc", "doc_2", "doc_1", "doc_3", "doc_4"]);
    }

    #[test]
    fn test_doc_dir() {
        assert_eq!(PipelineContext::new("a/b/c", "k").doc_dir(), "a/b");
        assert_eq!(PipelineContext::new("c", "k").doc_dir(), "");
    }
}
