//! Document nodes and their partition into notebooks.
//!
//! A host document supplies a flat, ordered stream of [`DocNode`]s: kernel
//! selectors and code blocks. [`group_nodes`] cuts that stream into
//! [`ExecutionUnit`]s, one per live session.

/// How a block's source and outputs are laid out in the rendered document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayFlags {
    /// Omit the source listing.
    pub hide_source: bool,
    /// Omit the outputs.
    pub hide_output: bool,
    /// Place outputs above the source.
    pub output_first: bool,
}

/// A block of source text to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub source: String,
    pub flags: DisplayFlags,
    /// Highlighting tag, known only once the kernel has reported its language.
    pub language: Option<String>,
}

impl CodeBlock {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            flags: DisplayFlags::default(),
            language: None,
        }
    }

    pub fn with_flags(mut self, flags: DisplayFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Selects the kernel for the blocks that follow it.
///
/// Both fields are optional; missing values fall back to the configured
/// default kernel and a name derived from the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitSelector {
    pub kernel: Option<String>,
    pub id: Option<String>,
}

impl UnitSelector {
    pub fn new(kernel: Option<&str>, id: Option<&str>) -> Self {
        let clean = |s: Option<&str>| s.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        Self {
            kernel: clean(kernel),
            id: clean(id),
        }
    }
}

/// One node of the host document, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocNode {
    Selector(UnitSelector),
    Block(CodeBlock),
}

/// Code blocks that share one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionUnit {
    /// Position among the document's notebooks.
    pub index: usize,
    pub selector: UnitSelector,
    pub blocks: Vec<CodeBlock>,
    /// Document-wide index of `blocks[0]`; a notebook's blocks are contiguous.
    pub first_block: usize,
}

impl ExecutionUnit {
    /// Document-wide indices of this notebook's blocks.
    pub fn block_range(&self) -> std::ops::Range<usize> {
        self.first_block..self.first_block + self.blocks.len()
    }
}

/// Split document nodes into notebooks.
///
/// Every selector closes the current notebook and opens a new one. Blocks
/// before the first selector form an implicit notebook with a default
/// selector. A selector followed by no blocks yields nothing.
pub fn group_nodes(nodes: impl IntoIterator<Item = DocNode>) -> Vec<ExecutionUnit> {
    let mut units = Vec::new();
    let mut selector = UnitSelector::default();
    let mut blocks: Vec<CodeBlock> = Vec::new();
    let mut seen_blocks = 0;

    let mut close = |selector: UnitSelector, blocks: Vec<CodeBlock>, seen: usize| {
        if blocks.is_empty() {
            tracing::debug!(?selector, "skipping notebook without code blocks");
            return;
        }
        units.push(ExecutionUnit {
            index: units.len(),
            selector,
            first_block: seen - blocks.len(),
            blocks,
        });
    };

    for node in nodes {
        match node {
            DocNode::Selector(next) => {
                let previous = std::mem::replace(&mut selector, next);
                close(previous, std::mem::take(&mut blocks), seen_blocks);
            }
            DocNode::Block(block) => {
                blocks.push(block);
                seen_blocks += 1;
            }
        }
    }
    close(selector, blocks, seen_blocks);

    units
}
