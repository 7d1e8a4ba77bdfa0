//! Parser for executable Markdown documents.
//!
//! Two fenced-block directives drive execution:
//!
//! ````markdown
//! ```{kernel} python3
//! :id: setup
//! ```
//!
//! ```{execute}
//! :hide-code:
//! x = 1
//! ```
//!
//! ```{execute} snippets/plot.py
//! ```
//! ````
//!
//! `{kernel}` starts a new notebook (kernel name and `:id:` both optional);
//! `{execute}` is a code block, optionally loaded from a file next to the
//! document. Links to `download:notebook/<name>` and `download:script/<name>`
//! are collected so they can be pointed at the generated files.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use mercury_core::{CodeBlock, DisplayFlags, DocNode, UnitSelector};
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::error::{MarkdownError, MarkdownResult};

const KERNEL_DIRECTIVE: &str = "{kernel}";
const EXECUTE_DIRECTIVE: &str = "{execute}";
const DOWNLOAD_SCHEME: &str = "download:";

/// A directive fence and the node it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Byte range of the whole fenced block.
    pub range: Range<usize>,
    /// 1-based line of the opening fence.
    pub line: usize,
    pub node: DocNode,
}

/// Which generated file a download link refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    Notebook,
    Script,
}

/// A `download:` link destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    /// Byte range of the destination text.
    pub range: Range<usize>,
    pub kind: DownloadKind,
    pub unit: String,
}

/// A parsed document.
#[derive(Debug, Clone)]
pub struct MarkdownDocument {
    pub source: String,
    /// Where the document was read from, if anywhere.
    pub path: Option<PathBuf>,
    /// Directives in document order.
    pub directives: Vec<Directive>,
    pub links: Vec<DownloadLink>,
}

impl MarkdownDocument {
    /// Read and parse a document.
    pub fn read(path: impl AsRef<Path>) -> MarkdownResult<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|e| MarkdownError::ReadError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        MarkdownParser::new(Some(path)).parse(source)
    }

    /// Parse a document with no backing file; includes resolve against the
    /// working directory.
    pub fn parse_str(source: impl Into<String>) -> MarkdownResult<Self> {
        MarkdownParser::new(None).parse(source.into())
    }

    /// The nodes to execute, in document order.
    pub fn nodes(&self) -> Vec<DocNode> {
        self.directives.iter().map(|d| d.node.clone()).collect()
    }

    pub fn block_count(&self) -> usize {
        self.directives
            .iter()
            .filter(|d| matches!(d.node, DocNode::Block(_)))
            .count()
    }
}

/// Parser bound to one document location.
pub struct MarkdownParser<'a> {
    path: Option<&'a Path>,
}

impl<'a> MarkdownParser<'a> {
    pub fn new(path: Option<&'a Path>) -> Self {
        Self { path }
    }

    pub fn parse(&self, source: String) -> MarkdownResult<MarkdownDocument> {
        let mut directives = Vec::new();
        let mut links = Vec::new();
        let mut open: Option<(String, Range<usize>)> = None;
        let mut body = String::new();

        let options = Options::ENABLE_TABLES | Options::ENABLE_FOOTNOTES | Options::ENABLE_STRIKETHROUGH;
        for (event, range) in Parser::new_ext(&source, options).into_offset_iter() {
            match event {
                Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                    let info = info.trim();
                    if info.starts_with(KERNEL_DIRECTIVE) || info.starts_with(EXECUTE_DIRECTIVE) {
                        open = Some((info.to_string(), range));
                        body.clear();
                    }
                }
                Event::Text(text) if open.is_some() => body.push_str(&text),
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((info, range)) = open.take() {
                        let line = line_of(&source, range.start);
                        let node = self.directive(&info, &body, line)?;
                        directives.push(Directive { range, line, node });
                    }
                }
                Event::Start(Tag::Link { dest_url, .. }) if dest_url.starts_with(DOWNLOAD_SCHEME) => {
                    let line = line_of(&source, range.start);
                    match download_link(&source, range, &dest_url) {
                        Some(link) => links.push(link),
                        None => tracing::warn!(
                            "{}:{}: cannot rewrite download link '{}'",
                            self.display_path(),
                            line,
                            dest_url
                        ),
                    }
                }
                _ => {}
            }
        }

        Ok(MarkdownDocument {
            source,
            path: self.path.map(Path::to_path_buf),
            directives,
            links,
        })
    }

    fn directive(&self, info: &str, body: &str, line: usize) -> MarkdownResult<DocNode> {
        if let Some(kernel) = info.strip_prefix(KERNEL_DIRECTIVE) {
            let mut id = None;
            for (name, value) in Self::options(body).0 {
                match name.as_str() {
                    "id" => id = Some(value),
                    other => return Err(self.error(line, format!("unknown {} option ':{}:'", KERNEL_DIRECTIVE, other))),
                }
            }
            return Ok(DocNode::Selector(UnitSelector::new(Some(kernel), id.as_deref())));
        }

        let argument = info.strip_prefix(EXECUTE_DIRECTIVE).unwrap_or_default().trim();
        let (options, inline) = Self::options(body);
        let mut flags = DisplayFlags::default();
        for (name, _) in options {
            match name.as_str() {
                "hide-code" => flags.hide_source = true,
                "hide-output" => flags.hide_output = true,
                "code-below" => flags.output_first = true,
                other => return Err(self.error(line, format!("unknown {} option ':{}:'", EXECUTE_DIRECTIVE, other))),
            }
        }

        let source = if argument.is_empty() {
            inline.trim_end_matches(['\r', '\n']).to_string()
        } else {
            if !inline.trim().is_empty() {
                tracing::warn!(
                    "{}:{}: ignoring inline content of {} {}",
                    self.display_path(),
                    line,
                    EXECUTE_DIRECTIVE,
                    argument
                );
            }
            self.include(argument)?
        };
        Ok(DocNode::Block(CodeBlock::new(source).with_flags(flags)))
    }

    /// Split leading `:name: value` lines from the rest of a block body.
    ///
    /// The first line that is not shaped like an option starts the source,
    /// so code beginning with a symbol such as `:sym` is left alone.
    fn options(body: &str) -> (Vec<(String, String)>, &str) {
        let mut options = Vec::new();
        let mut rest = body;
        while let Some(line) = rest.split_inclusive('\n').next() {
            let Some((name, value)) = option_line(line.trim_end_matches(['\r', '\n'])) else {
                break;
            };
            options.push((name.to_string(), value.trim().to_string()));
            rest = &rest[line.len()..];
        }
        (options, rest)
    }

    fn include(&self, argument: &str) -> MarkdownResult<String> {
        let path = match self.path.and_then(Path::parent) {
            Some(dir) => dir.join(argument),
            None => PathBuf::from(argument),
        };
        let source = fs::read_to_string(&path).map_err(|e| MarkdownError::ReadError {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok(source.trim_end_matches(['\r', '\n']).to_string())
    }

    fn error(&self, line: usize, message: String) -> MarkdownError {
        MarkdownError::Directive {
            path: self.display_path(),
            line,
            message,
        }
    }

    fn display_path(&self) -> String {
        self.path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<input>".to_string())
    }
}

/// `:name: value` with a name of letters and dashes.
fn option_line(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.strip_prefix(':')?.split_once(':')?;
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphabetic() || c == '-');
    valid.then_some((name, value))
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}

/// Locate the destination text of an inline link inside its source range.
///
/// Reference-style links keep their destination elsewhere and yield `None`.
fn download_link(source: &str, range: Range<usize>, dest: &str) -> Option<DownloadLink> {
    let target = dest.strip_prefix(DOWNLOAD_SCHEME)?;
    let (kind, unit) = match target.split_once('/')? {
        ("notebook", unit) => (DownloadKind::Notebook, unit),
        ("script", unit) => (DownloadKind::Script, unit),
        _ => return None,
    };
    let start = range.start + source.get(range.clone())?.find(dest)?;
    Some(DownloadLink {
        range: start..start + dest.len(),
        kind,
        unit: unit.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(doc: &MarkdownDocument, i: usize) -> &CodeBlock {
        match &doc.directives[i].node {
            DocNode::Block(b) => b,
            other => panic!("expected a code block, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_directives() {
        let source = "# Title\n\n```{kernel} julia\n:id: demo\n```\n\nText.\n\n```{execute}\nx = 1\ny = 2\n```\n\n```python\nnot executed\n```\n";
        let doc = MarkdownDocument::parse_str(source).unwrap();

        assert_eq!(doc.directives.len(), 2);
        assert_eq!(
            doc.directives[0].node,
            DocNode::Selector(UnitSelector::new(Some("julia"), Some("demo")))
        );
        assert_eq!(doc.directives[0].line, 3);
        assert_eq!(block(&doc, 1).source, "x = 1\ny = 2");
        assert_eq!(
            doc.source[doc.directives[1].range.clone()].trim_end(),
            "```{execute}\nx = 1\ny = 2\n```"
        );
    }

    #[test]
    fn test_bare_kernel_directive() {
        let doc = MarkdownDocument::parse_str("```{kernel}\n```\n").unwrap();
        assert_eq!(doc.directives[0].node, DocNode::Selector(UnitSelector::default()));
    }

    #[test]
    fn test_display_options() {
        let doc = MarkdownDocument::parse_str("```{execute}\n:hide-code:\n:code-below:\nprint(1)\n```\n").unwrap();
        let b = block(&doc, 0);
        assert_eq!(b.source, "print(1)");
        assert_eq!(
            b.flags,
            DisplayFlags {
                hide_source: true,
                hide_output: false,
                output_first: true,
            }
        );
    }

    #[test]
    fn test_leading_symbol_is_source_not_option() {
        let doc = MarkdownDocument::parse_str("```{execute}\n:hide-output:\n:sym\nx = :(a + b)\n```\n").unwrap();
        let b = block(&doc, 0);
        assert_eq!(b.source, ":sym\nx = :(a + b)");
        assert!(b.flags.hide_output);

        let doc = MarkdownDocument::parse_str("```{execute}\n:a => :b\n```\n").unwrap();
        assert_eq!(block(&doc, 0).source, ":a => :b");
    }

    #[test]
    fn test_crlf_options() {
        let doc = MarkdownDocument::parse_str("```{execute}\r\n:hide-code:\r\nprint(1)\r\n```\r\n").unwrap();
        let b = block(&doc, 0);
        assert!(b.flags.hide_source);
        assert!(b.source.starts_with("print(1)"), "got {:?}", b.source);
        assert!(!b.source.ends_with(['\r', '\n']));
    }

    #[test]
    fn test_option_line_shape() {
        assert_eq!(option_line(":id: demo"), Some(("id", " demo")));
        assert_eq!(option_line(":hide-code:"), Some(("hide-code", "")));
        assert_eq!(option_line(":sym"), None);
        assert_eq!(option_line("::"), None);
        assert_eq!(option_line(":a b: c"), None);
    }

    #[test]
    fn test_unknown_option_is_an_error() {
        let err = MarkdownDocument::parse_str("\n```{execute}\n:hide-everything:\n```\n").unwrap_err();
        assert!(err.to_string().starts_with("<input>:2:"));
    }

    #[test]
    fn test_include_source_from_file() {
        let temp = tempfile::TempDir::new().expect("Failed to create temp dir");
        fs::create_dir(temp.path().join("snippets")).unwrap();
        fs::write(temp.path().join("snippets/plot.py"), "plot()\n").unwrap();
        let path = temp.path().join("doc.md");
        fs::write(&path, "```{execute} snippets/plot.py\nignored\n```\n").unwrap();

        let doc = MarkdownDocument::read(&path).unwrap();
        assert_eq!(block(&doc, 0).source, "plot()");
    }

    #[test]
    fn test_missing_include_is_a_read_error() {
        let err = MarkdownDocument::parse_str("```{execute} nowhere.py\n```\n").unwrap_err();
        assert!(matches!(err, MarkdownError::ReadError { .. }));
    }

    #[test]
    fn test_download_links() {
        let source = "Get [the notebook](download:notebook/demo) or [script](download:script/demo).\n";
        let doc = MarkdownDocument::parse_str(source).unwrap();

        assert_eq!(doc.links.len(), 2);
        assert_eq!(doc.links[0].kind, DownloadKind::Notebook);
        assert_eq!(doc.links[1].unit, "demo");
        assert_eq!(&source[doc.links[1].range.clone()], "download:script/demo");
    }

    #[test]
    fn test_nodes_in_order() {
        let doc = MarkdownDocument::parse_str("```{execute}\na\n```\n\n```{kernel}\n```\n\n```{execute}\nb\n```\n").unwrap();
        assert_eq!(doc.nodes().len(), 3);
        assert_eq!(doc.block_count(), 2);
    }
}
