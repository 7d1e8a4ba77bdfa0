//! Output rendering.
//!
//! Turns each payload of a block's result into at most one fragment the
//! host document can display. Display data is matched against the
//! configured priority list: the first listed mime type present in the
//! payload decides the fragment, and payloads matching nothing are dropped.

use serde::Serialize;

use crate::document::{CodeBlock, DisplayFlags};
use crate::payload::{BlockResult, DisplayData, Payload, StreamName, mime};

/// Highlighting tag for rendered tracebacks.
pub const TRACEBACK_LEXER: &str = "ipythontb";

/// Renderable content derived from one payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderFragment {
    /// Preformatted text, shown verbatim.
    Literal { text: String, language: Option<String> },
    /// Reference to an extracted image.
    Image { uri: String, mime: String },
    /// Markup passed through untouched.
    Raw { format: String, text: String },
    /// Display math, without surrounding delimiters.
    Math { latex: String },
    /// An interactive widget view.
    WidgetView { spec: serde_json::Value },
    /// Aggregate widget state for the whole document.
    WidgetState { state: serde_json::Value },
}

/// The source listing of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFragment {
    pub text: String,
    /// Highlighting tag reported by the session.
    pub language: Option<String>,
}

/// A block's source and outputs, with its display flags applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedBlock {
    /// `None` when the source is hidden.
    pub source: Option<SourceFragment>,
    /// Empty when outputs are hidden.
    pub outputs: Vec<RenderFragment>,
    pub output_first: bool,
}

/// One displayed part of a [`RenderedBlock`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockPart<'a> {
    Source(&'a SourceFragment),
    Output(&'a RenderFragment),
}

impl RenderedBlock {
    pub fn new(block: &CodeBlock, outputs: Vec<RenderFragment>) -> Self {
        let DisplayFlags {
            hide_source,
            hide_output,
            output_first,
        } = block.flags;
        Self {
            source: (!hide_source).then(|| SourceFragment {
                text: block.source.clone(),
                language: block.language.clone(),
            }),
            outputs: if hide_output { Vec::new() } else { outputs },
            output_first,
        }
    }

    /// Parts in display order.
    pub fn parts(&self) -> Vec<BlockPart<'_>> {
        let source = self.source.iter().map(BlockPart::Source);
        let outputs = self.outputs.iter().map(BlockPart::Output);
        if self.output_first {
            outputs.chain(source).collect()
        } else {
            source.chain(outputs).collect()
        }
    }
}

/// Renders block results against a mime priority list.
#[derive(Debug, Clone)]
pub struct OutputRenderer {
    priority: Vec<String>,
    uri_base: String,
}

impl OutputRenderer {
    /// `uri_base` is the URI of the directory holding extracted artifacts.
    pub fn new(priority: Vec<String>, uri_base: impl Into<String>) -> Self {
        Self {
            priority,
            uri_base: uri_base.into(),
        }
    }

    pub fn priority(&self) -> &[String] {
        &self.priority
    }

    /// Fragments for every renderable payload, in payload order.
    pub fn render(&self, result: &BlockResult) -> Vec<RenderFragment> {
        result.payloads.iter().filter_map(|p| self.render_payload(p)).collect()
    }

    pub fn render_payload(&self, payload: &Payload) -> Option<RenderFragment> {
        match payload {
            Payload::Stream {
                name: StreamName::Stdout,
                text,
            } => Some(RenderFragment::Literal {
                text: text.clone(),
                language: None,
            }),
            Payload::Stream {
                name: StreamName::Stderr,
                ..
            } => None,
            Payload::Error { traceback, .. } => Some(RenderFragment::Literal {
                text: strip_ansi_escapes::strip_str(traceback.join("\n")),
                language: Some(TRACEBACK_LEXER.to_string()),
            }),
            Payload::Display(display) => self.render_display(display),
        }
    }

    /// The mime type display data is rendered as.
    pub fn select<'a>(&'a self, display: &DisplayData) -> Option<&'a str> {
        self.priority
            .iter()
            .map(String::as_str)
            .find(|m| display.data.contains(m))
    }

    fn render_display(&self, display: &DisplayData) -> Option<RenderFragment> {
        let Some(mime_type) = self.select(display) else {
            let types: Vec<_> = display.data.mime_types().collect();
            tracing::debug!("Dropping display data with no prioritized mime type ({:?})", types);
            return None;
        };
        let text = || display.data.text(mime_type).unwrap_or_default();

        match mime_type {
            m if m.starts_with("image/") => match display.artifacts.get(m).and_then(|p| p.file_name()) {
                Some(file_name) => Some(RenderFragment::Image {
                    uri: format!("{}/{}", self.uri_base.trim_end_matches('/'), file_name.to_string_lossy()),
                    mime: m.to_string(),
                }),
                None => {
                    tracing::warn!("No extracted file for {} output; dropping it", m);
                    None
                }
            },
            mime::TEXT_HTML => Some(RenderFragment::Raw {
                format: "html".to_string(),
                text: text(),
            }),
            mime::TEXT_MARKDOWN => Some(RenderFragment::Raw {
                format: "markdown".to_string(),
                text: text(),
            }),
            mime::TEXT_LATEX => Some(RenderFragment::Math {
                latex: strip_math_delimiters(&text()).to_string(),
            }),
            mime::TEXT_PLAIN => Some(RenderFragment::Literal {
                text: text(),
                language: None,
            }),
            mime::WIDGET_VIEW => display
                .data
                .get(mime::WIDGET_VIEW)
                .map(|spec| RenderFragment::WidgetView { spec: spec.clone() }),
            other => {
                tracing::debug!("No fragment kind for {}; dropping output", other);
                None
            }
        }
    }
}

/// `$$x$$`, `$x$` and `\[x\]` all become `x`.
fn strip_math_delimiters(latex: &str) -> &str {
    let trimmed = latex.trim();
    for (open, close) in [("$$", "$$"), ("\\[", "\\]"), ("$", "$")] {
        if let Some(inner) = trimmed
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            return inner.trim();
        }
    }
    trimmed
}
