//! Splicing rendered output back into Markdown.
//!
//! Every directive fence is replaced: `{kernel}` markers by nothing, code
//! blocks by their rendered parts. Download links are pointed at the
//! generated files. Everything else in the document is copied unchanged.

use std::ops::Range;

use mercury_core::payload::mime;
use mercury_core::{BlockPart, DocNode, RenderFragment, RenderedDocument, SourceFragment};
use rustc_hash::FxHashMap;

use crate::error::MarkdownResult;
use crate::parser::{DownloadKind, MarkdownDocument};

struct Edit {
    range: Range<usize>,
    text: String,
}

/// Produce the output document.
///
/// `rendered.blocks` must hold one entry per code block of `doc`.
pub fn splice(doc: &MarkdownDocument, rendered: &RenderedDocument) -> MarkdownResult<String> {
    let mut edits = Vec::with_capacity(doc.directives.len() + doc.links.len());

    let mut blocks = rendered.blocks.iter();
    for directive in &doc.directives {
        let text = match directive.node {
            DocNode::Selector(_) => String::new(),
            DocNode::Block(_) => match blocks.next() {
                Some(block) => {
                    let parts = block
                        .parts()
                        .into_iter()
                        .map(|part| match part {
                            BlockPart::Source(source) => Ok(source_markdown(source)),
                            BlockPart::Output(fragment) => fragment_markdown(fragment),
                        })
                        .collect::<MarkdownResult<Vec<_>>>()?;
                    let mut text = parts.join("\n");
                    if !doc.source[directive.range.clone()].ends_with('\n') {
                        text.truncate(text.trim_end_matches('\n').len());
                    }
                    text
                }
                None => {
                    tracing::warn!("No rendered output for block at line {}", directive.line);
                    doc.source[directive.range.clone()].to_string()
                }
            },
        };
        edits.push(Edit {
            range: directive.range.clone(),
            text,
        });
    }

    let targets: FxHashMap<&str, (&str, &str)> = rendered
        .units
        .iter()
        .map(|u| (u.name.as_str(), (u.archive_uri.as_str(), u.script_uri.as_str())))
        .collect();
    for link in &doc.links {
        match targets.get(link.unit.as_str()) {
            Some((archive, script)) => edits.push(Edit {
                range: link.range.clone(),
                text: match link.kind {
                    DownloadKind::Notebook => archive.to_string(),
                    DownloadKind::Script => script.to_string(),
                },
            }),
            None => tracing::warn!("Download link to unknown notebook '{}' left unchanged", link.unit),
        }
    }

    edits.sort_by_key(|e| e.range.start);
    let mut out = String::with_capacity(doc.source.len());
    let mut cursor = 0;
    for edit in edits {
        out.push_str(&doc.source[cursor..edit.range.start]);
        out.push_str(&edit.text);
        cursor = edit.range.end;
    }
    out.push_str(&doc.source[cursor..]);

    if let Some(state) = &rendered.widget_state {
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&fragment_markdown(state)?);
        out.push('\n');
    }
    Ok(out)
}

fn source_markdown(source: &SourceFragment) -> String {
    fenced(&source.text, source.language.as_deref())
}

/// Markdown for one output fragment.
pub fn fragment_markdown(fragment: &RenderFragment) -> MarkdownResult<String> {
    Ok(match fragment {
        RenderFragment::Literal { text, language } => fenced(text, language.as_deref()),
        RenderFragment::Image { uri, .. } => format!("![]({})\n", uri),
        RenderFragment::Raw { text, .. } => with_newline(text),
        RenderFragment::Math { latex } => format!("$$\n{}\n$$\n", latex),
        RenderFragment::WidgetView { spec } => script_tag(mime::WIDGET_VIEW, &serde_json::to_string(spec)?),
        RenderFragment::WidgetState { state } => script_tag(mime::WIDGET_STATE, &serde_json::to_string(state)?),
    })
}

/// A fenced block whose fence is longer than any backtick run in `text`.
fn fenced(text: &str, language: Option<&str>) -> String {
    let longest = text
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest.max(2) + 1);
    format!("{}{}\n{}{}\n", fence, language.unwrap_or_default(), with_newline(text), fence)
}

fn with_newline(text: &str) -> String {
    if text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{}\n", text)
    }
}

fn script_tag(mime_type: &str, json: &str) -> String {
    // A literal "</" would close the script element early.
    format!(
        "<script type=\"{}\">{}</script>\n",
        mime_type,
        json.replace("</", "<\\/")
    )
}
