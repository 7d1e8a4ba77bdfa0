//! Execution results and the payloads they carry.
//!
//! A [`Payload`] is one typed item produced by running a block: stream text,
//! an error with its traceback, or display data keyed by mime type. On the
//! wire and in notebook archives payloads use the nbformat-4 output shape;
//! in memory they are a closed enum so rendering is a total match.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

/// Well-known mime types.
pub mod mime {
    pub const TEXT_PLAIN: &str = "text/plain";
    pub const TEXT_HTML: &str = "text/html";
    pub const TEXT_LATEX: &str = "text/latex";
    pub const TEXT_MARKDOWN: &str = "text/markdown";
    pub const IMAGE_PNG: &str = "image/png";
    pub const IMAGE_JPEG: &str = "image/jpeg";
    pub const IMAGE_GIF: &str = "image/gif";
    pub const IMAGE_SVG: &str = "image/svg+xml";
    pub const APPLICATION_PDF: &str = "application/pdf";
    pub const WIDGET_VIEW: &str = "application/vnd.jupyter.widget-view+json";
    pub const WIDGET_STATE: &str = "application/vnd.jupyter.widget-state+json";

    /// File extension (with leading dot) for payloads that are written to disk.
    ///
    /// Returns `None` for mime types that stay inline in the rendered document.
    pub fn file_extension(mime: &str) -> Option<&'static str> {
        match mime {
            IMAGE_PNG => Some(".png"),
            IMAGE_JPEG => Some(".jpg"),
            IMAGE_GIF => Some(".gif"),
            IMAGE_SVG => Some(".svg"),
            APPLICATION_PDF => Some(".pdf"),
            _ => None,
        }
    }

    /// Whether the payload is base64-encoded binary data.
    ///
    /// SVG is the one image type transported as plain text.
    pub fn is_base64(mime: &str) -> bool {
        matches!(mime, IMAGE_PNG | IMAGE_JPEG | IMAGE_GIF | APPLICATION_PDF)
    }
}

/// Mapping from mime type to the path an artifact was written under.
pub type ArtifactRecord = BTreeMap<String, PathBuf>;

/// Which output stream a [`Payload::Stream`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
}

/// Display data: several representations of one value, keyed by mime type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MimeBundle(BTreeMap<String, serde_json::Value>);

impl MimeBundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a representation, replacing any existing one of the same type.
    pub fn insert(&mut self, mime: impl Into<String>, value: serde_json::Value) {
        self.0.insert(mime.into(), value);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, mime: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(mime, value.into());
        self
    }

    pub fn contains(&self, mime: &str) -> bool {
        self.0.contains_key(mime)
    }

    pub fn get(&self, mime: &str) -> Option<&serde_json::Value> {
        self.0.get(mime)
    }

    /// Textual content of a representation.
    ///
    /// nbformat allows multi-line strings to be split into a list of lines;
    /// those are joined back. JSON-valued representations are serialized.
    pub fn text(&self, mime: &str) -> Option<String> {
        self.0.get(mime).map(value_to_text)
    }

    pub fn mime_types(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, serde_json::Value)> for MimeBundle {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(lines) if lines.iter().all(|l| l.is_string()) => lines
            .iter()
            .filter_map(|l| l.as_str())
            .collect::<Vec<_>>()
            .concat(),
        other => other.to_string(),
    }
}

/// Display data together with where its file-worthy parts were written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayData {
    pub data: MimeBundle,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Set for `execute_result` outputs, absent for `display_data`.
    pub execution_count: Option<u32>,
    pub artifacts: ArtifactRecord,
}

impl DisplayData {
    pub fn new(data: MimeBundle) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }
}

/// One typed result item produced by executing a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireOutput", into = "WireOutput")]
pub enum Payload {
    /// Text written to stdout or stderr.
    Stream { name: StreamName, text: String },
    /// Rich display data.
    Display(DisplayData),
    /// An exception raised by the block's code.
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
}

impl Payload {
    pub fn stdout(text: impl Into<String>) -> Self {
        Payload::Stream {
            name: StreamName::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Payload::Stream {
            name: StreamName::Stderr,
            text: text.into(),
        }
    }

    pub fn display(data: MimeBundle) -> Self {
        Payload::Display(DisplayData::new(data))
    }

    pub fn error(ename: impl Into<String>, evalue: impl Into<String>, traceback: Vec<String>) -> Self {
        Payload::Error {
            ename: ename.into(),
            evalue: evalue.into(),
            traceback,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Payload::Error { .. })
    }
}

/// Everything one block produced, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockResult {
    pub payloads: Vec<Payload>,
}

impl BlockResult {
    pub fn new(payloads: Vec<Payload>) -> Self {
        Self { payloads }
    }

    /// The result recorded for a block that was never run.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The first in-code exception, if the block raised one.
    pub fn error(&self) -> Option<&Payload> {
        self.payloads.iter().find(|p| p.is_error())
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

/// nbformat-4 output JSON.
#[derive(Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
enum WireOutput {
    Stream {
        name: StreamName,
        #[serde(deserialize_with = "multiline")]
        text: String,
    },
    DisplayData {
        data: MimeBundle,
        #[serde(default)]
        metadata: serde_json::Map<String, serde_json::Value>,
    },
    ExecuteResult {
        #[serde(default)]
        execution_count: Option<u32>,
        data: MimeBundle,
        #[serde(default)]
        metadata: serde_json::Map<String, serde_json::Value>,
    },
    Error {
        ename: String,
        evalue: String,
        #[serde(default)]
        traceback: Vec<String>,
    },
}

const FILENAMES_KEY: &str = "filenames";

impl From<WireOutput> for Payload {
    fn from(wire: WireOutput) -> Self {
        match wire {
            WireOutput::Stream { name, text } => Payload::Stream { name, text },
            WireOutput::DisplayData { data, metadata } => Payload::Display(split_filenames(data, metadata, None)),
            WireOutput::ExecuteResult {
                execution_count,
                data,
                metadata,
            } => Payload::Display(split_filenames(data, metadata, execution_count)),
            WireOutput::Error {
                ename,
                evalue,
                traceback,
            } => Payload::Error {
                ename,
                evalue,
                traceback,
            },
        }
    }
}

impl From<Payload> for WireOutput {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Stream { name, text } => WireOutput::Stream { name, text },
            Payload::Display(display) => {
                let DisplayData {
                    data,
                    mut metadata,
                    execution_count,
                    artifacts,
                } = display;
                if !artifacts.is_empty() {
                    let filenames = artifacts
                        .into_iter()
                        .map(|(mime, path)| (mime, serde_json::Value::String(path.to_string_lossy().into_owned())))
                        .collect();
                    metadata.insert(FILENAMES_KEY.to_string(), serde_json::Value::Object(filenames));
                }
                match execution_count {
                    Some(count) => WireOutput::ExecuteResult {
                        execution_count: Some(count),
                        data,
                        metadata,
                    },
                    None => WireOutput::DisplayData { data, metadata },
                }
            }
            Payload::Error {
                ename,
                evalue,
                traceback,
            } => WireOutput::Error {
                ename,
                evalue,
                traceback,
            },
        }
    }
}

fn split_filenames(
    data: MimeBundle,
    mut metadata: serde_json::Map<String, serde_json::Value>,
    execution_count: Option<u32>,
) -> DisplayData {
    let artifacts = match metadata.remove(FILENAMES_KEY) {
        Some(serde_json::Value::Object(map)) => map
            .into_iter()
            .filter_map(|(mime, path)| path.as_str().map(|p| (mime, PathBuf::from(p))))
            .collect(),
        _ => ArtifactRecord::new(),
    };
    DisplayData {
        data,
        metadata,
        execution_count,
        artifacts,
    }
}

/// Accept either a string or a list of line fragments.
fn multiline<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(_) | serde_json::Value::Array(_) => Ok(value_to_text(&value)),
        other => Err(serde::de::Error::custom(format!(
            "expected string or list of strings, got {}",
            other
        ))),
    }
}
