use derive_more::Display;

/// How text content should be shaped when a caller doesn't ask for raw
/// bytes.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum OutputMode {
    /// Markdown text only.
    #[default]
    #[display("markdown")]
    Markdown,
    /// Markdown wrapped with the entry's title, path, MIME type and size.
    #[display("structured")]
    Structured,
}

/// Per-call processing flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputOptions {
    /// Skip conversion and hand back the entry's bytes.
    pub raw_output: bool,
    /// Return bare Markdown rather than a [`StructuredEntry`].
    pub markdown_only: bool,
}

impl OutputOptions {
    pub fn raw() -> Self {
        Self {
            raw_output: true,
            markdown_only: false,
        }
    }
}

impl From<OutputMode> for OutputOptions {
    fn from(mode: OutputMode) -> Self {
        Self {
            raw_output: false,
            markdown_only: mode == OutputMode::Markdown,
        }
    }
}

/// Processed entry content. Text inside [`Markdown`](Self::Markdown) and
/// [`Structured`](Self::Structured) never exceeds the processor's character
/// ceiling (plus the truncation marker).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(tag = "kind", rename_all = "snake_case"))]
pub enum ProcessedContent {
    Markdown { text: String, truncated: bool },
    Structured(StructuredEntry),
    Image(ImagePayload),
    Raw(RawPayload),
}

impl ProcessedContent {
    /// The textual body, if this variant has one.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Markdown { text, .. } => Some(text),
            Self::Structured(entry) => Some(&entry.body),
            Self::Raw(raw) => raw.text.as_deref(),
            Self::Image(_) => None,
        }
    }

    pub fn is_truncated(&self) -> bool {
        match self {
            Self::Markdown { truncated, .. } => *truncated,
            Self::Structured(entry) => entry.truncated,
            Self::Image(_) | Self::Raw(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StructuredEntry {
    pub title: String,
    pub path: String,
    /// MIME type of the source entry (not of the body, which is Markdown).
    pub mime_type: String,
    pub body: String,
    /// Size of the source entry in bytes.
    pub original_size: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImagePayload {
    pub mime_type: String,
    /// Short format name, e.g. `png` or `svg`.
    pub format: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RawPayload {
    pub mime_type: String,
    pub bytes: Vec<u8>,
    /// Decoded text, for textual MIME types.
    pub text: Option<String>,
}
