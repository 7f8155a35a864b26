//! Turns archive entries into something a language model can read.
//!
//! Every entry goes through [`Processor::process`], which picks exactly one
//! strategy from the entry's [`ContentCategory`]:
//!
//! | Category    | Default output                    | With `raw_output` |
//! |-------------|-----------------------------------|-------------------|
//! | HTML        | Markdown, or a [`StructuredEntry`] | raw bytes + text  |
//! | Image       | [`ImagePayload`]                  | [`ImagePayload`]  |
//! | Plain text  | Markdown (JSON pretty-printed)    | raw bytes + text  |
//! | Other       | placeholder [`StructuredEntry`]   | raw bytes         |
//!
//! Text output is capped at the processor's character ceiling, after
//! conversion; see [`truncate_chars`].

mod consts;
mod markdown;
mod mime;
mod models;
mod text;
mod truncate;

pub use crate::markdown::{Converted, convert as html_to_markdown};
pub use crate::mime::{ContentCategory, image_format};
pub use crate::models::{ImagePayload, OutputMode, OutputOptions, ProcessedContent, RawPayload, StructuredEntry};
pub use crate::text::decode as decode_text;
pub use crate::truncate::{TRUNCATION_MARKER, truncate_chars};
use tracing::{debug, instrument};
use zimr_archive::{EntryPayload, format_file_size};

/// Default character ceiling for processed text.
pub const DEFAULT_MAX_CHARS: usize = 100_000;

/// Converts entry payloads into [`ProcessedContent`]. Cheap to copy; holds
/// nothing but its limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Processor {
    max_chars: usize,
}

impl Default for Processor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

impl Processor {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Process one entry.
    ///
    /// Redirects should be resolved before getting here; a redirect payload
    /// is turned into a placeholder naming its target.
    ///
    /// # Examples
    ///
    /// ```
    /// use zimr_archive::EntryPayload;
    /// use zimr_content::{OutputOptions, ProcessedContent, Processor};
    ///
    /// let entry = EntryPayload::new("notes.zim", "A/Readme", "text/plain", "hello");
    /// let content = Processor::new(100).process(entry, OutputOptions::default());
    /// assert_eq!(content, ProcessedContent::Markdown { text: "hello".to_string(), truncated: false });
    /// ```
    #[instrument(skip_all, fields(archive = %entry.archive_id, path = %entry.entry_path, mime = %entry.mime_type, size = entry.bytes.len()))]
    pub fn process(&self, entry: EntryPayload, options: OutputOptions) -> ProcessedContent {
        if entry.is_redirect {
            let target = entry.redirect_target.clone().unwrap_or_default();
            return self.placeholder(&entry, format!("[This is a redirect to `{target}`]"));
        }
        let category = ContentCategory::of(&entry.mime_type);
        debug!(%category, raw = options.raw_output, markdown_only = options.markdown_only, "processing entry");
        match category {
            ContentCategory::Image => ProcessedContent::Image(ImagePayload {
                format: image_format(&entry.mime_type),
                mime_type: entry.mime_type,
                bytes: entry.bytes,
            }),
            ContentCategory::Html | ContentCategory::PlainText if options.raw_output => {
                let text = decode_text(&entry.bytes).into_owned();
                ProcessedContent::Raw(RawPayload {
                    mime_type: entry.mime_type,
                    bytes: entry.bytes,
                    text: Some(text),
                })
            },
            ContentCategory::Other if options.raw_output => ProcessedContent::Raw(RawPayload {
                mime_type: entry.mime_type,
                bytes: entry.bytes,
                text: None,
            }),
            ContentCategory::Html => self.html(entry, options.markdown_only),
            ContentCategory::PlainText => self.plain_text(&entry),
            ContentCategory::Other => {
                let notice = format!(
                    "[Unsupported content type `{}` ({}, {} bytes). Request raw output to retrieve it.]",
                    entry.mime_type,
                    format_file_size(entry.bytes.len() as u64),
                    entry.bytes.len(),
                );
                self.placeholder(&entry, notice)
            },
        }
    }

    fn html(&self, entry: EntryPayload, markdown_only: bool) -> ProcessedContent {
        let converted = html_to_markdown(&decode_text(&entry.bytes));
        let (text, truncated) = truncate_chars(converted.markdown, self.max_chars);
        if markdown_only {
            return ProcessedContent::Markdown { text, truncated };
        }
        let title = converted.title.unwrap_or(entry.title);
        ProcessedContent::Structured(StructuredEntry {
            title,
            path: entry.entry_path,
            mime_type: entry.mime_type,
            body: text,
            original_size: entry.bytes.len(),
            truncated,
        })
    }

    fn plain_text(&self, entry: &EntryPayload) -> ProcessedContent {
        let decoded = decode_text(&entry.bytes);
        let text = match mime::is_json(&entry.mime_type) {
            true => text::pretty_json(&decoded).unwrap_or_else(|| decoded.into_owned()),
            false => decoded.into_owned(),
        };
        let (text, truncated) = truncate_chars(text, self.max_chars);
        ProcessedContent::Markdown { text, truncated }
    }

    fn placeholder(&self, entry: &EntryPayload, notice: String) -> ProcessedContent {
        let (body, truncated) = truncate_chars(notice, self.max_chars);
        ProcessedContent::Structured(StructuredEntry {
            title: entry.title.clone(),
            path: entry.entry_path.clone(),
            mime_type: entry.mime_type.clone(),
            body,
            original_size: entry.bytes.len(),
            truncated,
        })
    }
}
