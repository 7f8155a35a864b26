//! MIME type classification.

use derive_more::Display;

/// The closed set of processing strategies. Every MIME type maps to exactly
/// one of these.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentCategory {
    #[display("html")]
    Html,
    #[display("image")]
    Image,
    #[display("text")]
    PlainText,
    #[display("other")]
    Other,
}

impl ContentCategory {
    /// Classify a MIME type. Parameters (`; charset=...`) and case are
    /// ignored; an empty or unparseable type is [`Other`](Self::Other).
    pub fn of(mime_type: &str) -> Self {
        let essence = essence(mime_type);
        match essence.as_str() {
            "text/html" | "application/xhtml+xml" => Self::Html,
            e if e.starts_with("image/") => Self::Image,
            e if e.starts_with("text/") => Self::PlainText,
            "application/json" | "application/xml" | "application/javascript" | "application/x-javascript" => {
                Self::PlainText
            },
            e if e.ends_with("+json") || e.ends_with("+xml") => Self::PlainText,
            _ => Self::Other,
        }
    }
}

/// Lower-cased `type/subtype`, without parameters.
pub(crate) fn essence(mime_type: &str) -> String {
    mime_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

pub(crate) fn is_json(mime_type: &str) -> bool {
    let essence = essence(mime_type);
    essence == "application/json" || essence.ends_with("+json")
}

/// Short image format name for an `image/*` MIME type (`png`, `jpeg`, ...).
/// Unknown subtypes are passed through as-is.
pub fn image_format(mime_type: &str) -> String {
    let essence = essence(mime_type);
    let subtype = essence.strip_prefix("image/").unwrap_or(essence.as_str());
    match subtype {
        "jpg" | "jpeg" | "pjpeg" => "jpeg".to_string(),
        "svg+xml" => "svg".to_string(),
        "x-ms-bmp" | "bmp" => "bmp".to_string(),
        other => other.to_string(),
    }
}
