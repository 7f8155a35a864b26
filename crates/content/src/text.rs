use std::borrow::Cow;

/// Decode entry bytes as UTF-8, falling back to Latin-1 (which can decode
/// anything) when they aren't valid UTF-8.
pub fn decode(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text.strip_prefix('\u{feff}').unwrap_or(text)),
        // Latin-1 code points are exactly the byte values.
        Err(_) => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Re-indent JSON for readability. `None` if the text isn't valid JSON.
pub(crate) fn pretty_json(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    serde_json::to_string_pretty(&value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8() {
        assert_eq!(decode("naïve".as_bytes()), "naïve");
        assert!(matches!(decode(b"plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_decode_strips_bom() {
        assert_eq!(decode(b"\xef\xbb\xbfhello"), "hello");
    }

    #[test]
    fn test_decode_latin1_fallback() {
        assert_eq!(decode(b"caf\xe9 cr\xe8me"), "café crème");
    }

    #[test]
    fn test_pretty_json() {
        assert_eq!(pretty_json(r#"{"a":[1,2]}"#).unwrap(), "{\n  \"a\": [\n    1,\n    2\n  ]\n}");
        assert_eq!(pretty_json("{not json"), None);
    }
}
