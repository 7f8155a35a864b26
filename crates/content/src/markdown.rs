//! HTML to Markdown conversion.
//!
//! Archive pages are full HTML documents, complete with scripts, styles and
//! navigation. Those are stripped from the parsed tree before the remaining
//! body is handed to the Markdown rewriter, which keeps headings, lists,
//! links and tables.

use crate::consts::{
    BLANK_LINES_REGEX, BODY_SELECTOR, CHROME_SELECTOR, HEADING_SELECTOR, TITLE_SELECTOR, WHITESPACE_REGEX,
};
use html2md::rewrite_html as html_to_markdown;
use scraper::{ElementRef, Html, Selector};

/// The result of converting one HTML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converted {
    /// `<title>`, falling back to the first `<h1>`.
    pub title: Option<String>,
    pub markdown: String,
}

pub fn convert(html: &str) -> Converted {
    let mut document = Html::parse_document(html);
    let title = first_text(&document, &TITLE_SELECTOR).or_else(|| first_text(&document, &HEADING_SELECTOR));

    // Collect first, the tree can't be mutated while a selection borrows it.
    let chrome: Vec<_> = document.select(&CHROME_SELECTOR).map(|element| element.id()).collect();
    for id in chrome {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    let body = match document.select(&BODY_SELECTOR).next() {
        Some(body) => body.inner_html(),
        None => document.root_element().inner_html(),
    };
    let markdown = html_to_markdown(&body, true);
    Converted {
        title,
        markdown: tidy(&markdown),
    }
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document.select(selector).find_map(normalized_text)
}

fn normalized_text(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<String>();
    let text = WHITESPACE_REGEX.replace_all(text.trim(), " ");
    (!text.is_empty()).then(|| text.into_owned())
}

/// Collapse runs of blank lines left behind by removed elements.
fn tidy(markdown: &str) -> String {
    BLANK_LINES_REGEX.replace_all(markdown.trim(), "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>  Solar
     System </title>
  <style>body { color: red; }</style>
  <script>var tracking = "SECRET_SCRIPT";</script>
</head>
<body>
  <header>SITE HEADER</header>
  <nav><a href="/">NAV LINK</a></nav>
  <h1>The Solar System</h1>
  <p>The <a href="/wiki/Sun">Sun</a> and the planets that orbit it.</p>
  <ul><li>Mercury</li><li>Venus</li></ul>
  <span class="mw-editsection">[edit]</span>
  <footer>FOOTER TEXT</footer>
</body>
</html>"#;

    #[test]
    fn test_title_from_title_element() {
        assert_eq!(convert(PAGE).title.as_deref(), Some("Solar System"));
    }

    #[test]
    fn test_title_falls_back_to_heading() {
        let converted = convert("<html><body><h1>Only <em>Heading</em></h1><p>x</p></body></html>");
        assert_eq!(converted.title.as_deref(), Some("Only Heading"));
    }

    #[test]
    fn test_no_title() {
        assert_eq!(convert("<p>untitled</p>").title, None);
    }

    #[test]
    fn test_chrome_is_stripped() {
        let markdown = convert(PAGE).markdown;
        for gone in ["SECRET_SCRIPT", "color: red", "SITE HEADER", "NAV LINK", "FOOTER TEXT", "[edit]"] {
            assert!(!markdown.contains(gone), "{gone:?} survived in {markdown:?}");
        }
    }

    #[test]
    fn test_content_is_kept() {
        let markdown = convert(PAGE).markdown;
        assert!(markdown.contains("The Solar System"));
        assert!(markdown.contains("Mercury"));
        assert!(markdown.contains("Venus"));
        assert!(markdown.contains("/wiki/Sun"));
    }

    #[test]
    fn test_no_runs_of_blank_lines() {
        let markdown = convert(PAGE).markdown;
        assert!(!markdown.contains("\n\n\n"));
        assert_eq!(markdown, markdown.trim());
    }

    #[test]
    fn test_fragment_without_body() {
        let markdown = convert("<p>Just a <strong>fragment</strong></p>").markdown;
        assert!(markdown.contains("fragment"));
    }
}
