use regex::Regex;
use scraper::Selector;
use std::sync::LazyLock;

macro_rules! selector {
    ($name:ident, $css:expr) => {
        pub(crate) static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// Page furniture that never carries article content. The `.mw-*` and navbox
// classes are what MediaWiki-derived archives (Wikipedia, Wiktionary, ...)
// leave behind.
selector!(
    CHROME_SELECTOR,
    "script, style, noscript, template, iframe, object, embed, nav, header, footer, \
     .mw-editsection, .navbox, .noprint, #mw-navigation, #catlinks"
);
selector!(TITLE_SELECTOR, "head > title");
selector!(HEADING_SELECTOR, "h1");
selector!(BODY_SELECTOR, "body");
regex!(WHITESPACE_REGEX, r"\s+");
regex!(BLANK_LINES_REGEX, r"\n[ \t]*(?:\n[ \t]*){2,}");
