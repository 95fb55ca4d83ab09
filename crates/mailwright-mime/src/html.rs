//! HTML to plain-text conversion.
//!
//! Used to synthesize the `text/plain` alternative of an HTML-only message.
//! The conversion is a chain of regex passes, each exposed on its own so it
//! can be tested in isolation. It assumes reasonably well-formed HTML with
//! quoted attribute values.

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

// Patterns are compile-time constants; construction cannot fail.
#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("invalid built-in regex")
}

static WHITESPACE_ENTITIES: LazyLock<Regex> = LazyLock::new(|| compile(r"(\s|\x{a0}|&nbsp;)+"));

static INVISIBLE_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)<head[^a-z].*</head>|<style[^a-z].*</style>|<script[^a-z].*</script>")
});

static LINE_BREAK_TAGS: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)<(/h\d|/p|p|br|/ul|/ol|/li|/div|/table|/td)[^a-z]"));

static SPACED_TAGS: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)<(/?p|br|/?ul|/?ol|/?li|/?div|/?table|/?td|hr|img)"));

static IMG_ALT: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"(?is)<img [^>]*alt\s*=\s*"([^"]+)""#));

static LINK_HREF: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"(?is)<a [^>]*href\s*=\s*"([^"]+)".*</a>"#));

static TAGS: LazyLock<Regex> = LazyLock::new(|| compile(r"<[^>]+>"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| compile(r"[\s\x{a0}]+"));

/// Converts an HTML document into readable plain text.
///
/// Invisible blocks (`head`, `style`, `script`) are dropped, block-level
/// tags become line breaks, image `alt` texts and link targets are kept
/// inline, and entities are decoded.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let text = collapse_whitespace(html);
    let text = strip_invisible(&text);
    let text = break_lines(&text);
    let text = space_tags(&text);
    let text = inline_image_alt(&text);
    let text = inline_link_href(&text);
    let text = strip_tags(&text);
    let text = html_escape::decode_html_entities(&text);
    let text = normalize_whitespace(&text);
    text.trim().to_string()
}

/// Collapses runs of whitespace, including non-breaking spaces and
/// `&nbsp;`, into a single space.
#[must_use]
pub fn collapse_whitespace(html: &str) -> Cow<'_, str> {
    WHITESPACE_ENTITIES.replace_all(html, " ")
}

/// Removes `<head>`, `<style>` and `<script>` elements with their content.
#[must_use]
pub fn strip_invisible(html: &str) -> Cow<'_, str> {
    INVISIBLE_BLOCKS.replace_all(html, "")
}

/// Inserts a line break before closing block tags and `<p>`/`<br>`.
#[must_use]
pub fn break_lines(html: &str) -> Cow<'_, str> {
    LINE_BREAK_TAGS.replace_all(html, "\n$0")
}

/// Inserts a space before block tags so adjacent words stay apart.
#[must_use]
pub fn space_tags(html: &str) -> Cow<'_, str> {
    SPACED_TAGS.replace_all(html, " $0")
}

/// Places the `alt` text of each `<img>` in front of the tag.
#[must_use]
pub fn inline_image_alt(html: &str) -> Cow<'_, str> {
    IMG_ALT.replace_all(html, "$1$0")
}

/// Appends ` [ href ] ` after each link.
#[must_use]
pub fn inline_link_href(html: &str) -> Cow<'_, str> {
    LINK_HREF.replace_all(html, "$0 [ $1 ] ")
}

/// Removes every remaining tag.
#[must_use]
pub fn strip_tags(html: &str) -> Cow<'_, str> {
    TAGS.replace_all(html, "")
}

/// Reduces each whitespace run to its newlines, or to one space when the
/// run has none.
#[must_use]
pub fn normalize_whitespace(text: &str) -> Cow<'_, str> {
    WHITESPACE.replace_all(text, |caps: &Captures<'_>| {
        match caps[0].bytes().filter(|&c| c == b'\n').count() {
            0 => " ".to_string(),
            n => "\n".repeat(n),
        }
    })
}
