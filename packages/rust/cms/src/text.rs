//! Markup stripping for CMS-rendered fields.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

/// Convert an HTML fragment (title, excerpt, body) to plain text.
///
/// Entities are decoded, `<script>`/`<style>` content is dropped, block
/// boundaries become spaces and whitespace runs collapse to one space.
pub fn html_to_text(html: &str) -> String {
    static BLOCK_END_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)<br\s*/?>|</(?:p|div|li|h[1-6]|blockquote|figcaption)>")
            .expect("valid regex")
    });
    static WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let spaced = BLOCK_END_RE.replace_all(html, "$0 ");
    let fragment = Html::parse_fragment(&spaced);

    let mut text = String::with_capacity(html.len());
    for node in fragment.root_element().descendants() {
        let Some(chunk) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style"))
        });
        if !hidden {
            text.push_str(chunk);
        }
    }

    WS_RE.replace_all(&text, " ").trim().to_string()
}
