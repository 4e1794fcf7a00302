// ABOUTME: Selector-driven field lookup over a parsed HTML document.
// ABOUTME: Walks a FieldExtractor's candidates in order and returns the first non-empty text or attribute.

//! Selector-based field extraction.
//!
//! Key behaviors:
//! - Candidates are tried in order; the first one yielding a non-empty value wins.
//! - Text extraction concatenates descendant text and collapses whitespace.
//! - A plain CSS candidate that targets a `<meta>` tag reads its `content` attribute.
//! - Attribute extraction returns the attribute value trimmed.

use scraper::Html;

use crate::extractors::compiled::get_or_compile;
use crate::extractors::custom::{FieldExtractor, SelectorSpec};
use crate::extractors::fields::normalize_whitespace;

/// Returns the first non-empty value produced by the extractor's candidates.
pub fn extract_field_first(doc: &Html, fe: &FieldExtractor) -> Option<String> {
    fe.selectors.iter().find_map(|spec| extract_from_spec(doc, spec))
}

fn extract_from_spec(doc: &Html, spec: &SelectorSpec) -> Option<String> {
    match spec {
        SelectorSpec::Css(css) if css.trim_start().starts_with("meta") => {
            first_attr(doc, css, "content")
        }
        SelectorSpec::Css(css) => first_text(doc, css),
        SelectorSpec::CssAttr(parts) => match parts.as_slice() {
            [css, attr, ..] => first_attr(doc, css, attr),
            [css] => first_text(doc, css),
            [] => None,
        },
    }
}

/// Inner text of the first matching element with non-empty text.
pub fn first_text(doc: &Html, css: &str) -> Option<String> {
    let selector = get_or_compile(css)?;
    doc.select(&selector).find_map(|el| {
        let text = normalize_whitespace(&el.text().collect::<String>());
        (!text.is_empty()).then_some(text)
    })
}

/// Attribute value of the first matching element carrying it non-empty.
pub fn first_attr(doc: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = get_or_compile(css)?;
    doc.select(&selector).find_map(|el| {
        el.value()
            .attr(attr)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}
