// ABOUTME: Generic product heuristics used when neither JSON-LD nor a site profile fills a field.
// ABOUTME: Covers Open Graph and product meta tags, itemprop microdata, common class names, h1 and title.

use once_cell::sync::Lazy;
use scraper::Html;

use crate::extractors::custom::{FieldExtractor, SelectorSpec};
use crate::extractors::price::{detect_currency, parse_price};
use crate::extractors::select::extract_field_first;
use crate::record::ProductRecord;

fn attr(css: &str, attr: &str) -> SelectorSpec {
    SelectorSpec::CssAttr(vec![css.to_string(), attr.to_string()])
}

fn text(css: &str) -> SelectorSpec {
    SelectorSpec::Css(css.to_string())
}

static TITLE: Lazy<FieldExtractor> = Lazy::new(|| FieldExtractor {
    selectors: vec![
        text("meta[property='og:title']"),
        text("meta[itemprop='name']"),
        text("[itemprop='name']"),
        text("h1"),
        text("title"),
    ],
});

static PRICE: Lazy<FieldExtractor> = Lazy::new(|| FieldExtractor {
    selectors: vec![
        attr("[itemprop='price']", "content"),
        text("meta[property='product:price:amount']"),
        text("meta[property='og:price:amount']"),
        text("[itemprop='price']"),
        text(".price"),
        text(".product-price"),
    ],
});

static CURRENCY: Lazy<FieldExtractor> = Lazy::new(|| FieldExtractor {
    selectors: vec![
        text("meta[property='product:price:currency']"),
        text("meta[property='og:price:currency']"),
        attr("[itemprop='priceCurrency']", "content"),
    ],
});

static IMAGE: Lazy<FieldExtractor> = Lazy::new(|| FieldExtractor {
    selectors: vec![
        text("meta[property='og:image']"),
        text("meta[property='og:image:secure_url']"),
        attr("[itemprop='image']", "src"),
        attr("[itemprop='image']", "content"),
        attr(".product-image img", "src"),
        attr(".product-image img", "data-src"),
    ],
});

static DESCRIPTION: Lazy<FieldExtractor> = Lazy::new(|| FieldExtractor {
    selectors: vec![
        text("meta[property='og:description']"),
        text("meta[name='description']"),
        text("[itemprop='description']"),
    ],
});

static OG_TITLE: Lazy<FieldExtractor> = Lazy::new(|| FieldExtractor {
    selectors: vec![text("meta[property='og:title']")],
});

static OG_PRICE: Lazy<FieldExtractor> = Lazy::new(|| FieldExtractor {
    selectors: vec![
        text("meta[property='product:price:amount']"),
        text("meta[property='og:price:amount']"),
    ],
});

static OG_IMAGE: Lazy<FieldExtractor> = Lazy::new(|| FieldExtractor {
    selectors: vec![
        text("meta[property='og:image']"),
        text("meta[property='og:image:secure_url']"),
    ],
});

static OG_DESCRIPTION: Lazy<FieldExtractor> = Lazy::new(|| FieldExtractor {
    selectors: vec![text("meta[property='og:description']")],
});

/// Every selector the heuristics use, for warming the selector cache.
pub fn css_selectors() -> Vec<String> {
    [&*TITLE, &*PRICE, &*CURRENCY, &*IMAGE, &*DESCRIPTION]
        .into_iter()
        .flat_map(|fe| fe.selectors.iter())
        .map(|spec| crate::extractors::custom::parse_selector(spec).0)
        .collect()
}

/// Runs the generic heuristics. Fields nothing matched stay `None`.
pub fn extract_generic(doc: &Html) -> ProductRecord {
    let price_raw = extract_field_first(doc, &PRICE);
    let currency = extract_field_first(doc, &CURRENCY)
        .map(|c| c.to_uppercase())
        .or_else(|| price_raw.as_deref().and_then(detect_currency));

    ProductRecord {
        title: extract_field_first(doc, &TITLE),
        price: price_raw.as_deref().and_then(parse_price),
        price_raw,
        currency,
        image: extract_field_first(doc, &IMAGE),
        description: extract_field_first(doc, &DESCRIPTION),
        ..Default::default()
    }
}

/// Reads only the Open Graph and product meta tags.
///
/// Interstitial pages often keep the product's share tags even when the body is
/// a challenge, so this is what is left to trust once the page is blocked.
pub fn extract_open_graph(doc: &Html) -> ProductRecord {
    let price_raw = extract_field_first(doc, &OG_PRICE);
    let currency = extract_field_first(doc, &CURRENCY)
        .map(|c| c.to_uppercase())
        .or_else(|| price_raw.as_deref().and_then(detect_currency));

    ProductRecord {
        title: extract_field_first(doc, &OG_TITLE),
        price: price_raw.as_deref().and_then(parse_price),
        price_raw,
        currency,
        image: extract_field_first(doc, &OG_IMAGE),
        description: extract_field_first(doc, &OG_DESCRIPTION),
        ..Default::default()
    }
}
