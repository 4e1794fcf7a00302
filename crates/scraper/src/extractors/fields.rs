// ABOUTME: Field clean-up helpers shared by every extractor adapter.
// ABOUTME: Whitespace normalization, relative URL resolution, and domain derivation.

use url::Url;

use crate::record::{truncate_chars, ProductRecord, MAX_DESCRIPTION_CHARS};

/// Collapses runs of whitespace into single spaces and trims the ends.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolves a possibly relative URL against the document URL.
///
/// Protocol-relative (`//cdn...`) and path-relative values are joined onto
/// `base`. Data URIs and unparseable values are dropped.
pub fn resolve_url(base: &str, candidate: &str) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() || candidate.starts_with("data:") {
        return None;
    }
    if let Ok(abs) = Url::parse(candidate) {
        return matches!(abs.scheme(), "http" | "https").then(|| abs.to_string());
    }
    let base = Url::parse(base).ok()?;
    base.join(candidate).ok().map(|u| u.to_string())
}

/// Host of `url` lower-cased and without a leading `www.`.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Applies the final clean-up to a merged record.
///
/// Empty strings become `None`, text fields are whitespace-normalized, the
/// description is cut to its maximum length, and the image is made absolute.
pub fn finalize(mut record: ProductRecord, document_url: &str) -> ProductRecord {
    record.title = record.title.map(|t| normalize_whitespace(&t)).filter(|t| !t.is_empty());
    record.price_raw = record
        .price_raw
        .map(|p| normalize_whitespace(&p))
        .filter(|p| !p.is_empty());
    record.description = record
        .description
        .map(|d| truncate_chars(&normalize_whitespace(&d), MAX_DESCRIPTION_CHARS))
        .filter(|d| !d.is_empty());
    record.image = record.image.and_then(|img| resolve_url(document_url, &img));
    if record.domain.is_none() {
        record.domain = domain_of(document_url);
    }
    record
}
