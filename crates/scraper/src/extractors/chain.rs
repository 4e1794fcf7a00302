// ABOUTME: Extractor adapter trait and the fixed-priority chain that merges adapter output.
// ABOUTME: Structured data runs first, then the site profile, then generic heuristics; first writer wins per field.

use std::sync::Arc;

use scraper::Html;

use crate::extractors::custom::{FieldExtractor, SiteProfile, SiteProfileRegistry};
use crate::extractors::fields::{domain_of, finalize};
use crate::extractors::compiled::precompile_selectors;
use crate::extractors::generic::{self, extract_generic, extract_open_graph};
use crate::extractors::price::{detect_currency, parse_price};
use crate::extractors::select::extract_field_first;
use crate::extractors::structured::extract_json_ld;
use crate::record::ProductRecord;

/// One source of candidate product fields.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns whatever fields this adapter can fill, or `None` if it has nothing.
    fn extract(&self, doc: &Html, profile: Option<&SiteProfile>) -> Option<ProductRecord>;
}

/// schema.org JSON-LD.
pub struct StructuredDataExtractor;

impl Extractor for StructuredDataExtractor {
    fn name(&self) -> &'static str {
        "json-ld"
    }

    fn extract(&self, doc: &Html, _profile: Option<&SiteProfile>) -> Option<ProductRecord> {
        extract_json_ld(doc)
    }
}

/// Per-retailer selector tables.
pub struct SiteProfileExtractor;

impl Extractor for SiteProfileExtractor {
    fn name(&self) -> &'static str {
        "site-profile"
    }

    fn extract(&self, doc: &Html, profile: Option<&SiteProfile>) -> Option<ProductRecord> {
        let profile = profile?;
        let pick = |fe: &Option<FieldExtractor>| {
            fe.as_ref().and_then(|fe| extract_field_first(doc, fe))
        };

        let price_raw = pick(&profile.price);
        Some(ProductRecord {
            title: pick(&profile.title),
            price: price_raw.as_deref().and_then(parse_price),
            currency: price_raw.as_deref().and_then(detect_currency),
            price_raw,
            image: pick(&profile.image),
            description: pick(&profile.description),
            ..Default::default()
        })
    }
}

/// Open Graph, microdata and common markup.
pub struct GenericExtractor;

impl Extractor for GenericExtractor {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn extract(&self, doc: &Html, _profile: Option<&SiteProfile>) -> Option<ProductRecord> {
        Some(extract_generic(doc))
    }
}

/// Runs adapters in priority order and merges their output.
#[derive(Clone)]
pub struct ExtractorChain {
    adapters: Arc<Vec<Box<dyn Extractor>>>,
    profiles: Arc<SiteProfileRegistry>,
}

impl ExtractorChain {
    /// The standard chain: JSON-LD, site profile, generic.
    pub fn new(profiles: SiteProfileRegistry) -> Self {
        Self::with_adapters(
            profiles,
            vec![
                Box::new(StructuredDataExtractor),
                Box::new(SiteProfileExtractor),
                Box::new(GenericExtractor),
            ],
        )
    }

    /// A chain with a caller-chosen adapter order.
    pub fn with_adapters(
        profiles: SiteProfileRegistry,
        adapters: Vec<Box<dyn Extractor>>,
    ) -> Self {
        precompile_selectors(generic::css_selectors());
        Self {
            adapters: Arc::new(adapters),
            profiles: Arc::new(profiles),
        }
    }

    pub fn profiles(&self) -> &SiteProfileRegistry {
        &self.profiles
    }

    /// Extracts a product record from an HTML document.
    ///
    /// `document_url` is the final URL after redirects and is used for the
    /// profile lookup and for resolving relative image URLs. Returns `None`
    /// when no adapter produced a title.
    pub fn extract(&self, html: &str, document_url: &str) -> Option<ProductRecord> {
        let doc = Html::parse_document(html);
        let profile = domain_of(document_url).and_then(|host| self.profiles.lookup(&host));

        let mut merged = ProductRecord::default();
        for adapter in self.adapters.iter() {
            if let Some(candidate) = adapter.extract(&doc, profile) {
                tracing::debug!(
                    adapter = adapter.name(),
                    title = candidate.title.is_some(),
                    price = candidate.has_price(),
                    image = candidate.has_image(),
                    "adapter produced candidate"
                );
                fill_missing(&mut merged, candidate);
            }
        }

        let record = finalize(merged, document_url);
        record.is_usable().then_some(record)
    }

    /// Builds a record from the page's Open Graph tags alone.
    ///
    /// Used on pages already judged blocked. Returns `None` unless the tags give
    /// a title plus a price or an image.
    pub fn salvage(&self, html: &str, document_url: &str) -> Option<ProductRecord> {
        let doc = Html::parse_document(html);
        let record = finalize(extract_open_graph(&doc), document_url);
        (record.is_usable() && (record.has_price() || record.has_image())).then_some(record)
    }
}

/// Copies fields from `candidate` that `target` does not have yet.
///
/// Numeric and raw price travel together so a record never mixes one adapter's
/// number with another adapter's text.
fn fill_missing(target: &mut ProductRecord, candidate: ProductRecord) {
    fn fill(slot: &mut Option<String>, value: Option<String>) {
        if slot.as_ref().map_or(true, |s| s.trim().is_empty()) {
            if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
                *slot = Some(v);
            }
        }
    }

    let candidate_has_price = candidate.has_price();
    fill(&mut target.title, candidate.title);
    if !target.has_price() && candidate_has_price {
        target.price = candidate.price;
        target.price_raw = candidate.price_raw;
    }
    fill(&mut target.currency, candidate.currency);
    fill(&mut target.image, candidate.image);
    fill(&mut target.description, candidate.description);
}
