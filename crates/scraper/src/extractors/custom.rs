// ABOUTME: Site profile data models and the host-keyed profile registry.
// ABOUTME: Defines ordered selector candidates per product field for per-retailer extraction.

//! Site profiles for retailer-specific extraction.
//!
//! A profile lists, per product field, an ordered set of selector candidates.
//! Profiles are plain data: adding a retailer means adding a JSON entry, not
//! a code branch.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Specifies how to select content from the DOM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorSpec {
    /// A simple CSS selector string, e.g., "#productTitle"
    Css(String),
    /// A CSS selector with attribute extraction, e.g., ["#landingImage", "src"]
    CssAttr(Vec<String>),
}

impl Default for SelectorSpec {
    fn default() -> Self {
        SelectorSpec::Css(String::new())
    }
}

/// Ordered selector candidates for a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FieldExtractor {
    /// List of selectors to try in order
    #[serde(default)]
    pub selectors: Vec<SelectorSpec>,
}

impl FieldExtractor {
    /// Build a text-only extractor from CSS strings.
    pub fn css(selectors: &[&str]) -> Self {
        Self {
            selectors: selectors
                .iter()
                .map(|s| SelectorSpec::Css(s.to_string()))
                .collect(),
        }
    }
}

/// Extraction rules for one retailer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SiteProfile {
    /// Primary domain this profile applies to
    pub domain: String,
    /// Additional domains this profile supports
    #[serde(default)]
    pub supported_domains: Vec<String>,
    /// Brand name as it appears on a bare home page, e.g. "Target"
    #[serde(default)]
    pub site_name: Option<String>,
    #[serde(default)]
    pub title: Option<FieldExtractor>,
    #[serde(default)]
    pub price: Option<FieldExtractor>,
    #[serde(default)]
    pub image: Option<FieldExtractor>,
    #[serde(default)]
    pub description: Option<FieldExtractor>,
}

impl SiteProfile {
    /// All selector strings referenced by this profile.
    pub fn css_selectors(&self) -> Vec<String> {
        [&self.title, &self.price, &self.image, &self.description]
            .into_iter()
            .flatten()
            .flat_map(|fe| fe.selectors.iter())
            .map(|spec| parse_selector(spec).0)
            .filter(|css| !css.is_empty())
            .collect()
    }
}

/// Registry for looking up site profiles by host.
#[derive(Debug, Default, Clone)]
pub struct SiteProfileRegistry {
    map: HashMap<String, SiteProfile>,
}

impl SiteProfileRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a profile for its primary and supported domains.
    pub fn register(&mut self, profile: SiteProfile) {
        let primary = profile.domain.to_lowercase();
        for dom in &profile.supported_domains {
            self.map.insert(dom.to_lowercase(), profile.clone());
        }
        self.map.insert(primary, profile);
    }

    /// Looks up a profile by exact domain.
    pub fn get(&self, domain: &str) -> Option<&SiteProfile> {
        self.map.get(domain)
    }

    /// Resolves a request host to a profile.
    ///
    /// Tries the exact host, the host without `www.`, then each parent domain
    /// ("smile.amazon.com" falls back to "amazon.com").
    pub fn lookup(&self, host: &str) -> Option<&SiteProfile> {
        let host = host.trim_end_matches('.').to_lowercase();
        if let Some(p) = self.map.get(&host) {
            return Some(p);
        }
        let mut rest = host.strip_prefix("www.").unwrap_or(&host);
        loop {
            if let Some(p) = self.map.get(rest) {
                return Some(p);
            }
            match rest.split_once('.') {
                Some((_, parent)) if parent.contains('.') => rest = parent,
                _ => return None,
            }
        }
    }

    /// Brand names of every registered profile, lower-cased and deduplicated.
    pub fn site_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .map
            .values()
            .filter_map(|p| p.site_name.as_ref())
            .map(|n| n.to_lowercase())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Iterates over every selector string in the registry.
    pub fn css_selectors(&self) -> impl Iterator<Item = String> + '_ {
        self.map.values().flat_map(|p| p.css_selectors())
    }

    /// Returns the number of registered domain mappings.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if no profiles are registered.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Parses a selector spec into a CSS selector string and optional attribute name.
///
/// Returns (css_selector, optional_attribute).
pub fn parse_selector(selector: &SelectorSpec) -> (String, Option<String>) {
    match selector {
        SelectorSpec::Css(css) => (css.clone(), None),
        SelectorSpec::CssAttr(parts) => {
            if parts.len() >= 2 {
                (parts[0].clone(), Some(parts[1].clone()))
            } else if parts.len() == 1 {
                (parts[0].clone(), None)
            } else {
                (String::new(), None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amazon() -> SiteProfile {
        SiteProfile {
            domain: "amazon.com".to_string(),
            supported_domains: vec!["www.amazon.com".to_string()],
            site_name: Some("Amazon.com".to_string()),
            title: Some(FieldExtractor::css(&["#productTitle"])),
            image: Some(FieldExtractor {
                selectors: vec![SelectorSpec::CssAttr(vec![
                    "#landingImage".to_string(),
                    "src".to_string(),
                ])],
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_serde_untagged_selectors() {
        let json = r##"{
            "domain": "etsy.com",
            "title": { "selectors": ["h1[data-buy-box-listing-title]", ["meta[property='og:title']", "content"]] }
        }"##;
        let parsed: SiteProfile = serde_json::from_str(json).expect("deserialize");

        let title = parsed.title.unwrap();
        assert_eq!(title.selectors.len(), 2);
        assert!(matches!(title.selectors[0], SelectorSpec::Css(_)));
        assert!(matches!(title.selectors[1], SelectorSpec::CssAttr(ref p) if p[1] == "content"));
        assert!(parsed.price.is_none());
    }

    #[test]
    fn test_registry_lookup_aliases() {
        let mut registry = SiteProfileRegistry::new();
        assert!(registry.is_empty());
        registry.register(amazon());

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("www.amazon.com").unwrap().domain, "amazon.com");
        assert!(registry.get("other.com").is_none());
    }

    #[test]
    fn test_lookup_strips_www_and_walks_parents() {
        let mut registry = SiteProfileRegistry::new();
        registry.register(SiteProfile {
            domain: "target.com".to_string(),
            ..Default::default()
        });

        assert!(registry.lookup("www.target.com").is_some());
        assert!(registry.lookup("WWW.TARGET.COM").is_some());
        assert!(registry.lookup("intl.shop.target.com").is_some());
        assert!(registry.lookup("nottarget.com").is_none());
        assert!(registry.lookup("com").is_none());
    }

    #[test]
    fn test_site_names_are_lowercase_and_unique() {
        let mut registry = SiteProfileRegistry::new();
        registry.register(amazon());
        assert_eq!(registry.site_names(), vec!["amazon.com".to_string()]);
    }

    #[test]
    fn test_profile_css_selectors() {
        let css = amazon().css_selectors();
        assert_eq!(css, vec!["#productTitle", "#landingImage"]);
    }

    #[test]
    fn test_parse_selector_variants() {
        let (css, attr) = parse_selector(&SelectorSpec::Css("div.content".to_string()));
        assert_eq!(css, "div.content");
        assert!(attr.is_none());

        let (css, attr) =
            parse_selector(&SelectorSpec::CssAttr(vec!["img.hero".to_string(), "src".to_string()]));
        assert_eq!(css, "img.hero");
        assert_eq!(attr, Some("src".to_string()));

        let (css, attr) = parse_selector(&SelectorSpec::CssAttr(vec![]));
        assert_eq!(css, "");
        assert!(attr.is_none());
    }
}
